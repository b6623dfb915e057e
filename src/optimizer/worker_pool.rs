//! # Worker Pool Module
//!
//! Pool di unità di esecuzione isolate per la compressione in parallelo.
//!
//! ## Responsabilità:
//! - Limite di concorrenza fisso `P = max(1, core - 1)`
//! - Elaborazione a chunk consecutivi di `P` job: un task tokio per job,
//!   barriera sull'intero chunk prima del successivo (no work-stealing)
//! - Timeout per job: l'unità viene abortita e il job riceve un risultato sintetico
//! - Isolamento dei crash: un panic nell'unità diventa un risultato di errore
//! - Cancellazione opzionale degli originali, solo dopo una risoluzione con successo
//!
//! ## Protocollo unità -> pool:
//! Ogni unità comunica solo tramite il proprio canale: zero o più
//! `WorkerMessage::Iteration`, poi esattamente un `WorkerMessage::Finished`.
//! Il primo evento tra {risultato, timeout, uscita anomala} vince; i messaggi
//! successivi per lo stesso job vengono ignorati.

use crate::{
    encoder::ImageEncoder,
    error::CompressError,
    optimizer::{path_resolver::OutputStrategy, task_optimizer::TaskOptimizer},
    options::{CompressionResult, Job},
    progress::{CompletionCounter, ProgressReporter},
};
use futures::stream::{FuturesUnordered, StreamExt};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(60);

/// Dimensione di default del pool: un core resta libero per il coordinatore
pub fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .saturating_sub(1)
        .max(1)
}

/// Messaggi da un'unità di esecuzione verso il pool
#[derive(Debug)]
pub enum WorkerMessage {
    Iteration { iteration: u32, max_iterations: u32 },
    Finished(CompressionResult),
}

/// Bounded pool of isolated execution units
pub struct WorkerPool {
    pool_size: usize,
    job_timeout: Duration,
    task: TaskOptimizer,
}

impl WorkerPool {
    pub fn new(
        pool_size: usize,
        job_timeout: Duration,
        encoder: Arc<dyn ImageEncoder>,
        output_strategy: OutputStrategy,
    ) -> Self {
        let pool_size = pool_size.max(1);
        info!(
            "🔧 Worker pool: {} concurrent units, {}s timeout per job",
            pool_size,
            job_timeout.as_secs_f64()
        );

        Self {
            pool_size,
            job_timeout,
            task: TaskOptimizer::new(encoder, output_strategy),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Dimensioni dei chunk per `job_count` job
    pub fn plan_chunks(&self, job_count: usize) -> Vec<usize> {
        (0..job_count)
            .step_by(self.pool_size)
            .map(|start| self.pool_size.min(job_count - start))
            .collect()
    }

    /// Comprime i job in parallelo, a chunk di `pool_size`.
    ///
    /// I job sono coppie (indice di sottomissione, job). I risultati vengono
    /// restituiti in ordine di completamento, ciascuno con il suo indice.
    pub async fn compress_in_parallel(
        &self,
        jobs: Vec<(usize, Job)>,
        reporter: &ProgressReporter,
        counter: &mut CompletionCounter,
    ) -> Vec<(usize, CompressionResult)> {
        let total = jobs.len();
        let chunks = self.plan_chunks(total);
        let mut results = Vec::with_capacity(total);
        let mut pending = jobs.into_iter();

        info!(
            "Starting parallel compression: {} jobs in {} chunks (pool size {})",
            total,
            chunks.len(),
            self.pool_size
        );

        for (chunk_index, chunk_size) in chunks.into_iter().enumerate() {
            debug!("Dispatching chunk {} with {} jobs", chunk_index + 1, chunk_size);

            let mut in_flight: FuturesUnordered<_> = pending
                .by_ref()
                .take(chunk_size)
                .map(|(index, job)| async move {
                    let input_path = job.input_path.clone();
                    let delete_original = job.options.delete_original;
                    let result = self.run_unit(index, job, reporter.clone()).await;
                    // outside the unit: a job that timed out keeps its original
                    if delete_original {
                        TaskOptimizer::delete_original(&input_path, &result).await;
                    }
                    (index, result)
                })
                .collect();

            // single aggregation point: units never touch the counter
            while let Some((index, result)) = in_flight.next().await {
                counter.record(reporter, &result);
                debug!(
                    "Compression job completed: {} (success: {}, {}/{})",
                    result.original_name,
                    result.success,
                    counter.completed(),
                    counter.total()
                );
                results.push((index, result));
            }
        }

        let failures = results.iter().filter(|(_, r)| !r.success).count();
        info!(
            "Parallel compression completed: {} succeeded, {} failed",
            results.len() - failures,
            failures
        );

        results
    }

    /// Esegue un job in un'unità isolata e ne garantisce una sola risoluzione
    async fn run_unit(&self, index: usize, job: Job, reporter: ProgressReporter) -> CompressionResult {
        let file_name = job.file_name();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = self.task.clone();

        let mut handle = tokio::spawn(async move {
            let max_iterations = task.max_iterations();
            let progress = tx.clone();
            let result = task
                .process(&job, move |iteration| {
                    let _ = progress.send(WorkerMessage::Iteration {
                        iteration,
                        max_iterations,
                    });
                })
                .await;
            let _ = tx.send(WorkerMessage::Finished(result));
        });

        let deadline = tokio::time::sleep(self.job_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                message = rx.recv() => match message {
                    Some(WorkerMessage::Iteration { iteration, max_iterations }) => {
                        reporter.iteration(index, &file_name, iteration, max_iterations);
                    }
                    Some(WorkerMessage::Finished(result)) => return result,
                    None => {
                        // channel closed without a result: the unit died
                        let reason = match (&mut handle).await {
                            Ok(()) => "exited without reporting a result".to_string(),
                            Err(e) if e.is_panic() => panic_message(e.into_panic()),
                            Err(e) => e.to_string(),
                        };
                        let err = CompressError::Crash(reason);
                        warn!("Worker for {} terminated unexpectedly: {}", file_name, err);
                        return CompressionResult::failure(file_name, err);
                    }
                },
                _ = &mut deadline => {
                    handle.abort();
                    let err = CompressError::Timeout(self.job_timeout);
                    error!("Worker timeout for {}: {}", file_name, err);
                    return CompressionResult::failure(file_name, err);
                }
            }
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with unknown payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::testing::SyntheticEncoder;
    use crate::options::{CompressionMode, CompressionOptions, FixedQuality};
    use crate::progress::ProgressEvent;
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn suffix() -> OutputStrategy {
        OutputStrategy::Suffix {
            suffix: "_comp".to_string(),
        }
    }

    fn jobs(dir: &TempDir, names: &[&str], mode: CompressionMode) -> Vec<(usize, Job)> {
        names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let path: PathBuf = dir.path().join(name);
                std::fs::write(&path, vec![3u8; 1_000_000]).unwrap();
                let options = CompressionOptions {
                    mode,
                    strip_metadata: true,
                    delete_original: false,
                };
                (index, Job::new(path, options))
            })
            .collect()
    }

    fn lossy() -> CompressionMode {
        CompressionMode::FixedQuality(FixedQuality::Lossy { quality: 60 })
    }

    #[test]
    fn test_plan_chunks() {
        let pool = WorkerPool::new(2, DEFAULT_JOB_TIMEOUT, SyntheticEncoder::linear(1).into_arc(), suffix());
        assert_eq!(pool.plan_chunks(5), vec![2, 2, 1]);
        assert_eq!(pool.plan_chunks(4), vec![2, 2]);
        assert!(pool.plan_chunks(0).is_empty());
    }

    #[test]
    fn test_default_pool_size_at_least_one() {
        assert!(default_pool_size() >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_scenario_b_chunks_and_counter() {
        let dir = TempDir::new().unwrap();
        let encoder = SyntheticEncoder::linear(100)
            .with_delay(Duration::from_millis(30))
            .into_arc();
        let pool = WorkerPool::new(2, DEFAULT_JOB_TIMEOUT, encoder.clone(), suffix());
        let batch = jobs(&dir, &["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"], lossy());

        let (reporter, mut events) = ProgressReporter::channel();
        let mut counter = CompletionCounter::new(5);
        let results = pool.compress_in_parallel(batch, &reporter, &mut counter).await;
        drop(reporter);

        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|(_, r)| r.success));
        assert!(encoder.peak.load(Ordering::SeqCst) <= 2);

        let mut completions = Vec::new();
        while let Some(event) = events.recv().await {
            if let ProgressEvent::Completion { completed_count, .. } = event {
                completions.push(completed_count);
            }
        }
        assert_eq!(completions, vec![1, 2, 3, 4, 5]);

        let mut indices: Vec<usize> = results.iter().map(|(i, _)| *i).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_next_chunk_waits_for_slowest_job() {
        let dir = TempDir::new().unwrap();
        let encoder = SyntheticEncoder::linear(100)
            .sleeping_on("slow", Duration::from_millis(400))
            .into_arc();
        let pool = WorkerPool::new(2, DEFAULT_JOB_TIMEOUT, encoder.clone(), suffix());
        let batch = jobs(&dir, &["slow.jpg", "quick.jpg", "later.jpg"], lossy());

        let mut counter = CompletionCounter::new(3);
        let results = pool
            .compress_in_parallel(batch, &ProgressReporter::disabled(), &mut counter)
            .await;
        assert!(results.iter().all(|(_, r)| r.success));

        let (_, slow_end) = encoder.span_of("slow").unwrap();
        let (_, quick_end) = encoder.span_of("quick").unwrap();
        let (later_start, _) = encoder.span_of("later").unwrap();
        // a free slot after "quick" must not pull "later" into the first chunk
        assert!(quick_end < slow_end);
        assert!(later_start >= slow_end);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_scenario_d_timeout_is_isolated() {
        let dir = TempDir::new().unwrap();
        let encoder = SyntheticEncoder::linear(100)
            .sleeping_on("slow", Duration::from_millis(1500))
            .into_arc();
        let pool = WorkerPool::new(3, Duration::from_millis(300), encoder, suffix());
        let batch = jobs(&dir, &["fast1.jpg", "slow.jpg", "fast2.jpg"], lossy());

        let mut counter = CompletionCounter::new(3);
        let results = pool
            .compress_in_parallel(batch, &ProgressReporter::disabled(), &mut counter)
            .await;

        assert_eq!(results.len(), 3);
        for (_, result) in &results {
            if result.original_name == "slow.jpg" {
                assert!(!result.success);
                assert!(result.error.as_deref().unwrap().contains("timeout"));
                assert!(result.output_path.is_none());
            } else {
                assert!(result.success, "{:?}", result.error);
            }
        }
        assert_eq!(counter.completed(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_crash_is_isolated() {
        let dir = TempDir::new().unwrap();
        let encoder = SyntheticEncoder::linear(100).panicking_on("cursed").into_arc();
        let pool = WorkerPool::new(2, DEFAULT_JOB_TIMEOUT, encoder, suffix());
        let batch = jobs(&dir, &["ok.jpg", "cursed.jpg", "fine.jpg"], lossy());

        let mut counter = CompletionCounter::new(3);
        let results = pool
            .compress_in_parallel(batch, &ProgressReporter::disabled(), &mut counter)
            .await;

        assert_eq!(results.len(), 3);
        let crashed: Vec<_> = results.iter().filter(|(_, r)| !r.success).collect();
        assert_eq!(crashed.len(), 1);
        let (index, result) = crashed[0];
        assert_eq!(*index, 1);
        let message = result.error.as_deref().unwrap();
        assert!(message.starts_with("Worker crashed"));
        assert!(message.contains("synthetic encoder panic"));
        assert!(!dir.path().join("cursed_comp.jpg").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_iteration_events_carry_job_index() {
        let dir = TempDir::new().unwrap();
        let pool = WorkerPool::new(2, DEFAULT_JOB_TIMEOUT, SyntheticEncoder::linear(10_000).into_arc(), suffix());
        let batch = jobs(&dir, &["x.jpg", "y.jpg"], CompressionMode::TargetPercent { percent: 70 });

        let (reporter, mut events) = ProgressReporter::channel();
        let mut counter = CompletionCounter::new(2);
        let results = pool.compress_in_parallel(batch, &reporter, &mut counter).await;
        drop(reporter);

        assert!(results.iter().all(|(_, r)| r.target_achieved == Some(true)));
        let mut iterations = 0;
        while let Some(event) = events.recv().await {
            if let ProgressEvent::Iteration { job_index, max_iterations, .. } = event {
                assert!(job_index < 2);
                assert_eq!(max_iterations, 10);
                iterations += 1;
            }
        }
        assert!(iterations >= 2);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42u8)), "panic with unknown payload");
    }
}
