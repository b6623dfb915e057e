//! # Batch Optimizer Main Orchestrator
//!
//! Coordinatore del batch: valida le richieste, sceglie la modalità di
//! esecuzione e raccoglie un risultato per ogni job.
//!
//! ## Modalità:
//! - **Sequenziale** per batch con meno di `SEQUENTIAL_THRESHOLD` job:
//!   un job alla volta nel task corrente, con lo stesso timeout e lo stesso
//!   isolamento dei panic del pool
//! - **Parallela** altrimenti, delegata al `WorkerPool`
//!
//! ## Garanzie:
//! - Non fallisce mai: ogni errore diventa un `CompressionResult` con `success = false`
//! - I risultati sono restituiti in ordine di sottomissione
//! - Gli eventi `Completion` arrivano in ordine di completamento, con contatore monotono
//! - L'originale viene cancellato (se richiesto) solo dopo un successo, mai dentro il timeout

use crate::{
    config::Config,
    encoder::ImageEncoder,
    error::CompressError,
    optimizer::{
        path_resolver::OutputStrategy,
        task_optimizer::TaskOptimizer,
        worker_pool::{panic_message, WorkerPool},
    },
    options::{display_name, CompressionResult, Job, JobRequest},
    progress::{CompletionCounter, ProgressReporter},
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Sotto questa soglia il costo del pool non vale la pena
pub const SEQUENTIAL_THRESHOLD: usize = 3;

/// Orchestratore di un batch di compressioni
pub struct BatchOptimizer {
    pool: WorkerPool,
    task: TaskOptimizer,
    job_timeout: Duration,
}

impl BatchOptimizer {
    pub fn new(
        encoder: Arc<dyn ImageEncoder>,
        output_strategy: OutputStrategy,
        pool_size: usize,
        job_timeout: Duration,
    ) -> Self {
        Self {
            pool: WorkerPool::new(pool_size, job_timeout, encoder.clone(), output_strategy.clone()),
            task: TaskOptimizer::new(encoder, output_strategy),
            job_timeout,
        }
    }

    /// Crea l'orchestratore a partire dalla configurazione
    pub fn from_config(config: &Config, encoder: Arc<dyn ImageEncoder>) -> Self {
        Self::new(
            encoder,
            config.output_strategy.clone(),
            config.workers,
            config.job_timeout(),
        )
    }

    pub fn pool_size(&self) -> usize {
        self.pool.pool_size()
    }

    /// Valida e processa un batch di richieste.
    ///
    /// Le richieste non valide si risolvono subito con un errore di validazione
    /// e contano come completate; le altre diventano `Job` immutabili.
    pub async fn submit(
        &self,
        requests: Vec<JobRequest>,
        reporter: &ProgressReporter,
    ) -> Vec<CompressionResult> {
        let mut counter = CompletionCounter::new(requests.len());
        let mut resolved = Vec::with_capacity(requests.len());
        let mut jobs = Vec::with_capacity(requests.len());

        for (index, request) in requests.into_iter().enumerate() {
            let name = display_name(&request.input_path);
            match Job::try_from(request) {
                Ok(job) => jobs.push((index, job)),
                Err(e) => {
                    warn!("Rejected {}: {}", name, e);
                    let result = CompressionResult::failure(name, e);
                    counter.record(reporter, &result);
                    resolved.push((index, result));
                }
            }
        }

        resolved.extend(self.dispatch(jobs, reporter, &mut counter).await);
        Self::in_submission_order(resolved)
    }

    /// Processa un batch di job già validati
    pub async fn run(&self, jobs: Vec<Job>, reporter: &ProgressReporter) -> Vec<CompressionResult> {
        let mut counter = CompletionCounter::new(jobs.len());
        let indexed = jobs.into_iter().enumerate().collect();
        let resolved = self.dispatch(indexed, reporter, &mut counter).await;
        Self::in_submission_order(resolved)
    }

    async fn dispatch(
        &self,
        jobs: Vec<(usize, Job)>,
        reporter: &ProgressReporter,
        counter: &mut CompletionCounter,
    ) -> Vec<(usize, CompressionResult)> {
        if jobs.is_empty() {
            debug!("Nothing to compress");
            return Vec::new();
        }

        if jobs.len() < SEQUENTIAL_THRESHOLD {
            info!("🚀 Compressing {} files sequentially", jobs.len());
            self.run_sequential(jobs, reporter, counter).await
        } else {
            info!(
                "🚀 Compressing {} files with {} workers",
                jobs.len(),
                self.pool.pool_size()
            );
            self.pool.compress_in_parallel(jobs, reporter, counter).await
        }
    }

    async fn run_sequential(
        &self,
        jobs: Vec<(usize, Job)>,
        reporter: &ProgressReporter,
        counter: &mut CompletionCounter,
    ) -> Vec<(usize, CompressionResult)> {
        let max_iterations = self.task.max_iterations();
        let mut results = Vec::with_capacity(jobs.len());

        for (index, job) in jobs {
            let file_name = job.file_name();
            let unit = AssertUnwindSafe(self.task.process(&job, |iteration| {
                reporter.iteration(index, &file_name, iteration, max_iterations)
            }))
            .catch_unwind();

            let outcome = tokio::time::timeout(self.job_timeout, unit).await;
            let result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(payload)) => {
                    let err = CompressError::Crash(panic_message(payload));
                    warn!("Compression of {} panicked: {}", file_name, err);
                    CompressionResult::failure(file_name, err)
                }
                Err(_) => {
                    let err = CompressError::Timeout(self.job_timeout);
                    error!("Timeout for {}: {}", file_name, err);
                    CompressionResult::failure(file_name, err)
                }
            };

            if job.options.delete_original {
                TaskOptimizer::delete_original(&job.input_path, &result).await;
            }
            counter.record(reporter, &result);
            results.push((index, result));
        }

        results
    }

    fn in_submission_order(mut resolved: Vec<(usize, CompressionResult)>) -> Vec<CompressionResult> {
        resolved.sort_by_key(|(index, _)| *index);
        resolved.into_iter().map(|(_, result)| result).collect()
    }
}
