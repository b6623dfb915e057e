//! # Progress Reporting and Statistics Module
//!
//! Questo modulo gestisce gli eventi di progresso e le statistiche del batch.
//!
//! ## Responsabilità:
//! - `ProgressEvent`: unione discriminata `Iteration` / `Completion`
//! - `ProgressReporter`: lato produttore di un singolo canale di eventi
//! - `CompletionCounter`: unico punto di aggregazione del contatore "completed"
//! - `ProgressManager`: progress bar visual con `indicatif`
//! - `BatchSummary`: riduzione pura dei risultati finali
//!
//! ## Regole del contatore:
//! Il contatore dei job completati viene incrementato solo da
//! `CompletionCounter::record`, chiamato sequenzialmente dal coordinatore
//! ogni volta che un job si risolve. I worker non lo toccano mai.
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================>---------------] 3/5 (60%) beach.jpg: trial 4/10
//! ```
//!
//! ## Esempio:
//! ```rust,ignore
//! let (reporter, mut events) = ProgressReporter::channel();
//! let results = optimizer.run(jobs, &reporter).await;
//! let summary = BatchSummary::from_results(&results);
//! ```

use crate::file_manager::FileManager;
use crate::options::CompressionResult;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

/// Evento di progresso emesso verso l'osservatore esterno
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A solver trial is starting for the job at `job_index`
    Iteration {
        job_index: usize,
        file_name: String,
        iteration: u32,
        max_iterations: u32,
    },
    /// A job has resolved. Authoritative for the completed count.
    Completion {
        completed_count: usize,
        total: usize,
        file_name: String,
        success: bool,
    },
}

/// Lato produttore del canale di progresso. Senza canale è un no-op.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    sender: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    /// Crea un reporter collegato a un nuovo canale
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender: Some(sender) }, receiver)
    }

    /// Reporter che scarta tutti gli eventi
    pub fn disabled() -> Self {
        Self::default()
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            // observer gone: nothing left to notify
            let _ = sender.send(event);
        }
    }

    pub fn iteration(&self, job_index: usize, file_name: &str, iteration: u32, max_iterations: u32) {
        self.emit(ProgressEvent::Iteration {
            job_index,
            file_name: file_name.to_string(),
            iteration,
            max_iterations,
        });
    }

    fn completion(&self, completed_count: usize, total: usize, file_name: &str, success: bool) {
        self.emit(ProgressEvent::Completion {
            completed_count,
            total,
            file_name: file_name.to_string(),
            success,
        });
    }
}

/// Contatore dei job completati di un batch
#[derive(Debug)]
pub struct CompletionCounter {
    completed: usize,
    total: usize,
}

impl CompletionCounter {
    pub fn new(total: usize) -> Self {
        Self { completed: 0, total }
    }

    /// Registra la risoluzione di un job ed emette l'evento `Completion`
    pub fn record(&mut self, reporter: &ProgressReporter, result: &CompressionResult) -> usize {
        self.completed += 1;
        reporter.completion(self.completed, self.total, &result.original_name, result.success);
        self.completed
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

/// Manages the progress bar for a batch
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Set the completed count and a status message
    pub fn set_completed(&self, completed: u64, message: &str) {
        self.bar.set_position(completed);
        self.bar.set_message(message.to_string());
    }

    /// Set a custom message without moving the bar
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Statistiche aggregate di un batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_original: u64,
    pub total_compressed: u64,
    /// `(total_original - total_compressed) / total_original`, 0 when nothing succeeded
    pub overall_ratio: f64,
}

impl BatchSummary {
    pub fn from_results(results: &[CompressionResult]) -> Self {
        let successes = results.iter().filter(|r| r.success);
        let (succeeded, total_original, total_compressed) = successes.fold(
            (0usize, 0u64, 0u64),
            |(count, original, compressed), r| {
                (count + 1, original + r.original_size, compressed + r.compressed_size)
            },
        );

        let overall_ratio = if total_original > 0 {
            (total_original as f64 - total_compressed as f64) / total_original as f64
        } else {
            0.0
        };

        Self {
            total_files: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            total_original,
            total_compressed,
            overall_ratio,
        }
    }

    pub fn bytes_saved(&self) -> u64 {
        self.total_original.saturating_sub(self.total_compressed)
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} files | Succeeded: {} | Failed: {} | {} -> {} | Saved: {} ({:.2}%)",
            self.total_files,
            self.succeeded,
            self.failed,
            FileManager::format_size(self.total_original),
            FileManager::format_size(self.total_compressed),
            FileManager::format_size(self.bytes_saved()),
            self.overall_ratio * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_summary_counts_successes_only() {
        let results = vec![
            CompressionResult::success("a.jpg".into(), 1_000_000, 400_000, PathBuf::from("a_comp.jpg")),
            CompressionResult::failure("b.jpg".into(), "timeout"),
            CompressionResult::success("c.jpg".into(), 1_000_000, 600_000, PathBuf::from("c_comp.jpg")),
        ];

        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_original, 2_000_000);
        assert_eq!(summary.total_compressed, 1_000_000);
        assert!((summary.overall_ratio - 0.5).abs() < 1e-9);
        assert_eq!(summary.bytes_saved(), 1_000_000);
    }

    #[test]
    fn test_summary_empty_batch() {
        let summary = BatchSummary::from_results(&[]);
        assert_eq!(summary.overall_ratio, 0.0);
        assert!(summary.format_summary().contains("Processed: 0 files"));
    }

    #[tokio::test]
    async fn test_counter_emits_monotonic_completions() {
        let (reporter, mut events) = ProgressReporter::channel();
        let mut counter = CompletionCounter::new(2);

        counter.record(&reporter, &CompressionResult::failure("x.jpg".into(), "bad"));
        counter.record(
            &reporter,
            &CompressionResult::success("y.jpg".into(), 10, 5, PathBuf::from("y_comp.jpg")),
        );
        drop(reporter);

        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                ProgressEvent::Completion {
                    completed_count: 1,
                    total: 2,
                    file_name: "x.jpg".into(),
                    success: false
                },
                ProgressEvent::Completion {
                    completed_count: 2,
                    total: 2,
                    file_name: "y.jpg".into(),
                    success: true
                },
            ]
        );
        assert_eq!(counter.completed(), counter.total());
    }

    #[test]
    fn test_disabled_reporter_is_noop() {
        let reporter = ProgressReporter::disabled();
        reporter.iteration(0, "a.jpg", 1, 10);
        let mut counter = CompletionCounter::new(1);
        assert_eq!(counter.record(&reporter, &CompressionResult::failure("a.jpg".into(), "e")), 1);
    }
}
