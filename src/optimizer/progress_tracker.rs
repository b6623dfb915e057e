//! # Progress Tracking Module
//!
//! Consumatore degli eventi di progresso. Gestisce sia l'output JSON che la
//! progress bar tradizionale.
//!
//! Il tracker è l'unico lettore del canale: il conteggio mostrato avanza solo
//! con eventi `Completion` più recenti dell'ultimo visto, mentre gli eventi
//! `Iteration` aggiornano soltanto il messaggio del job in corso.

use crate::{
    json_output::JsonMessage,
    progress::{ProgressEvent, ProgressManager},
};
use tokio::sync::mpsc;
use tracing::debug;

/// Destinazione degli aggiornamenti
pub enum TrackerOutput {
    Bar(ProgressManager),
    Json,
    /// Solo log a livello debug
    Headless,
}

/// Ultimo trial visto per un job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationStatus {
    pub file_name: String,
    pub iteration: u32,
    pub max_iterations: u32,
}

pub struct ProgressTracker {
    output: TrackerOutput,
    total: usize,
    last_completed: usize,
    current_iteration: Option<IterationStatus>,
}

impl ProgressTracker {
    pub fn new(total: usize, output: TrackerOutput) -> Self {
        Self {
            output,
            total,
            last_completed: 0,
            current_iteration: None,
        }
    }

    /// Tracker con progress bar `indicatif`
    pub fn with_bar(total: usize) -> Self {
        Self::new(total, TrackerOutput::Bar(ProgressManager::new(total as u64)))
    }

    /// Consuma il canale finché tutti i reporter non vengono chiusi
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ProgressEvent>) -> Self {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        self
    }

    /// Applica un evento. Restituisce `false` se l'evento è stato ignorato.
    pub fn handle(&mut self, event: ProgressEvent) -> bool {
        match event {
            ProgressEvent::Iteration {
                job_index,
                file_name,
                iteration,
                max_iterations,
            } => {
                match &self.output {
                    TrackerOutput::Bar(bar) => {
                        bar.set_message(&format!("{}: trial {}/{}", file_name, iteration, max_iterations))
                    }
                    TrackerOutput::Json => {
                        JsonMessage::iteration(job_index, &file_name, iteration, max_iterations).emit()
                    }
                    TrackerOutput::Headless => {
                        debug!("{}: trial {}/{}", file_name, iteration, max_iterations)
                    }
                }
                self.current_iteration = Some(IterationStatus {
                    file_name,
                    iteration,
                    max_iterations,
                });
                true
            }
            ProgressEvent::Completion {
                completed_count,
                total,
                file_name,
                success,
            } => {
                if completed_count <= self.last_completed {
                    debug!(
                        "Ignoring stale completion {} (already at {})",
                        completed_count, self.last_completed
                    );
                    return false;
                }
                self.last_completed = completed_count;
                self.total = total;

                match &self.output {
                    TrackerOutput::Bar(bar) => {
                        let status = if success { "[OK]" } else { "[ERROR]" };
                        bar.set_completed(completed_count as u64, &format!("{} {}", status, file_name));
                    }
                    TrackerOutput::Json => {
                        JsonMessage::file_complete(completed_count, total, &file_name, success).emit()
                    }
                    TrackerOutput::Headless => {
                        debug!("Completed {}/{}: {} (success: {})", completed_count, total, file_name, success)
                    }
                }

                if self
                    .current_iteration
                    .as_ref()
                    .is_some_and(|status| status.file_name == file_name)
                {
                    self.current_iteration = None;
                }
                true
            }
        }
    }

    pub fn completed(&self) -> usize {
        self.last_completed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn current_iteration(&self) -> Option<&IterationStatus> {
        self.current_iteration.as_ref()
    }

    /// Finalizza la progress bar
    pub fn finish(&self, summary: &str) {
        if let TrackerOutput::Bar(bar) = &self.output {
            bar.finish(summary);
        }
    }
}
