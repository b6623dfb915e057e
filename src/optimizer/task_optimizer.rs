//! # Task Optimizer Module
//!
//! Worker per la compressione di una singola immagine.
//! Separato dall'orchestratore per essere eseguito sia nel loop sequenziale
//! sia dentro un'unità del worker pool.
//!
//! ## Pipeline per job:
//! 1. Verifica input (`InputError` prima di qualsiasi encode)
//! 2. Calcolo e riserva del path di output
//! 3. Solver (modalità target) oppure encode singolo (modalità quality)
//!
//! La cancellazione opzionale dell'originale non avviene qui: il coordinatore
//! la esegue con `delete_original` solo dopo che il job si è risolto con successo.

use crate::{
    encoder::{EncodeSettings, EncoderQuality, ImageEncoder},
    error::CompressError,
    file_manager::FileManager,
    optimizer::path_resolver::{OutputStrategy, PathResolver},
    optimizer::target_solver::{
        encode_trial, map_quality, persist_trial, trial_file, SolveRequest, TargetSizeSolver,
    },
    options::{CompressionMode, CompressionResult, FixedQuality, Job},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Path di output riservato: viene rimosso se il job non arriva a `keep`
/// (errore, panic o abort dell'unità).
struct Placeholder {
    path: Option<PathBuf>,
}

impl Placeholder {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn keep(mut self) {
        self.path = None;
    }
}

impl Drop for Placeholder {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                debug!("Could not remove placeholder {}: {}", path.display(), e);
            }
        }
    }
}

/// Worker per l'elaborazione di un singolo job
#[derive(Clone)]
pub struct TaskOptimizer {
    encoder: Arc<dyn ImageEncoder>,
    solver: TargetSizeSolver,
    output_strategy: OutputStrategy,
}

impl TaskOptimizer {
    /// Crea nuovo task optimizer
    pub fn new(encoder: Arc<dyn ImageEncoder>, output_strategy: OutputStrategy) -> Self {
        Self {
            solver: TargetSizeSolver::new(encoder.clone()),
            encoder,
            output_strategy,
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.solver.max_iterations()
    }

    /// Processa un job. Non fallisce mai: ogni errore diventa un risultato `success = false`.
    ///
    /// `on_iteration` riceve il numero di ogni trial del solver.
    pub async fn process(&self, job: &Job, on_iteration: impl FnMut(u32) + Send) -> CompressionResult {
        let file_name = job.file_name();

        match self.try_process(job, on_iteration).await {
            Ok(result) => result,
            Err(e) => {
                if e.is_synthetic() {
                    error!("Compression aborted for {}: {}", file_name, e);
                } else {
                    warn!("Compression failed for {}: {}", file_name, e);
                }
                CompressionResult::failure(file_name, e)
            }
        }
    }

    async fn try_process(
        &self,
        job: &Job,
        on_iteration: impl FnMut(u32) + Send,
    ) -> Result<CompressionResult, CompressError> {
        let original_size = FileManager::inspect_input(&job.input_path).await?;
        let directory = Self::output_directory(job);
        let mode = job.options.mode;

        let output_path = PathResolver::resolve(
            &job.input_path,
            &directory,
            &self.output_strategy,
            mode.output_extension(),
        )
        .await?;

        let placeholder = Placeholder::new(output_path.clone());
        let result = self.compress(job, original_size, &output_path, on_iteration).await?;
        placeholder.keep();

        info!(
            "[OK] {}: {} -> {} ({:.1}% saved)",
            result.original_name,
            FileManager::format_size(result.original_size),
            FileManager::format_size(result.compressed_size),
            result.ratio * 100.0
        );
        Ok(result)
    }

    async fn compress(
        &self,
        job: &Job,
        original_size: u64,
        output_path: &Path,
        on_iteration: impl FnMut(u32) + Send,
    ) -> Result<CompressionResult, CompressError> {
        let file_name = job.file_name();
        let strip_metadata = job.options.strip_metadata;

        match job.options.mode {
            CompressionMode::FixedQuality(fixed) => {
                let quality = match fixed {
                    FixedQuality::Lossy { quality } => EncoderQuality::Lossy(map_quality(quality)),
                    FixedQuality::Lossless { png_level } => EncoderQuality::Lossless(png_level),
                };
                let settings = EncodeSettings { quality, strip_metadata };
                let trial = trial_file(output_path)?;
                let (trial, size) =
                    encode_trial(self.encoder.clone(), job.input_path.clone(), settings, trial).await?;
                persist_trial(trial, output_path)?;

                Ok(CompressionResult::success(file_name, original_size, size, output_path.to_path_buf()))
            }
            mode @ (CompressionMode::TargetPercent { .. } | CompressionMode::TargetAbsolute { .. }) => {
                let target_bytes = mode.target_bytes(original_size).unwrap_or(original_size);
                let outcome = self
                    .solver
                    .solve(
                        SolveRequest {
                            input: &job.input_path,
                            output: output_path,
                            original_size,
                            target_bytes,
                            strip_metadata,
                        },
                        on_iteration,
                    )
                    .await?;

                if !outcome.target_achieved {
                    debug!(
                        "{}: target {} not reached after {} trials, kept {} bytes",
                        file_name, target_bytes, outcome.iterations, outcome.compressed_size
                    );
                }

                Ok(CompressionResult::success(
                    file_name,
                    original_size,
                    outcome.compressed_size,
                    output_path.to_path_buf(),
                )
                .with_search(outcome.iterations, outcome.target_achieved))
            }
        }
    }

    fn output_directory(job: &Job) -> PathBuf {
        job.output_directory.clone().unwrap_or_else(|| {
            job.input_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }

    /// Cancella l'originale di un job risolto con successo.
    /// Gli errori vengono solo loggati e non cambiano `result.success`.
    pub(crate) async fn delete_original(input: &Path, result: &CompressionResult) {
        if !result.success {
            return;
        }
        if result.output_path.as_deref() == Some(input) {
            warn!("Not deleting {}: it is also the output file", input.display());
            return;
        }
        match tokio::fs::remove_file(input).await {
            Ok(()) => debug!("Deleted original: {}", input.display()),
            Err(e) => warn!("Failed to delete original {}: {}", input.display(), e),
        }
    }
}
