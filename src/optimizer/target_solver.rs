//! # Target-Size Solver Module
//!
//! Ricerca binaria sulla qualità UI (0-100) per trovare un output entro
//! la banda di tolleranza (±5%) attorno alla dimensione target.
//!
//! ## Algoritmo:
//! 0. Primo trial a qualità 100: se non supera il target, è già il risultato
//!    migliore possibile (target sopra il massimo raggiungibile)
//! 1. `test_quality` = punto medio di `[min_quality, max_quality]`, mappato
//!    sulla curva del codec con `map_quality`
//! 2. Encode su file temporaneo e misura della dimensione
//! 3. Dentro la banda: il trial diventa l'output finale, stop
//! 4. Altrimenti, se più vicino del migliore finora, sostituisce il migliore
//! 5. Restringe l'intervallo e ripete, al massimo 10 iterazioni
//!
//! ## File su disco:
//! Ogni trial è un `NamedTempFile` accanto all'output finale. I trial scartati
//! vengono cancellati subito (drop), quindi per ogni job esiste al più un file
//! "migliore" su disco.

use crate::encoder::{EncodeSettings, EncoderQuality, ImageEncoder};
use crate::error::CompressError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;

pub const MAX_ITERATIONS: u32 = 10;
pub const TOLERANCE: f64 = 0.05;
/// UI quality of the first trial
const TOP_QUALITY: u8 = 100;

/// Maps UI quality (0-100) onto the encoder range (60-95).
///
/// Three linear bands: `[0,33] -> [60,75]`, `[34,66] -> [76,85]`, `[67,100] -> [86,95]`.
pub fn map_quality(ui_quality: u8) -> u8 {
    let q = f64::from(ui_quality.min(100));
    let mapped = if q <= 33.0 {
        60.0 + (q / 33.0) * 15.0
    } else if q <= 66.0 {
        76.0 + ((q - 34.0) / 32.0) * 9.0
    } else {
        86.0 + ((q - 67.0) / 33.0) * 9.0
    };
    mapped.round() as u8
}

/// Stato effimero della ricerca, vive solo dentro `solve`
#[derive(Debug)]
pub struct SolverState {
    pub min_quality: i32,
    pub max_quality: i32,
    pub iteration_count: u32,
    best: Option<BestTrial>,
}

#[derive(Debug)]
struct BestTrial {
    file: NamedTempFile,
    size: u64,
    quality: u8,
}

impl SolverState {
    pub fn new() -> Self {
        Self {
            min_quality: 0,
            max_quality: 100,
            iteration_count: 0,
            best: None,
        }
    }

    pub fn is_searching(&self, max_iterations: u32) -> bool {
        self.min_quality <= self.max_quality && self.iteration_count < max_iterations
    }

    /// Midpoint, rounded half up
    pub fn test_quality(&self) -> u8 {
        ((self.min_quality + self.max_quality + 1) / 2).clamp(0, 100) as u8
    }

    /// Restringe l'intervallo in base al risultato del trial
    pub fn narrow(&mut self, test_quality: u8, trial_size: u64, target: u64) {
        if trial_size > target {
            self.max_quality = i32::from(test_quality) - 1;
        } else {
            self.min_quality = i32::from(test_quality) + 1;
        }
    }

    pub fn best_size(&self) -> Option<u64> {
        self.best.as_ref().map(|best| best.size)
    }
}

impl Default for SolverState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct SolveRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub original_size: u64,
    pub target_bytes: u64,
    pub strip_metadata: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub compressed_size: u64,
    pub iterations: u32,
    pub target_achieved: bool,
    pub encoder_quality: u8,
}

pub(crate) fn distance(size: u64, target: u64) -> u64 {
    size.abs_diff(target)
}

pub(crate) fn within_tolerance(size: u64, target: u64, tolerance: f64) -> bool {
    if target == 0 {
        return size == 0;
    }
    distance(size, target) as f64 / target as f64 <= tolerance
}

/// Crea il file temporaneo per un trial accanto all'output finale
pub(crate) fn trial_file(output: &Path) -> Result<NamedTempFile, CompressError> {
    let dir = output.parent().unwrap_or_else(|| Path::new("."));
    let suffix = output
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    Ok(tempfile::Builder::new()
        .prefix(".qc-trial-")
        .suffix(&suffix)
        .tempfile_in(dir)?)
}

/// Esegue un encode bloccante su `trial`, restituendo il file e la sua dimensione.
///
/// Il file temporaneo viaggia dentro la closure: se il job viene abortito
/// durante l'encode, il file viene cancellato quando l'encode termina.
pub(crate) async fn encode_trial(
    encoder: Arc<dyn ImageEncoder>,
    input: PathBuf,
    settings: EncodeSettings,
    trial: NamedTempFile,
) -> Result<(NamedTempFile, u64), CompressError> {
    let handle = tokio::task::spawn_blocking(move || {
        let size = encoder.encode(&input, &settings, trial.path());
        (trial, size)
    });

    match handle.await {
        Ok((trial, size)) => Ok((trial, size?)),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(CompressError::Crash(format!("encoder task cancelled: {}", e))),
    }
}

/// Persiste un trial sul path di output (rename atomico)
pub(crate) fn persist_trial(trial: NamedTempFile, output: &Path) -> Result<(), CompressError> {
    trial.persist(output).map_err(|e| CompressError::Io(e.error))?;
    Ok(())
}

/// Binary search over UI quality towards a target size
#[derive(Clone)]
pub struct TargetSizeSolver {
    encoder: Arc<dyn ImageEncoder>,
    max_iterations: u32,
    tolerance: f64,
}

impl TargetSizeSolver {
    pub fn new(encoder: Arc<dyn ImageEncoder>) -> Self {
        Self {
            encoder,
            max_iterations: MAX_ITERATIONS,
            tolerance: TOLERANCE,
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Encode di un singolo trial alla qualità UI indicata
    async fn trial(
        &self,
        request: &SolveRequest<'_>,
        test_quality: u8,
    ) -> Result<(NamedTempFile, u64, u8), CompressError> {
        let encoder_quality = map_quality(test_quality);
        let settings = EncodeSettings {
            quality: EncoderQuality::Lossy(encoder_quality),
            strip_metadata: request.strip_metadata,
        };

        let trial = trial_file(request.output)?;
        let (trial, size) = encode_trial(
            self.encoder.clone(),
            request.input.to_path_buf(),
            settings,
            trial,
        )
        .await?;
        Ok((trial, size, encoder_quality))
    }

    /// Esegue la ricerca. `on_iteration` riceve il numero (1-based) di ogni trial.
    ///
    /// Il primo trial è sempre in cima alla curva: se già non supera il target,
    /// nessuna qualità può avvicinarsi di più e la ricerca termina subito.
    pub async fn solve(
        &self,
        request: SolveRequest<'_>,
        mut on_iteration: impl FnMut(u32) + Send,
    ) -> Result<SolveOutcome, CompressError> {
        let target = request.target_bytes;
        let mut state = SolverState::new();

        debug!(
            "Solving {} for target {} bytes (original {} bytes)",
            request.input.display(),
            target,
            request.original_size
        );

        let mut test_quality = TOP_QUALITY;
        while state.is_searching(self.max_iterations) {
            state.iteration_count += 1;
            on_iteration(state.iteration_count);

            let (trial, size, encoder_quality) = self.trial(&request, test_quality).await?;

            debug!(
                "Trial {}: quality {} (encoder {}) -> {} bytes",
                state.iteration_count, test_quality, encoder_quality, size
            );

            let at_ceiling = test_quality == TOP_QUALITY && size <= target;
            if at_ceiling || within_tolerance(size, target, self.tolerance) {
                persist_trial(trial, request.output)?;
                return Ok(SolveOutcome {
                    compressed_size: size,
                    iterations: state.iteration_count,
                    target_achieved: true,
                    encoder_quality,
                });
            }

            let improves = state
                .best_size()
                .map_or(true, |best| distance(size, target) < distance(best, target));
            if improves {
                // il vecchio migliore viene cancellato al drop
                state.best = Some(BestTrial {
                    file: trial,
                    size,
                    quality: encoder_quality,
                });
            }

            state.narrow(test_quality, size, target);
            test_quality = state.test_quality();
        }

        let best = state.best.take().ok_or_else(|| {
            CompressError::Crash("search ended without any trial".to_string())
        })?;
        persist_trial(best.file, request.output)?;

        Ok(SolveOutcome {
            compressed_size: best.size,
            iterations: state.iteration_count,
            target_achieved: false,
            encoder_quality: best.quality,
        })
    }
}
