//! # Compression Options Module
//!
//! Modello dati per i job di compressione.
//!
//! ## Responsabilità:
//! - `RawCompressionOptions`: il "bag" di opzioni così come arriva da CLI o config file
//! - `CompressionOptions`: la versione validata, un tipo somma per modalità
//! - `Job` / `JobRequest`: un'immagine da comprimere con le sue opzioni
//! - `CompressionResult`: il risultato immutabile di un job
//!
//! La validazione avviene una sola volta al confine del batch: ogni modalità
//! vede solo i campi che le servono.

use crate::error::CompressError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Modalità di compressione richiesta dall'utente
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum ModeKind {
    /// Single encode at a fixed quality / PNG level
    Quality,
    /// Search for a size equal to a percentage of the original
    TargetPercent,
    /// Search for an absolute output size
    TargetAbsolute,
}

/// Formato di output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum FormatKind {
    /// JPEG output
    Lossy,
    /// PNG output
    Lossless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum SizeUnit {
    #[default]
    #[serde(rename = "KB")]
    Kb,
    #[serde(rename = "MB")]
    Mb,
}

impl SizeUnit {
    pub fn bytes(self) -> u64 {
        match self {
            Self::Kb => 1024,
            Self::Mb => 1024 * 1024,
        }
    }
}

/// Preset di compressione predefiniti
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum Preset {
    /// Preserve quality, ideal for archival use
    HighQuality,
    /// Balance between quality and file size
    Balanced,
    /// Maximum compression for web and social media
    MaxCompression,
}

impl Preset {
    /// (quality, target percent) for this preset
    pub fn values(self) -> (u8, u8) {
        match self {
            Self::HighQuality => (85, 80),
            Self::Balanced => (70, 50),
            Self::MaxCompression => (55, 25),
        }
    }
}

/// Opzioni non validate, con i nomi dei campi dell'interfaccia esterna
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCompressionOptions {
    pub mode: ModeKind,
    pub format: FormatKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_size_unit: Option<SizeUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub png_compression_level: Option<u8>,
    #[serde(default = "default_true")]
    pub remove_metadata: bool,
    #[serde(default)]
    pub delete_originals: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RawCompressionOptions {
    fn default() -> Self {
        Self {
            mode: ModeKind::Quality,
            format: FormatKind::Lossy,
            quality: Some(70),
            target_percent: Some(50),
            target_size: Some(500),
            target_size_unit: Some(SizeUnit::Kb),
            png_compression_level: Some(6),
            remove_metadata: true,
            delete_originals: false,
        }
    }
}

impl RawCompressionOptions {
    /// Sovrascrive quality e target percent con i valori del preset
    pub fn apply_preset(&mut self, preset: Preset) {
        let (quality, target_percent) = preset.values();
        self.quality = Some(quality);
        self.target_percent = Some(target_percent);
    }
}

/// Fixed-quality settings, one variant per output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedQuality {
    /// UI quality 0-100, mapped onto the encoder curve
    Lossy { quality: u8 },
    /// PNG compression level 0 (fast, larger) - 9 (slow, smaller)
    Lossless { png_level: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    FixedQuality(FixedQuality),
    TargetPercent { percent: u8 },
    TargetAbsolute { bytes: u64 },
}

impl CompressionMode {
    pub fn is_iterative(&self) -> bool {
        !matches!(self, Self::FixedQuality(_))
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::FixedQuality(FixedQuality::Lossless { .. }))
    }

    /// Estensione del file di output
    pub fn output_extension(&self) -> &'static str {
        if self.is_lossless() {
            "png"
        } else {
            "jpg"
        }
    }

    /// Target in byte per le modalità iterative
    pub fn target_bytes(&self, original_size: u64) -> Option<u64> {
        match *self {
            Self::FixedQuality(_) => None,
            Self::TargetPercent { percent } => {
                Some((original_size as f64 * f64::from(percent) / 100.0).round() as u64)
            }
            Self::TargetAbsolute { bytes } => Some(bytes),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::FixedQuality(FixedQuality::Lossy { .. }) => "quality (lossy)",
            Self::FixedQuality(FixedQuality::Lossless { .. }) => "quality (lossless)",
            Self::TargetPercent { .. } => "target percent",
            Self::TargetAbsolute { .. } => "target size",
        }
    }
}

/// Validated compression options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOptions {
    pub mode: CompressionMode,
    pub strip_metadata: bool,
    pub delete_original: bool,
}

fn required<T>(value: Option<T>, field: &str, mode: ModeKind) -> Result<T, CompressError> {
    value.ok_or_else(|| {
        CompressError::Validation(format!("{} is required for {:?} mode", field, mode))
    })
}

impl TryFrom<&RawCompressionOptions> for CompressionOptions {
    type Error = CompressError;

    fn try_from(raw: &RawCompressionOptions) -> Result<Self, Self::Error> {
        let mode = match (raw.mode, raw.format) {
            (ModeKind::Quality, FormatKind::Lossy) => {
                let quality = required(raw.quality, "quality", raw.mode)?;
                if quality > 100 {
                    return Err(CompressError::Validation(format!(
                        "quality must be between 0 and 100 (got {})",
                        quality
                    )));
                }
                CompressionMode::FixedQuality(FixedQuality::Lossy { quality })
            }
            (ModeKind::Quality, FormatKind::Lossless) => {
                let png_level = required(raw.png_compression_level, "pngCompressionLevel", raw.mode)?;
                if png_level > 9 {
                    return Err(CompressError::Validation(format!(
                        "pngCompressionLevel must be between 0 and 9 (got {})",
                        png_level
                    )));
                }
                CompressionMode::FixedQuality(FixedQuality::Lossless { png_level })
            }
            (ModeKind::TargetPercent | ModeKind::TargetAbsolute, FormatKind::Lossless) => {
                return Err(CompressError::Validation(
                    "target size modes require the lossy format".to_string(),
                ));
            }
            (ModeKind::TargetPercent, FormatKind::Lossy) => {
                let percent = required(raw.target_percent, "targetPercent", raw.mode)?;
                if !(1..=100).contains(&percent) {
                    return Err(CompressError::Validation(format!(
                        "targetPercent must be between 1 and 100 (got {})",
                        percent
                    )));
                }
                CompressionMode::TargetPercent { percent }
            }
            (ModeKind::TargetAbsolute, FormatKind::Lossy) => {
                let size = required(raw.target_size, "targetSize", raw.mode)?;
                if size == 0 {
                    return Err(CompressError::Validation(
                        "targetSize must be greater than 0".to_string(),
                    ));
                }
                let unit = raw.target_size_unit.unwrap_or_default();
                let bytes = size.checked_mul(unit.bytes()).ok_or_else(|| {
                    CompressError::Validation(format!("targetSize {} {:?} overflows", size, unit))
                })?;
                CompressionMode::TargetAbsolute { bytes }
            }
        };

        Ok(Self {
            mode,
            strip_metadata: raw.remove_metadata,
            delete_original: raw.delete_originals,
        })
    }
}

/// Richiesta di compressione non ancora validata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub input_path: PathBuf,
    pub options: RawCompressionOptions,
    #[serde(default)]
    pub output_directory: Option<PathBuf>,
}

/// One image's compression task. Immutable once submitted.
#[derive(Debug, Clone)]
pub struct Job {
    pub input_path: PathBuf,
    pub options: CompressionOptions,
    pub output_directory: Option<PathBuf>,
}

impl Job {
    pub fn new(input_path: impl Into<PathBuf>, options: CompressionOptions) -> Self {
        Self {
            input_path: input_path.into(),
            options,
            output_directory: None,
        }
    }

    pub fn with_output_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(directory.into());
        self
    }

    pub fn file_name(&self) -> String {
        display_name(&self.input_path)
    }
}

impl TryFrom<JobRequest> for Job {
    type Error = CompressError;

    fn try_from(request: JobRequest) -> Result<Self, Self::Error> {
        let options = CompressionOptions::try_from(&request.options)?;
        Ok(Self {
            input_path: request.input_path,
            options,
            output_directory: request.output_directory,
        })
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Risultato finale di un job.
///
/// Invariante: `success == false` implica dimensioni a zero e nessun `output_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionResult {
    pub original_name: String,
    pub original_size: u64,
    pub compressed_size: u64,
    /// Fraction of the original size saved: `(original - compressed) / original`
    pub ratio: f64,
    pub output_path: Option<PathBuf>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_achieved: Option<bool>,
}

impl CompressionResult {
    pub fn success(
        original_name: String,
        original_size: u64,
        compressed_size: u64,
        output_path: PathBuf,
    ) -> Self {
        let ratio = if original_size > 0 {
            (original_size as f64 - compressed_size as f64) / original_size as f64
        } else {
            0.0
        };

        Self {
            original_name,
            original_size,
            compressed_size,
            ratio,
            output_path: Some(output_path),
            success: true,
            error: None,
            iterations: None,
            target_achieved: None,
        }
    }

    pub fn failure(original_name: String, error: impl ToString) -> Self {
        Self {
            original_name,
            original_size: 0,
            compressed_size: 0,
            ratio: 0.0,
            output_path: None,
            success: false,
            error: Some(error.to_string()),
            iterations: None,
            target_achieved: None,
        }
    }

    pub fn with_search(mut self, iterations: u32, target_achieved: bool) -> Self {
        self.iterations = Some(iterations);
        self.target_achieved = Some(target_achieved);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(mode: ModeKind, format: FormatKind) -> RawCompressionOptions {
        RawCompressionOptions {
            mode,
            format,
            ..Default::default()
        }
    }

    #[test]
    fn test_quality_mode_validation() {
        let options = CompressionOptions::try_from(&raw(ModeKind::Quality, FormatKind::Lossy)).unwrap();
        assert_eq!(
            options.mode,
            CompressionMode::FixedQuality(FixedQuality::Lossy { quality: 70 })
        );
        assert!(options.strip_metadata);
        assert!(!options.delete_original);

        let mut bad = raw(ModeKind::Quality, FormatKind::Lossy);
        bad.quality = Some(101);
        assert!(CompressionOptions::try_from(&bad).is_err());

        bad.quality = None;
        let err = CompressionOptions::try_from(&bad).unwrap_err();
        assert!(err.to_string().contains("quality is required"));
    }

    #[test]
    fn test_lossless_uses_png_level() {
        let mut options = raw(ModeKind::Quality, FormatKind::Lossless);
        options.png_compression_level = Some(9);
        let validated = CompressionOptions::try_from(&options).unwrap();
        assert_eq!(
            validated.mode,
            CompressionMode::FixedQuality(FixedQuality::Lossless { png_level: 9 })
        );
        assert_eq!(validated.mode.output_extension(), "png");

        options.png_compression_level = Some(10);
        assert!(CompressionOptions::try_from(&options).is_err());
    }

    #[test]
    fn test_target_modes() {
        let mut options = raw(ModeKind::TargetPercent, FormatKind::Lossy);
        options.target_percent = Some(0);
        assert!(CompressionOptions::try_from(&options).is_err());
        options.target_percent = Some(50);
        let validated = CompressionOptions::try_from(&options).unwrap();
        assert_eq!(validated.mode.target_bytes(1_000_000), Some(500_000));
        assert!(validated.mode.is_iterative());

        let mut absolute = raw(ModeKind::TargetAbsolute, FormatKind::Lossy);
        absolute.target_size = Some(2);
        absolute.target_size_unit = Some(SizeUnit::Mb);
        let validated = CompressionOptions::try_from(&absolute).unwrap();
        assert_eq!(validated.mode, CompressionMode::TargetAbsolute { bytes: 2 * 1024 * 1024 });
        assert_eq!(validated.mode.output_extension(), "jpg");

        absolute.format = FormatKind::Lossless;
        assert!(CompressionOptions::try_from(&absolute).is_err());
    }

    #[test]
    fn test_presets() {
        let mut options = RawCompressionOptions::default();
        options.apply_preset(Preset::MaxCompression);
        assert_eq!(options.quality, Some(55));
        assert_eq!(options.target_percent, Some(25));
    }

    #[test]
    fn test_raw_options_json_field_names() {
        let json = r#"{"mode":"targetAbsolute","format":"lossy","targetSize":300,"targetSizeUnit":"KB","removeMetadata":false,"deleteOriginals":true}"#;
        let parsed: RawCompressionOptions = serde_json::from_str(json).unwrap();
        let validated = CompressionOptions::try_from(&parsed).unwrap();
        assert_eq!(validated.mode, CompressionMode::TargetAbsolute { bytes: 300 * 1024 });
        assert!(!validated.strip_metadata);
        assert!(validated.delete_original);
    }

    #[test]
    fn test_omitted_flags_use_defaults() {
        let json = r#"{"mode":"quality","format":"lossy","quality":90}"#;
        let parsed: RawCompressionOptions = serde_json::from_str(json).unwrap();
        assert!(parsed.remove_metadata);
        assert!(!parsed.delete_originals);

        let validated = CompressionOptions::try_from(&parsed).unwrap();
        assert!(validated.strip_metadata);
    }

    #[test]
    fn test_failure_result_invariant() {
        let result = CompressionResult::failure("a.jpg".to_string(), "boom");
        assert!(!result.success);
        assert_eq!(result.original_size, 0);
        assert_eq!(result.compressed_size, 0);
        assert!(result.output_path.is_none());
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_success_ratio() {
        let result = CompressionResult::success("a.jpg".into(), 1000, 250, PathBuf::from("/tmp/a.jpg"));
        assert!((result.ratio - 0.75).abs() < f64::EPSILON);
    }
}
