//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file e la discovery delle immagini.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di immagini in directory
//! - Determinazione formato file supportato
//! - Verifica dell'input prima di qualsiasi encode
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati supportati:
//! - **Immagini**: JPG, JPEG, PNG, WebP
//!
//! ## Esempio:
//! ```rust,ignore
//! let files = FileManager::find_image_files(Path::new("/path/to/photos"))?;
//! let size = FileManager::inspect_input(&files[0]).await?;
//! ```

use crate::error::CompressError;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Find all supported images under a file or directory
    pub fn find_image_files(path: &Path) -> Result<Vec<PathBuf>> {
        if path.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }
        if !path.exists() {
            return Err(anyhow::anyhow!("Input does not exist: {}", path.display()));
        }

        let mut files = Vec::new();

        for entry in WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if Self::is_image(path) {
                files.push(path.to_path_buf());
            } else {
                debug!("Skipping non-image file: {}", path.display());
            }
        }

        Ok(files)
    }

    /// Check if a file is a supported image
    pub fn is_image(path: &Path) -> bool {
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            matches!(ext_lower.as_str(), "jpg" | "jpeg" | "png" | "webp")
        } else {
            false
        }
    }

    /// Verifica l'input di un job e restituisce la sua dimensione in byte
    pub async fn inspect_input(path: &Path) -> Result<u64, CompressError> {
        if !Self::is_image(path) {
            return Err(CompressError::Input(format!(
                "Unsupported file type: {}",
                path.display()
            )));
        }

        let metadata = fs::metadata(path).await.map_err(|e| {
            CompressError::Input(format!("Cannot read {}: {}", path.display(), e))
        })?;

        if !metadata.is_file() {
            return Err(CompressError::Input(format!("Not a file: {}", path.display())));
        }
        if metadata.len() == 0 {
            return Err(CompressError::Input(format!("File is empty: {}", path.display())));
        }

        Ok(metadata.len())
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}
