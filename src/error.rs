//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `CompressError` per categorizzare gli errori di un singolo job
//! - Definisce `EncodeError` per i fallimenti del codec durante un trial
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `Input`: File mancante, illeggibile, vuoto o di tipo non supportato
//! - `Encode`: Errore del codec durante un trial (interrompe il job)
//! - `Timeout`: Il job ha superato il budget di tempo
//! - `Crash`: L'unità di esecuzione è terminata senza riportare un risultato
//! - `Validation`: Opzioni di compressione non valide
//! - `Io`: Errori di I/O su file temporanei e di output
//!
//! ## Propagazione:
//! Ogni errore viene catturato al confine del job e convertito in un
//! `CompressionResult` con `success = false`. Nessun errore arriva al
//! coordinatore del batch.
//!
//! ## Esempio:
//! ```rust,ignore
//! if !path.exists() {
//!     return Err(CompressError::Input(format!("File not found: {}", path.display())));
//! }
//! ```

use std::time::Duration;

/// Errors raised by an [`ImageEncoder`](crate::encoder::ImageEncoder) for a single trial
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported encoder settings: {0}")]
    Unsupported(String),
}

/// Custom error types for a compression job
#[derive(thiserror::Error, Debug)]
pub enum CompressError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Compression timeout after {}s - file may be too large or corrupted", .0.as_secs())]
    Timeout(Duration),

    #[error("Worker crashed: {0}")]
    Crash(String),

    #[error("Invalid compression options: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompressError {
    /// True for failures produced by the pool rather than by the job itself
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Crash(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_mentions_timeout() {
        let err = CompressError::Timeout(Duration::from_secs(60));
        let message = err.to_string();
        assert!(message.contains("timeout"));
        assert!(message.contains("60s"));
        assert!(err.is_synthetic());
    }

    #[test]
    fn test_encode_error_wraps_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CompressError = EncodeError::from(io).into();
        assert!(matches!(err, CompressError::Encode(EncodeError::Io(_))));
        assert!(!err.is_synthetic());
    }
}
