//! # Quick Compress Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom per job ed encoder
//! - `options`: Modello dati (opzioni, job, risultati)
//! - `encoder`: Astrazione sul codec e implementazione con `image`
//! - `file_manager`: Discovery delle immagini e verifica input
//! - `optimizer`: Batch, worker pool, solver e path di output
//! - `progress`: Eventi di progresso e statistiche del batch
//! - `json_output`: Output JSON per uso programmatico
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use quick_compress::{BatchOptimizer, Config, ImageCrateEncoder, ProgressReporter};
//!
//! let config = Config::default();
//! let optimizer = BatchOptimizer::from_config(&config, Arc::new(ImageCrateEncoder::new()));
//! let results = optimizer.run(jobs, &ProgressReporter::disabled()).await;
//! ```

pub mod config;
pub mod encoder;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod optimizer;
pub mod options;
pub mod progress;

pub use config::Config;
pub use encoder::{ImageCrateEncoder, ImageEncoder};
pub use error::{CompressError, EncodeError};
pub use optimizer::{BatchOptimizer, OutputStrategy, ProgressTracker};
pub use options::{CompressionOptions, CompressionResult, Job, JobRequest, RawCompressionOptions};
pub use progress::{BatchSummary, ProgressEvent, ProgressReporter};
