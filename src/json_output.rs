//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso programmatico
//! (un frontend o uno script che legge stdout riga per riga).
//!
//! ## Responsabilità:
//! - Emette un messaggio JSON per riga su stdout
//! - Riusa `CompressionResult` e `BatchSummary` così come sono serializzati
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio del batch
//! - `iteration`: Trial del solver per un job
//! - `file_complete`: Un job si è risolto (contatore monotono)
//! - `complete`: Fine batch con riepilogo e risultati per file
//! - `error`: Errore fatale prima o durante il batch

use crate::options::CompressionResult;
use crate::progress::BatchSummary;
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    /// Inizio del batch
    Start {
        inputs: Vec<PathBuf>,
        total_files: usize,
        workers: usize,
        mode: String,
    },

    /// Trial del solver
    Iteration {
        index: usize,
        file: String,
        iteration: u32,
        max_iterations: u32,
    },

    /// Un job si è risolto
    FileComplete {
        completed: usize,
        total: usize,
        file: String,
        success: bool,
    },

    /// Batch completato
    Complete {
        summary: BatchSummary,
        results: Vec<CompressionResult>,
        duration_seconds: f64,
    },

    /// Errore generale
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(inputs: Vec<PathBuf>, total_files: usize, workers: usize, mode: &str) -> Self {
        Self::Start {
            inputs,
            total_files,
            workers,
            mode: mode.to_string(),
        }
    }

    pub fn iteration(index: usize, file: &str, iteration: u32, max_iterations: u32) -> Self {
        Self::Iteration {
            index,
            file: file.to_string(),
            iteration,
            max_iterations,
        }
    }

    pub fn file_complete(completed: usize, total: usize, file: &str, success: bool) -> Self {
        Self::FileComplete {
            completed,
            total,
            file: file.to_string(),
            success,
        }
    }

    /// Crea il messaggio finale a partire dai risultati
    pub fn complete(results: Vec<CompressionResult>, duration_seconds: f64) -> Self {
        Self::Complete {
            summary: BatchSummary::from_results(&results),
            results,
            duration_seconds,
        }
    }

    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            details,
        }
    }
}
