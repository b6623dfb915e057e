//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con i parametri del batch e le opzioni di compressione
//! - Fornisce validazione dei parametri prima di avviare il batch
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `workers`: Unità di esecuzione parallele (default: core - 1, minimo 1)
//! - `job_timeout_secs`: Timeout per singolo job in secondi (default: 60)
//! - `output_strategy`: Naming dell'output (default: sottocartella `compress`)
//! - `json_output`: Output JSON riga per riga su stdout (default: false)
//! - `compression`: Opzioni di compressione di default (modalità quality, lossy, 70)
//!
//! ## Posizione:
//! `<config dir>/quick-compress/config.json`, ad esempio
//! `~/.config/quick-compress/config.json` su Linux. Un file mancante
//! equivale alla configurazione di default.
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     workers: 8,
//!     job_timeout_secs: 120,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::optimizer::path_resolver::OutputStrategy;
use crate::optimizer::worker_pool::{default_pool_size, DEFAULT_JOB_TIMEOUT};
use crate::options::{CompressionOptions, RawCompressionOptions};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "quick-compress";
const CONFIG_FILE: &str = "config.json";

/// Configuration for a compression run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of parallel execution units
    pub workers: usize,
    /// Wall-clock limit for a single job, in seconds
    pub job_timeout_secs: u64,
    /// How output files are named and placed
    pub output_strategy: OutputStrategy,
    /// Output progress and results as JSON for programmatic use
    pub json_output: bool,
    /// Default compression options applied to every input
    pub compression: RawCompressionOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: default_pool_size(),
            job_timeout_secs: DEFAULT_JOB_TIMEOUT.as_secs(),
            output_strategy: OutputStrategy::default(),
            json_output: false,
            compression: RawCompressionOptions::default(),
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        if self.job_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Job timeout must be greater than 0 seconds"));
        }

        match &self.output_strategy {
            OutputStrategy::Subfolder { name } if name.trim().is_empty() => {
                return Err(anyhow::anyhow!("Subfolder name cannot be empty"));
            }
            OutputStrategy::Suffix { suffix } if suffix.is_empty() => {
                return Err(anyhow::anyhow!("Suffix cannot be empty"));
            }
            OutputStrategy::Custom { directory, .. } if directory.as_os_str().is_empty() => {
                return Err(anyhow::anyhow!("Custom output strategy requires a directory"));
            }
            _ => {}
        }

        CompressionOptions::try_from(&self.compression)?;

        Ok(())
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Default config file location, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
