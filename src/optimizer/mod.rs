//! # Optimizer Module
//!
//! Modulo che separa le responsabilità in sottomoduli:
//! - `batch_optimizer`: Orchestratore del batch (sequenziale o parallelo)
//! - `worker_pool`: Unità di esecuzione isolate con timeout e chunking
//! - `task_optimizer`: Worker per singoli job
//! - `target_solver`: Ricerca binaria della qualità per una dimensione target
//! - `progress_tracker`: Consumatore degli eventi di progresso
//! - `path_resolver`: Logica di calcolo path centralizzata

pub mod batch_optimizer;
pub mod path_resolver;
pub mod progress_tracker;
pub mod target_solver;
pub mod task_optimizer;
pub mod worker_pool;

pub use batch_optimizer::BatchOptimizer;
pub use path_resolver::{OutputStrategy, PathResolver};
pub use progress_tracker::{ProgressTracker, TrackerOutput};
pub use target_solver::TargetSizeSolver;
pub use task_optimizer::TaskOptimizer;
pub use worker_pool::WorkerPool;
