//! # Quick Compress - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione e applicazione degli override da CLI
//! - Discovery degli input, avvio del batch e stampa del riepilogo
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (input, modalità, qualità, target, workers, etc.)
//! 2. Configura il logging su stderr (`RUST_LOG`, altrimenti INFO o DEBUG)
//! 3. Carica il config file e applica preset e flag espliciti, in quest'ordine
//! 4. Trova le immagini negli input (file o directory, ricorsivo)
//! 5. Avvia il tracker di progresso e il `BatchOptimizer`
//! 6. Stampa il riepilogo (o il messaggio JSON `complete`)
//!
//! ## Esempio di utilizzo:
//! ```bash
//! quick-compress ~/Pictures/trip --mode target-percent --target-percent 40 --workers 4
//! quick-compress photo.png --format lossless --png-level 9 --output-strategy suffix
//! ```

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use quick_compress::{
    file_manager::FileManager,
    json_output::JsonMessage,
    optimizer::{
        path_resolver::{DEFAULT_SUBFOLDER, DEFAULT_SUFFIX},
        TrackerOutput,
    },
    options::{FormatKind, ModeKind, Preset, SizeUnit},
    BatchOptimizer, BatchSummary, CompressionOptions, Config, ImageCrateEncoder, JobRequest,
    OutputStrategy, ProgressReporter, ProgressTracker,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyKind {
    /// Write into a subfolder next to each input
    Subfolder,
    /// Write next to each input with a name suffix
    Suffix,
    /// Write into a fixed directory
    Custom,
}

#[derive(Parser)]
#[command(name = "quick-compress")]
#[command(about = "Compress images to a fixed quality or a target file size")]
struct Args {
    /// Image files or directories to compress
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Compression mode
    #[arg(short, long, value_enum)]
    mode: Option<ModeKind>,

    /// Output format (lossy = JPEG, lossless = PNG)
    #[arg(short, long, value_enum)]
    format: Option<FormatKind>,

    /// Quality for quality mode (0-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Target size as a percentage of the original (1-100)
    #[arg(long)]
    target_percent: Option<u8>,

    /// Absolute target size, in --unit
    #[arg(long)]
    target_size: Option<u64>,

    /// Unit for --target-size
    #[arg(long, value_enum)]
    unit: Option<SizeUnit>,

    /// PNG compression level for lossless output (0-9)
    #[arg(long)]
    png_level: Option<u8>,

    /// Keep metadata instead of stripping it
    #[arg(long)]
    keep_metadata: bool,

    /// Delete each original after a successful compression
    #[arg(long)]
    delete_originals: bool,

    /// Quality / target preset
    #[arg(short, long, value_enum)]
    preset: Option<Preset>,

    /// Output naming strategy
    #[arg(long, value_enum)]
    output_strategy: Option<StrategyKind>,

    /// Subfolder name for the subfolder strategy
    #[arg(long)]
    subfolder_name: Option<String>,

    /// Name suffix for the suffix and custom strategies
    #[arg(long)]
    suffix: Option<String>,

    /// Output directory for the custom strategy
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of parallel workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Per-file timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Output progress and results as JSON lines on stdout
    #[arg(long)]
    json: bool,

    /// Config file (default: <config dir>/quick-compress/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Save the effective configuration to the config file
    #[arg(long)]
    save_config: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging on stderr, stdout is reserved for --json
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let json = args.json;
    if let Err(e) = run(args).await {
        if json {
            JsonMessage::error(e.to_string(), e.chain().nth(1).map(|s| s.to_string())).emit();
        }
        return Err(e);
    }

    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let start_time = Instant::now();

    let config_path = args.config.clone().or_else(Config::default_path);
    let mut config = match &config_path {
        Some(path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    apply_overrides(&mut config, &args)?;
    config.validate()?;

    if args.save_config {
        let path = config_path
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No config directory available, use --config"))?;
        config.save_to_file(path).await?;
        info!("💾 Configuration saved to {}", path.display());
    }

    let mut files = Vec::new();
    for input in &args.inputs {
        files.extend(FileManager::find_image_files(input)?);
    }

    let mode = CompressionOptions::try_from(&config.compression)?.mode;
    if config.json_output {
        JsonMessage::start(args.inputs.clone(), files.len(), config.workers, mode.label()).emit();
    } else {
        info!("Found {} images to compress", files.len());
        info!("Mode: {}", mode.label());
        info!("Output: {:?}", config.output_strategy);
    }

    if files.is_empty() {
        if config.json_output {
            JsonMessage::complete(Vec::new(), start_time.elapsed().as_secs_f64()).emit();
        } else {
            warn!("No images found to compress");
        }
        return Ok(());
    }

    let requests: Vec<JobRequest> = files
        .into_iter()
        .map(|input_path| JobRequest {
            input_path,
            options: config.compression.clone(),
            output_directory: None,
        })
        .collect();

    let optimizer = BatchOptimizer::from_config(&config, Arc::new(ImageCrateEncoder::new()));

    let tracker = if config.json_output {
        ProgressTracker::new(requests.len(), TrackerOutput::Json)
    } else {
        ProgressTracker::with_bar(requests.len())
    };
    let (reporter, events) = ProgressReporter::channel();
    let tracker_handle = tokio::spawn(tracker.run(events));

    let results = optimizer.submit(requests, &reporter).await;
    drop(reporter);
    let tracker = tracker_handle.await?;

    let summary = BatchSummary::from_results(&results);
    tracker.finish(&summary.format_summary());
    let duration = start_time.elapsed().as_secs_f64();

    if config.json_output {
        JsonMessage::complete(results, duration).emit();
    } else {
        for failed in results.iter().filter(|r| !r.success) {
            warn!(
                "[ERROR] {}: {}",
                failed.original_name,
                failed.error.as_deref().unwrap_or("unknown error")
            );
        }
        info!("=== Compression Complete ===");
        info!("Files processed: {}", summary.total_files);
        info!("Succeeded: {}", summary.succeeded);
        info!("Failed: {}", summary.failed);
        info!(
            "Total size: {} -> {}",
            FileManager::format_size(summary.total_original),
            FileManager::format_size(summary.total_compressed)
        );
        info!(
            "Saved: {} ({:.2}%)",
            FileManager::format_size(summary.bytes_saved()),
            summary.overall_ratio * 100.0
        );
        info!("Duration: {:.2}s", duration);
    }

    Ok(())
}

/// Applica preset e flag espliciti sopra la configurazione caricata
fn apply_overrides(config: &mut Config, args: &Args) -> Result<()> {
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(timeout) = args.timeout {
        config.job_timeout_secs = timeout;
    }
    if args.json {
        config.json_output = true;
    }

    let compression = &mut config.compression;
    if let Some(preset) = args.preset {
        compression.apply_preset(preset);
    }
    if let Some(mode) = args.mode {
        compression.mode = mode;
    }
    if let Some(format) = args.format {
        compression.format = format;
    }
    if args.quality.is_some() {
        compression.quality = args.quality;
    }
    if args.target_percent.is_some() {
        compression.target_percent = args.target_percent;
    }
    if args.target_size.is_some() {
        compression.target_size = args.target_size;
    }
    if args.unit.is_some() {
        compression.target_size_unit = args.unit;
    }
    if args.png_level.is_some() {
        compression.png_compression_level = args.png_level;
    }
    if args.keep_metadata {
        compression.remove_metadata = false;
    }
    if args.delete_originals {
        compression.delete_originals = true;
    }

    config.output_strategy = output_strategy(&config.output_strategy, args)?;
    Ok(())
}

fn output_strategy(current: &OutputStrategy, args: &Args) -> Result<OutputStrategy> {
    let kind = args.output_strategy.or_else(|| {
        // an output directory alone implies the custom strategy
        args.output_dir.as_ref().map(|_| StrategyKind::Custom)
    });

    let strategy = match (kind, current) {
        (None, OutputStrategy::Subfolder { name }) => OutputStrategy::Subfolder {
            name: args.subfolder_name.clone().unwrap_or_else(|| name.clone()),
        },
        (None, OutputStrategy::Suffix { suffix }) => OutputStrategy::Suffix {
            suffix: args.suffix.clone().unwrap_or_else(|| suffix.clone()),
        },
        (None, OutputStrategy::Custom { directory, suffix }) => OutputStrategy::Custom {
            directory: directory.clone(),
            suffix: args.suffix.clone().or_else(|| suffix.clone()),
        },
        (Some(StrategyKind::Subfolder), _) => OutputStrategy::Subfolder {
            name: args
                .subfolder_name
                .clone()
                .unwrap_or_else(|| DEFAULT_SUBFOLDER.to_string()),
        },
        (Some(StrategyKind::Suffix), _) => OutputStrategy::Suffix {
            suffix: args.suffix.clone().unwrap_or_else(|| DEFAULT_SUFFIX.to_string()),
        },
        (Some(StrategyKind::Custom), current) => {
            let directory = match (&args.output_dir, current) {
                (Some(dir), _) => dir.clone(),
                (None, OutputStrategy::Custom { directory, .. }) => directory.clone(),
                (None, _) => {
                    return Err(anyhow::anyhow!("--output-strategy custom requires --output-dir"))
                }
            };
            OutputStrategy::Custom {
                directory,
                suffix: args.suffix.clone(),
            }
        }
    };

    Ok(strategy)
}
