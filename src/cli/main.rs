//! bgblast command-line tool
//!
//! Queues images in the record store, runs background removal over the
//! pending ones and exports the results.

use super::config::CliConfigBuilder;
use crate::{
    backends::list_all_providers,
    config::{default_models_dir, BlastConfig, DEFAULT_MODEL_REPO},
    download::{verify_model_dir, ModelDownloader},
    error::BlastError,
    export::{export_processed, DEFAULT_EXPORT_DIR},
    inference::ProviderHandle,
    ingest::{ingest, load_input},
    models::ModelManager,
    pipeline::MattingPipeline,
    store::{RecordStore, SqliteRecordStore},
    tracing_config::{TracingConfig, TracingGuard},
    types::{ImageRecord, RecordId},
    worker::{PassProgress, PassReport, PendingWorker},
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif"];

/// Local background removal with a persistent queue
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgblast")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Record database [default: platform data dir]
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Model folder or HuggingFace repository (owner/name or URL) [default: Xenova/modnet]
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Model variant (fp32, fp16, quantized) [default: first available]
    #[arg(long, global = true)]
    pub variant: Option<String>,

    /// JSON configuration file; flags override its values
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Execution provider in format backend:provider (e.g., onnx:auto, onnx:coreml, tract:cpu) [default: onnx:auto]
    #[arg(short, long, global = true)]
    pub execution_provider: Option<String>,

    /// Matte resampling (nearest, bilinear) [default: bilinear]
    #[arg(long, global = true)]
    pub resample: Option<String>,

    /// Number of threads (0 = auto-detect optimal threading)
    #[arg(short, long, default_value_t = 0, global = true)]
    pub threads: usize,

    /// Enable verbose logging (-v: DEBUG for bgblast, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Queue image files or directories for background removal
    Add {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Scan directories recursively
        #[arg(short, long)]
        recursive: bool,

        /// File name pattern for directory inputs (e.g., "*.jpg")
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Remove the background from every pending image, then exit
    Process,
    /// Keep processing pending images until interrupted
    Watch {
        /// Seconds between scans
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
    /// List records, most recent first
    List,
    /// Write all processed images into a folder
    Export {
        #[arg(value_name = "DIR", default_value = DEFAULT_EXPORT_DIR)]
        dir: PathBuf,
    },
    /// Delete one record
    Delete { id: RecordId },
    /// Delete all records
    Clear,
    /// Download a model repository without processing anything
    DownloadModel {
        #[arg(value_name = "REPO", default_value = DEFAULT_MODEL_REPO)]
        repo: String,
    },
    /// Show execution provider diagnostics
    ShowProviders,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _tracing_guard = init_tracing(cli.verbose).context("Failed to initialize tracing")?;

    match &cli.command {
        Command::ShowProviders => {
            show_provider_diagnostics();
            return Ok(());
        },
        Command::DownloadModel { repo } => return download_model_only(repo).await,
        _ => {},
    }

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let store = Arc::new(
        SqliteRecordStore::open(&config.database_path).with_context(|| {
            format!("Failed to open record database {}", config.database_path.display())
        })?,
    );

    match cli.command {
        Command::Add {
            inputs,
            recursive,
            pattern,
        } => add_inputs(store.as_ref(), &inputs, recursive, pattern.as_deref()),
        Command::Process => {
            let worker = PendingWorker::new(Arc::new(load_pipeline(&config).await?), store);
            let report = process_with_progress(&worker).await?;
            print_report(&report);
            Ok(())
        },
        Command::Watch { interval } => watch(&config, store, Duration::from_secs(interval.max(1))).await,
        Command::List => list_records(store.as_ref()),
        Command::Export { dir } => {
            let summary = export_processed(store.as_ref(), &dir)
                .with_context(|| format!("Failed to export into {}", dir.display()))?;
            println!("📦 Exported {} image(s) to {}", summary.written.len(), dir.display());
            if summary.skipped_pending > 0 {
                println!("⏳ {} record(s) still pending were skipped", summary.skipped_pending);
            }
            Ok(())
        },
        Command::Delete { id } => {
            if !store.delete(id).context("Failed to delete record")? {
                anyhow::bail!("No record with id {id}");
            }
            println!("🗑️  Deleted record {id}");
            Ok(())
        },
        Command::Clear => {
            let removed = store.clear().context("Failed to clear records")?;
            println!("🗑️  Deleted {removed} record(s)");
            Ok(())
        },
        Command::ShowProviders | Command::DownloadModel { .. } => Ok(()),
    }
}

fn init_tracing(verbose_count: u8) -> Result<TracingGuard> {
    TracingConfig::new().with_verbosity(verbose_count).init()
}

/// Fetch the model when needed, then load the backend off the async runtime
async fn load_pipeline(config: &BlastConfig) -> Result<MattingPipeline> {
    if !ModelManager::is_complete(&config.model_dir) && CliConfigBuilder::uses_managed_model(config) {
        println!("⬇️  Model {} not found locally, downloading...", config.model_repo);
        let downloader = ModelDownloader::new(default_models_dir())?;
        downloader
            .ensure_model(&config.model_repo, true)
            .await
            .with_context(|| format!("Failed to download model {}", config.model_repo))?;
    }

    info!(
        "Backend: {}, Provider: {}, Model: {}",
        config.backend_type,
        config.execution_provider,
        config.model_dir.display()
    );

    let load_config = config.clone();
    let provider = tokio::task::spawn_blocking(move || ProviderHandle::load(&load_config))
        .await
        .map_err(|e| BlastError::internal(format!("Model loading task failed: {e}")))?
        .context("Failed to load matting model")?;

    Ok(MattingPipeline::new(provider, config))
}

async fn process_with_progress(worker: &PendingWorker) -> Result<PassReport> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let bar = pb.clone();
    let report = worker
        .process_pending_with_progress(move |event| match event {
            PassProgress::Scanned { total } => bar.set_length(total as u64),
            PassProgress::Finished { id, succeeded, .. } => {
                bar.set_message(if succeeded {
                    format!("✅ record {id}")
                } else {
                    format!("❌ record {id}")
                });
                bar.inc(1);
            },
        })
        .await
        .context("Failed to scan pending records")?;

    pb.finish_and_clear();
    Ok(report)
}

fn print_report(report: &PassReport) {
    if report.attempted == 0 {
        println!("✨ Nothing pending");
        return;
    }
    println!(
        "✅ Processed {}/{} pending image(s)",
        report.succeeded.len(),
        report.attempted
    );
    for (id, reason) in &report.failed {
        println!("  ❌ record {id}: {reason}");
    }
    if !report.is_clean() {
        println!("💡 Failed records stay pending and are retried on the next run");
    }
}

async fn watch(config: &BlastConfig, store: Arc<SqliteRecordStore>, interval: Duration) -> Result<()> {
    let subscription = store.subscribe(Box::new(|records: &[ImageRecord]| {
        let pending = records.iter().filter(|r| r.is_pending()).count();
        tracing::debug!(total = records.len(), pending, "Records changed");
    }));

    let worker = PendingWorker::new(Arc::new(load_pipeline(config).await?), store.clone());
    println!(
        "👀 Watching {} every {}s (Ctrl+C to stop)",
        config.database_path.display(),
        interval.as_secs()
    );

    worker
        .poll(interval, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await;

    store.unsubscribe(subscription);
    Ok(())
}

fn add_inputs(
    store: &dyn RecordStore,
    inputs: &[PathBuf],
    recursive: bool,
    pattern: Option<&str>,
) -> Result<()> {
    let files = collect_input_files(inputs, recursive, pattern)?;
    if files.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(());
    }

    let mut queued = 0;
    for path in &files {
        let file = load_input(path).with_context(|| format!("Failed to read {}", path.display()))?;
        match ingest(store, file) {
            Ok(id) => {
                queued += 1;
                println!("➕ {} → record {id}", path.display());
            },
            Err(e @ BlastError::Unsupported(_)) => warn!("Skipping {}: {e}", path.display()),
            Err(e) => return Err(e).context("Failed to queue image"),
        }
    }

    println!("📥 Queued {queued} image(s)");
    Ok(())
}

fn list_records(store: &dyn RecordStore) -> Result<()> {
    let records = store.list_most_recent_first().context("Failed to list records")?;
    if records.is_empty() {
        println!("No records.");
        return Ok(());
    }

    println!("{:>6}  {:<8}  {:<19}  {:>10}  NAME", "ID", "STATUS", "ADDED", "BYTES");
    for record in &records {
        println!(
            "{:>6}  {:<8}  {:<19}  {:>10}  {}",
            record.id,
            record.status().to_string(),
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.source.len(),
            record.source.name
        );
    }
    let pending = records.iter().filter(|r| r.is_pending()).count();
    println!("\n{} record(s), {pending} pending", records.len());
    Ok(())
}

async fn download_model_only(repo: &str) -> Result<()> {
    let downloader = ModelDownloader::new(default_models_dir())?;
    let path = downloader
        .ensure_model(repo, true)
        .await
        .with_context(|| format!("Failed to download model {repo}"))?;

    if !verify_model_dir(&path)? {
        anyhow::bail!("Checksum mismatch in {}; delete the folder and retry", path.display());
    }
    println!("✅ Model ready at {}", path.display());
    Ok(())
}

/// Print backend and provider diagnostics
fn show_provider_diagnostics() {
    println!("🔍 Backend and Execution Provider Diagnostics");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    println!("\n🚀 Execution Providers:");
    for (backend, name, available, description) in list_all_providers() {
        let status = if available { "✅ Available" } else { "❌ Not Available" };
        println!("  • {backend}:{name}: {status} - {description}");
    }

    println!("\n💡 Usage Examples:");
    println!("  --execution-provider onnx:auto    # Auto-select best ONNX provider (default)");
    println!("  --execution-provider onnx:coreml  # Use Apple CoreML (macOS)");
    println!("  --execution-provider onnx:cuda    # Use NVIDIA CUDA");
    println!("  --execution-provider onnx:cpu     # Force ONNX CPU execution");
    println!("  --execution-provider tract:cpu    # Use pure Rust Tract backend");
}

/// Expand files and directories into the image files to queue
///
/// Explicit files are kept whatever their extension so that ingestion can
/// report why it rejects them.
fn collect_input_files(inputs: &[PathBuf], recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in inputs {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            let mut found = find_image_files(path, recursive, pattern)?;
            found.sort();
            files.extend(found);
        } else {
            anyhow::bail!("Input path does not exist or is not accessible: {}", path.display());
        }
    }
    Ok(files)
}

/// Find all image files in a directory
fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let max_depth = if recursive { usize::MAX } else { 1 };

    for entry in walkdir::WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry?;
        if entry.file_type().is_file() {
            let path = entry.path();
            if is_image_file(path) && matches_pattern(path, pattern) {
                files.push(path.to_path_buf());
            }
        }
    }

    Ok(files)
}

/// Check if file is an image based on extension
fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Check if file matches the given pattern
fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|filename| glob::Pattern::new(pat).is_ok_and(|p| p.matches(filename))),
        None => true,
    }
}
