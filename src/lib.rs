#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # bgblast
//!
//! Local background removal for still images. A MODNet portrait-matting
//! model predicts a soft alpha matte; the matte is resampled to the source
//! resolution and written into the alpha channel of the original pixels.
//!
//! Images are queued as records in a SQLite store. A worker scans the
//! pending records, most recent first, and attaches a background-free PNG to
//! each one it processes. A record whose processing fails stays pending and
//! is retried on the next pass.
//!
//! ## Features
//!
//! - **Two Backends**: ONNX Runtime (CUDA, `CoreML`, CPU) and Tract (pure Rust)
//! - **Persistent Queue**: SQLite record store with change subscriptions
//! - **Model Management**: Downloads MODNet from `HuggingFace` with SHA-256 sidecars
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgblast::{
//!     BlastConfig, MattingPipeline, PendingWorker, ProviderHandle, RecordStore,
//!     SqliteRecordStore, ingest, ImageFile,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = BlastConfig::default();
//! let store = Arc::new(SqliteRecordStore::open(&config.database_path)?);
//! ingest(store.as_ref(), ImageFile::from_path("portrait.jpg")?)?;
//!
//! let pipeline = MattingPipeline::new(ProviderHandle::load(&config)?, &config);
//! let worker = PendingWorker::new(Arc::new(pipeline), store.clone());
//! let report = worker.process_pending().await?;
//! println!("{} processed, {} failed", report.succeeded.len(), report.failed.len());
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): Command-line interface and progress reporting
//! - `webp-support` (default): WebP input support
//! - `tracing-json`, `tracing-files`: extra log outputs for the CLI

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod download;
pub mod error;
pub mod export;
pub mod inference;
pub mod ingest;
pub mod matte;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod store;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod worker;

// Public API exports
pub use backends::*;
pub use compositor::composite;
pub use config::{
    BackendType, BlastConfig, BlastConfigBuilder, ExecutionProvider, ResampleMethod,
    DEFAULT_MODEL_REPO, DEFAULT_OUTPUT_SUFFIX,
};
pub use download::{parse_repo_id, validate_model_url, verify_model_dir, ModelDownloader};
pub use error::{BlastError, Result};
pub use export::{export_processed, ExportSummary, DEFAULT_EXPORT_DIR};
pub use inference::{BackendFactory, DefaultBackendFactory, InferenceBackend, ProviderHandle};
pub use ingest::{ingest, load_input};
pub use matte::Matte;
pub use models::{ModelInfo, ModelManager, PreprocessingConfig, ResizeTarget};
pub use pipeline::{processed_file_name, MattingPipeline};
pub use preprocessing::{ImagePreprocessor, MAX_INPUT_EDGE};
pub use store::{RecordStore, SqliteRecordStore, StoreListener, SubscriptionId};
pub use types::{
    ImageFile, ImageRecord, InputKind, MattingResult, ProcessingTimings, RecordId, RecordStatus,
};
pub use worker::{PassProgress, PassReport, PendingWorker};

#[cfg(feature = "cli")]
pub use tracing_config::{TracingConfig, TracingFormat, TracingGuard, TracingOutput};

/// Remove the background from a single image without touching a store
///
/// Loads the model on every call; keep a [`MattingPipeline`] around when
/// processing more than one image.
///
/// ```rust,no_run
/// use bgblast::{remove_background_from_file, BlastConfig, ImageFile};
///
/// # fn example() -> anyhow::Result<()> {
/// let config = BlastConfig::default();
/// let result = remove_background_from_file(&ImageFile::from_path("cat.jpg")?, &config)?;
/// std::fs::write(&result.file.name, &result.file.data)?;
/// # Ok(())
/// # }
/// ```
pub fn remove_background_from_file(file: &ImageFile, config: &BlastConfig) -> Result<MattingResult> {
    let provider = ProviderHandle::load(config)?;
    MattingPipeline::new(provider, config).remove_background(file)
}
