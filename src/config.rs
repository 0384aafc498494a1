//! Configuration types for the matting pipeline, provider and record store

use crate::error::{BlastError, Result};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default Hugging Face repository for the matting model
pub const DEFAULT_MODEL_REPO: &str = "Xenova/modnet";

/// Default suffix appended to the stem of processed file names
pub const DEFAULT_OUTPUT_SUFFIX: &str = "-bg-blasted";

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Inference engine used by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, fixed square input)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Resampling used to bring the matte to the source resolution
///
/// Bilinear keeps soft hair and fur edges; nearest reproduces the model's
/// blocky output exactly and is cheaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    Nearest,
    #[default]
    Bilinear,
}

impl ResampleMethod {
    #[must_use]
    pub fn filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
        }
    }
}

impl std::str::FromStr for ResampleMethod {
    type Err = BlastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "bilinear" | "triangle" => Ok(Self::Bilinear),
            other => Err(BlastError::invalid_config(format!(
                "Unknown resample method '{other}'. Expected 'nearest' or 'bilinear'"
            ))),
        }
    }
}

/// Parse an execution provider string in `backend:provider` form
///
/// Accepts `onnx:auto`, `onnx:cpu`, `onnx:cuda`, `onnx:coreml` and `tract:cpu`.
/// A bare backend name selects its default provider.
pub fn parse_provider_string(value: &str) -> Result<(BackendType, ExecutionProvider)> {
    let (backend, provider) = value.split_once(':').unwrap_or((value, ""));

    match (backend.to_ascii_lowercase().as_str(), provider.to_ascii_lowercase().as_str()) {
        ("onnx", "" | "auto") => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
        ("onnx", "cpu") => Ok((BackendType::Onnx, ExecutionProvider::Cpu)),
        ("onnx", "cuda") => Ok((BackendType::Onnx, ExecutionProvider::Cuda)),
        ("onnx", "coreml") => Ok((BackendType::Onnx, ExecutionProvider::CoreMl)),
        ("tract", "" | "cpu") => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
        _ => Err(BlastError::invalid_config(format!(
            "Invalid execution provider '{value}'. Expected onnx:auto, onnx:cpu, onnx:cuda, onnx:coreml or tract:cpu"
        ))),
    }
}

/// Complete configuration for a bgblast process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlastConfig {
    /// Model folder in Hugging Face layout
    pub model_dir: PathBuf,
    /// Repository fetched when the model folder is missing
    pub model_repo: String,
    /// Model variant (fp32, fp16, quantized); first available when unset
    pub model_variant: Option<String>,
    /// Inference engine
    pub backend_type: BackendType,
    /// Execution provider for the ONNX backend
    pub execution_provider: ExecutionProvider,
    /// Square input size used by the tract backend
    pub tract_input_size: u32,
    /// Number of intra-op threads (0 = auto)
    pub intra_threads: usize,
    /// Number of inter-op threads (0 = auto)
    pub inter_threads: usize,
    /// Matte resampling method
    pub resample: ResampleMethod,
    /// Suffix added to processed file names
    pub output_suffix: String,
    /// SQLite database holding the image records
    pub database_path: PathBuf,
}

impl Default for BlastConfig {
    fn default() -> Self {
        Self {
            model_dir: default_models_dir().join(repo_dir_name(DEFAULT_MODEL_REPO)),
            model_repo: DEFAULT_MODEL_REPO.to_string(),
            model_variant: None,
            backend_type: BackendType::Onnx,
            execution_provider: ExecutionProvider::Auto,
            tract_input_size: 512,
            intra_threads: 0,
            inter_threads: 0,
            resample: ResampleMethod::Bilinear,
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            database_path: default_database_path(),
        }
    }
}

impl BlastConfig {
    #[must_use]
    pub fn builder() -> BlastConfigBuilder {
        BlastConfigBuilder::new()
    }

    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BlastError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            BlastError::invalid_config(format!(
                "Failed to parse config file '{}': {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tract_input_size == 0 || self.tract_input_size % 32 != 0 {
            return Err(BlastError::invalid_config(format!(
                "tract_input_size must be a positive multiple of 32, got {}",
                self.tract_input_size
            )));
        }
        if self.output_suffix.contains(['/', '\\']) {
            return Err(BlastError::invalid_config(format!(
                "output_suffix must not contain path separators: '{}'",
                self.output_suffix
            )));
        }
        if self.backend_type == BackendType::Tract
            && self.execution_provider != ExecutionProvider::Cpu
            && self.execution_provider != ExecutionProvider::Auto
        {
            return Err(BlastError::invalid_config(format!(
                "Tract backend only supports the CPU provider, got {}",
                self.execution_provider
            )));
        }
        if let Some(variant) = &self.model_variant {
            if !matches!(variant.as_str(), "fp32" | "fp16" | "quantized") {
                return Err(BlastError::invalid_config(format!(
                    "Unknown model variant '{variant}'. Expected fp32, fp16 or quantized"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for `BlastConfig`
#[derive(Debug, Default)]
pub struct BlastConfigBuilder {
    config: BlastConfig,
}

impl BlastConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: BlastConfig::default(),
        }
    }

    #[must_use]
    pub fn model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.model_dir = dir.into();
        self
    }

    #[must_use]
    pub fn model_repo<S: Into<String>>(mut self, repo: S) -> Self {
        self.config.model_repo = repo.into();
        self
    }

    #[must_use]
    pub fn model_variant(mut self, variant: Option<String>) -> Self {
        self.config.model_variant = variant;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn tract_input_size(mut self, size: u32) -> Self {
        self.config.tract_input_size = size;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    #[must_use]
    pub fn resample(mut self, method: ResampleMethod) -> Self {
        self.config.resample = method;
        self
    }

    #[must_use]
    pub fn output_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.config.output_suffix = suffix.into();
        self
    }

    #[must_use]
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.database_path = path.into();
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<BlastConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Directory holding downloaded models
#[must_use]
pub fn default_models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("bgblast")
        .join("models")
}

/// Default location of the record database
#[must_use]
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bgblast")
        .join("bgblast.db")
}

/// Folder name for a repository id (`Xenova/modnet` -> `Xenova--modnet`)
#[must_use]
pub fn repo_dir_name(repo: &str) -> String {
    repo.trim_matches('/').replace('/', "--")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BlastConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.resample, ResampleMethod::Bilinear);
        assert_eq!(config.output_suffix, "-bg-blasted");
        assert!(config.model_dir.ends_with("Xenova--modnet"));
    }

    #[test]
    fn test_builder_rejects_bad_tract_size() {
        let result = BlastConfig::builder().tract_input_size(500).build();
        assert!(matches!(result, Err(BlastError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_rejects_tract_with_cuda() {
        let result = BlastConfig::builder()
            .backend_type(BackendType::Tract)
            .execution_provider(ExecutionProvider::Cuda)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_suffix_with_separator() {
        assert!(BlastConfig::builder().output_suffix("../x").build().is_err());
    }

    #[test]
    fn test_parse_provider_string() {
        assert_eq!(
            parse_provider_string("onnx:auto").unwrap(),
            (BackendType::Onnx, ExecutionProvider::Auto)
        );
        assert_eq!(
            parse_provider_string("onnx:coreml").unwrap(),
            (BackendType::Onnx, ExecutionProvider::CoreMl)
        );
        assert_eq!(
            parse_provider_string("tract").unwrap(),
            (BackendType::Tract, ExecutionProvider::Cpu)
        );
        assert!(parse_provider_string("tract:cuda").is_err());
        assert!(parse_provider_string("webgpu").is_err());
    }

    #[test]
    fn test_resample_from_str() {
        assert_eq!("nearest".parse::<ResampleMethod>().unwrap(), ResampleMethod::Nearest);
        assert_eq!("Bilinear".parse::<ResampleMethod>().unwrap(), ResampleMethod::Bilinear);
        assert!("lanczos".parse::<ResampleMethod>().is_err());
    }

    #[test]
    fn test_config_json_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bgblast.json");
        std::fs::write(&path, r#"{ "resample": "nearest", "backend_type": "tract" }"#).unwrap();

        let config = BlastConfig::from_json_file(&path).unwrap();
        assert_eq!(config.resample, ResampleMethod::Nearest);
        assert_eq!(config.backend_type, BackendType::Tract);
        assert_eq!(config.output_suffix, DEFAULT_OUTPUT_SUFFIX);
    }

    #[test]
    fn test_config_json_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bgblast.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            BlastConfig::from_json_file(&path),
            Err(BlastError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_repo_dir_name() {
        assert_eq!(repo_dir_name("Xenova/modnet"), "Xenova--modnet");
        assert_eq!(repo_dir_name("/a/b/"), "a--b");
    }
}
