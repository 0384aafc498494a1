//! Model folder loading
//!
//! Models use the Hugging Face layout published for transformers.js:
//!
//! ```text
//! <model_dir>/
//!   config.json
//!   preprocessor_config.json
//!   onnx/model.onnx            (fp32)
//!   onnx/model_fp16.onnx       (fp16)
//!   onnx/model_quantized.onnx  (quantized)
//! ```

use crate::error::{BlastError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// ONNX files and the variant name they provide, in selection order
pub const ONNX_VARIANTS: &[(&str, &str)] = &[
    ("fp32", "onnx/model.onnx"),
    ("fp16", "onnx/model_fp16.onnx"),
    ("quantized", "onnx/model_quantized.onnx"),
];

/// Configuration files expected next to the ONNX weights
pub const CONFIG_FILES: &[&str] = &["config.json", "preprocessor_config.json"];

/// How the source image is resized before inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeTarget {
    /// Scale so the shorter side equals `edge`, then round both sides to a
    /// multiple of `divisibility`
    ShortestEdge { edge: u32, divisibility: u32 },
    /// Stretch to a fixed size
    Fixed { width: u32, height: u32 },
}

/// Preprocessing parameters for model input
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    pub resize: ResizeTarget,
    pub rescale_factor: f32,
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    /// MODNet defaults
    fn default() -> Self {
        Self {
            resize: ResizeTarget::ShortestEdge {
                edge: 512,
                divisibility: 32,
            },
            rescale_factor: 1.0 / 255.0,
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [0.5, 0.5, 0.5],
        }
    }
}

impl PreprocessingConfig {
    /// Same normalization, stretched to a fixed square input
    #[must_use]
    pub fn with_fixed_square(&self, size: u32) -> Self {
        Self {
            resize: ResizeTarget::Fixed {
                width: size,
                height: size,
            },
            ..self.clone()
        }
    }
}

/// `preprocessor_config.json` fields used by the matting pipeline
#[derive(Debug, Deserialize)]
struct HfPreprocessorConfig {
    #[serde(default = "default_true")]
    do_resize: bool,
    #[serde(default = "default_true")]
    do_rescale: bool,
    #[serde(default = "default_true")]
    do_normalize: bool,
    #[serde(default)]
    size: Option<HfSize>,
    #[serde(default)]
    size_divisibility: Option<u32>,
    #[serde(default)]
    rescale_factor: Option<f32>,
    #[serde(default)]
    image_mean: Option<Vec<f32>>,
    #[serde(default)]
    image_std: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HfSize {
    ShortestEdge { shortest_edge: u32 },
    Exact { width: u32, height: u32 },
    Square(u32),
}

fn default_true() -> bool {
    true
}

impl HfPreprocessorConfig {
    fn into_preprocessing_config(self) -> Result<PreprocessingConfig> {
        let defaults = PreprocessingConfig::default();

        let resize = if self.do_resize {
            match self.size {
                Some(HfSize::ShortestEdge { shortest_edge }) => ResizeTarget::ShortestEdge {
                    edge: shortest_edge,
                    divisibility: self.size_divisibility.unwrap_or(1).max(1),
                },
                Some(HfSize::Exact { width, height }) => ResizeTarget::Fixed { width, height },
                Some(HfSize::Square(size)) => ResizeTarget::Fixed {
                    width: size,
                    height: size,
                },
                None => defaults.resize,
            }
        } else {
            defaults.resize
        };

        let rescale_factor = if self.do_rescale {
            self.rescale_factor.unwrap_or(defaults.rescale_factor)
        } else {
            1.0
        };

        let (normalization_mean, normalization_std) = if self.do_normalize {
            (
                triple("image_mean", self.image_mean, defaults.normalization_mean)?,
                triple("image_std", self.image_std, defaults.normalization_std)?,
            )
        } else {
            ([0.0; 3], [1.0; 3])
        };

        if normalization_std.iter().any(|s| *s == 0.0) {
            return Err(BlastError::model("image_std must not contain zeros"));
        }

        Ok(PreprocessingConfig {
            resize,
            rescale_factor,
            normalization_mean,
            normalization_std,
        })
    }
}

/// Accept either a single value or three per-channel values
fn triple(field: &str, values: Option<Vec<f32>>, default: [f32; 3]) -> Result<[f32; 3]> {
    match values.as_deref() {
        None => Ok(default),
        Some([v]) => Ok([*v; 3]),
        Some([r, g, b]) => Ok([*r, *g, *b]),
        Some(other) => Err(BlastError::model(format!(
            "{field} must have 1 or 3 values, got {}",
            other.len()
        ))),
    }
}

/// Model information and metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub variant: String,
    pub size_bytes: u64,
}

/// A resolved model folder: weights, variant and preprocessing parameters
#[derive(Debug, Clone)]
pub struct ModelManager {
    model_dir: PathBuf,
    model_file: PathBuf,
    info: ModelInfo,
    preprocessing: PreprocessingConfig,
}

impl ModelManager {
    /// Resolve a model folder
    ///
    /// # Errors
    /// - Folder missing or not a directory
    /// - No ONNX weights, or the requested variant is absent
    /// - Unreadable or invalid `preprocessor_config.json`
    pub fn from_dir<P: AsRef<Path>>(model_dir: P, variant: Option<&str>) -> Result<Self> {
        let model_dir = model_dir.as_ref().to_path_buf();

        if !model_dir.is_dir() {
            return Err(BlastError::model(format!(
                "Model directory does not exist: {}",
                model_dir.display()
            )));
        }

        let (variant, model_file) = Self::resolve_variant(&model_dir, variant)?;
        let size_bytes = fs::metadata(&model_file)
            .map_err(|e| BlastError::file_io_error("stat model file", &model_file, &e))?
            .len();

        let preprocessing = Self::read_preprocessing_config(&model_dir)?;
        let name = Self::read_model_name(&model_dir).unwrap_or_else(|| {
            model_dir
                .file_name()
                .map_or_else(|| "model".to_string(), |n| n.to_string_lossy().into_owned())
        });

        log::debug!(
            "Resolved model {} ({}) at {}",
            name,
            variant,
            model_file.display()
        );

        Ok(Self {
            model_dir,
            model_file,
            info: ModelInfo {
                name,
                variant,
                size_bytes,
            },
            preprocessing,
        })
    }

    /// Whether a folder has everything needed to load a model
    #[must_use]
    pub fn is_complete(model_dir: &Path) -> bool {
        model_dir.join("preprocessor_config.json").is_file()
            && ONNX_VARIANTS
                .iter()
                .any(|(_, file)| model_dir.join(file).is_file())
    }

    fn resolve_variant(model_dir: &Path, requested: Option<&str>) -> Result<(String, PathBuf)> {
        let available: Vec<(&str, PathBuf)> = ONNX_VARIANTS
            .iter()
            .map(|(variant, file)| (*variant, model_dir.join(file)))
            .filter(|(_, path)| path.is_file())
            .collect();

        if available.is_empty() {
            return Err(BlastError::model(format!(
                "No ONNX model files found in: {}",
                model_dir.join("onnx").display()
            )));
        }

        match requested {
            Some(wanted) => available
                .into_iter()
                .find(|(variant, _)| *variant == wanted)
                .map(|(variant, path)| (variant.to_string(), path))
                .ok_or_else(|| {
                    BlastError::model(format!(
                        "Requested variant '{wanted}' not available in {}",
                        model_dir.display()
                    ))
                }),
            None => available
                .into_iter()
                .next()
                .map(|(variant, path)| (variant.to_string(), path))
                .ok_or_else(|| BlastError::internal("variant list unexpectedly empty")),
        }
    }

    fn read_preprocessing_config(model_dir: &Path) -> Result<PreprocessingConfig> {
        let path = model_dir.join("preprocessor_config.json");
        if !path.is_file() {
            log::warn!(
                "No preprocessor_config.json in {}, using MODNet defaults",
                model_dir.display()
            );
            return Ok(PreprocessingConfig::default());
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| BlastError::file_io_error("read preprocessor config", &path, &e))?;
        let raw: HfPreprocessorConfig = serde_json::from_str(&content).map_err(|e| {
            BlastError::model(format!("Failed to parse preprocessor_config.json: {e}"))
        })?;
        raw.into_preprocessing_config()
    }

    fn read_model_name(model_dir: &Path) -> Option<String> {
        let content = fs::read_to_string(model_dir.join("config.json")).ok()?;
        let value: serde_json::Value = serde_json::from_str(&content).ok()?;
        value
            .get("model_type")
            .or_else(|| value.get("name"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }

    /// Read the ONNX weights
    pub fn load_model(&self) -> Result<Vec<u8>> {
        fs::read(&self.model_file)
            .map_err(|e| BlastError::file_io_error("read model file", &self.model_file, &e))
    }

    #[must_use]
    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    #[must_use]
    pub fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    #[must_use]
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    #[must_use]
    pub fn model_file(&self) -> &Path {
        &self.model_file
    }
}
