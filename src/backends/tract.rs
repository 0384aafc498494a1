//! Tract backend implementation
//!
//! Pure Rust inference with no native dependencies. Tract plans the graph
//! for one concrete input shape, so this backend always feeds a fixed square
//! (`tract_input_size`) and the matte is resampled back afterwards.

use crate::config::BlastConfig;
use crate::error::{BlastError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use instant::{Duration, Instant};
use log;
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running the matting model
#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: ModelManager,
    input_size: u32,
    initialized: bool,
}

impl TractBackend {
    /// List Tract execution providers with availability and description
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!(
            "Tract backend on {os}/{arch}",
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH
        );
        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
    }

    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            model: None,
            model_manager,
            input_size: 512,
            initialized: false,
        }
    }

    fn load_model(&mut self, config: &BlastConfig) -> Result<Duration> {
        let model_load_start = Instant::now();
        self.input_size = config.tract_input_size;
        let size = self.input_size as usize;

        let model_data = self.model_manager.load_model()?;
        let info = self.model_manager.info();
        log::info!("🚀 Initializing Tract backend");
        log::info!("🧠 Model: {} ({})", info.name, info.variant);
        log::info!("📐 Input: {size}x{size}");

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| BlastError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .map_err(|e| BlastError::model(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| BlastError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| BlastError::model(format!("Failed to create runnable model: {e}")))?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "✅ Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );
        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, config: &BlastConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.load_model(config).map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BlastError::inference("Tract model not initialized"))?;

        let size = self.input_size as usize;
        if input.dim() != (1, 3, size, size) {
            return Err(BlastError::inference(format!(
                "Tract backend expects input [1, 3, {size}, {size}], got {:?}",
                input.shape()
            )));
        }

        let inference_start = Instant::now();

        // Copy through a flat buffer so tract's ndarray version never meets ours
        let input_data: Vec<f32> = input.iter().copied().collect();
        let input_tensor = Tensor::from_shape(&[1, 3, size, size], &input_data)
            .map_err(|e| BlastError::inference(format!("Failed to build input tensor: {e}")))?;

        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| BlastError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BlastError::inference("No output tensor found"))?;

        let output_shape = output_tensor.shape().to_vec();
        let &[batch, channels, height, width] = output_shape.as_slice() else {
            return Err(BlastError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        };
        let output_data = output_tensor
            .as_slice::<f32>()
            .map_err(|e| BlastError::inference(format!("Failed to read output tensor: {e}")))?
            .to_vec();

        let output_array = Array4::from_shape_vec((batch, channels, height, width), output_data)
            .map_err(|e| BlastError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Tract inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output_array.dim()
        );
        Ok(output_array)
    }

    fn preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self
            .model_manager
            .preprocessing_config()
            .with_fixed_square(self.input_size))
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(self.model_manager.info().clone())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
