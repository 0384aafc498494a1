//! Mock backend for testing the pipeline without model files
//!
//! The mock returns a deterministic matte with the spatial size of its input,
//! so callers can predict every output pixel.

use crate::{
    config::BlastConfig,
    error::{BlastError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, PreprocessingConfig},
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

/// What the mock writes into its output tensor
#[derive(Debug, Clone, Copy)]
pub enum MockMatte {
    /// Same value at every pixel
    Uniform(f32),
    /// Left half transparent, right half opaque
    VerticalSplit,
}

#[derive(Debug, Clone)]
pub struct MockMattingBackend {
    matte: MockMatte,
    initialized: bool,
    fail_init: bool,
    fail_inference: bool,
    panic_on_call: Option<usize>,
    preprocessing: PreprocessingConfig,
    calls: Arc<AtomicUsize>,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockMattingBackend {
    #[must_use]
    pub fn new(matte: MockMatte) -> Self {
        Self {
            matte,
            initialized: false,
            fail_init: false,
            fail_inference: false,
            panic_on_call: None,
            // Small fixed input keeps tests fast
            preprocessing: PreprocessingConfig::default().with_fixed_square(64),
            calls: Arc::new(AtomicUsize::new(0)),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn uniform(value: f32) -> Self {
        Self::new(MockMatte::Uniform(value))
    }

    #[must_use]
    pub fn failing_initialization(mut self) -> Self {
        self.fail_init = true;
        self
    }

    #[must_use]
    pub fn failing_inference(mut self) -> Self {
        self.fail_inference = true;
        self
    }

    /// Panic inside the `call`-th `infer` call (counting from 0)
    #[must_use]
    pub fn panicking_on_call(mut self, call: usize) -> Self {
        self.panic_on_call = Some(call);
        self
    }

    #[must_use]
    pub fn with_preprocessing(mut self, preprocessing: PreprocessingConfig) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    /// Shared counter of `infer` calls, readable after the backend is boxed
    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn call_history(&self) -> Vec<String> {
        self.call_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    fn generate_output(&self, input: &Array4<f32>) -> Array4<f32> {
        let (_, _, height, width) = input.dim();
        match self.matte {
            MockMatte::Uniform(value) => Array4::from_elem((1, 1, height, width), value),
            MockMatte::VerticalSplit => Array4::from_shape_fn((1, 1, height, width), |(_, _, _, x)| {
                if x < width / 2 {
                    0.0
                } else {
                    1.0
                }
            }),
        }
    }
}

impl InferenceBackend for MockMattingBackend {
    fn initialize(&mut self, _config: &BlastConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");
        if self.fail_init {
            return Err(BlastError::model("Mock backend initialization failed"));
        }
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        assert_ne!(self.panic_on_call, Some(call), "Mock inference panicked");

        if !self.initialized {
            return Err(BlastError::inference("Mock backend not initialized"));
        }
        if self.fail_inference {
            return Err(BlastError::inference("Mock inference failed"));
        }
        Ok(self.generate_output(input))
    }

    fn preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(self.preprocessing.clone())
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "mock-modnet".to_string(),
            variant: "fp32".to_string(),
            size_bytes: 1024,
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_output_matches_input_size() {
        let mut backend = MockMattingBackend::uniform(0.25);
        backend.initialize(&BlastConfig::default()).unwrap();
        let output = backend.infer(&Array4::zeros((1, 3, 40, 24))).unwrap();
        assert_eq!(output.shape(), &[1, 1, 40, 24]);
        assert!(output.iter().all(|v| (*v - 0.25).abs() < f32::EPSILON));
    }

    #[test]
    fn test_mock_requires_initialization() {
        let mut backend = MockMattingBackend::uniform(0.25);
        assert!(!backend.is_initialized());
        assert!(backend.infer(&Array4::zeros((1, 3, 8, 8))).is_err());
        assert_eq!(backend.call_history(), vec!["infer"]);
    }

    #[test]
    fn test_mock_vertical_split() {
        let mut backend = MockMattingBackend::new(MockMatte::VerticalSplit);
        backend.initialize(&BlastConfig::default()).unwrap();
        let output = backend.infer(&Array4::zeros((1, 3, 2, 4))).unwrap();
        assert_eq!(output[[0, 0, 1, 1]], 0.0);
        assert_eq!(output[[0, 0, 1, 2]], 1.0);
    }

    #[test]
    fn test_second_initialize_reports_no_load_time() {
        let mut backend = MockMattingBackend::uniform(0.5);
        assert!(backend.initialize(&BlastConfig::default()).unwrap().is_some());
        assert!(backend.initialize(&BlastConfig::default()).unwrap().is_none());
    }
}
