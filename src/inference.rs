//! Inference backend abstraction and the process-wide provider handle

use crate::{
    config::{BackendType, BlastConfig},
    error::{BlastError, Result},
    models::{ModelInfo, ModelManager, PreprocessingConfig},
};
use ndarray::Array4;
use std::sync::{Arc, Mutex, PoisonError};

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time, or `None` when already initialized.
    ///
    /// # Errors
    /// - Model loading or validation errors
    /// - Session or graph construction failures
    fn initialize(&mut self, config: &BlastConfig) -> Result<Option<Duration>>;

    /// Run inference on a `[1, 3, h, w]` input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Output that is not a rank-4 tensor
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Preprocessing parameters the backend expects its input prepared with
    ///
    /// # Errors
    /// - Model manager not initialized
    fn preprocessing_config(&self) -> Result<PreprocessingConfig>;

    /// # Errors
    /// - Model manager not initialized
    fn model_info(&self) -> Result<ModelInfo>;

    fn is_initialized(&self) -> bool;
}

/// Creates backends for a configured engine
pub trait BackendFactory: Send + Sync {
    /// # Errors
    /// - Backend type not compiled in
    /// - Model folder unusable
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the backends enabled at compile time
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
                model_manager,
            ))),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::with_model_manager(
                model_manager,
            ))),
            #[allow(unreachable_patterns)]
            other => {
                drop(model_manager);
                Err(BlastError::invalid_config(format!(
                    "Backend '{other}' is not enabled in this build"
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends
    }
}

/// Shared access to the one loaded matting model
///
/// Cloning is cheap. Calls are serialized because backends take `&mut self`
/// for inference.
#[derive(Clone)]
pub struct ProviderHandle {
    backend: Arc<Mutex<Box<dyn InferenceBackend>>>,
    preprocessing: PreprocessingConfig,
    model_info: ModelInfo,
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("model_info", &self.model_info)
            .field("preprocessing", &self.preprocessing)
            .finish_non_exhaustive()
    }
}

impl ProviderHandle {
    /// Load the configured model with the compiled-in backends
    ///
    /// # Errors
    /// - Missing or incomplete model folder
    /// - Backend initialization failure
    pub fn load(config: &BlastConfig) -> Result<Self> {
        Self::load_with_factory(config, &DefaultBackendFactory)
    }

    /// Load the configured model through a custom factory
    ///
    /// # Errors
    /// - Missing or incomplete model folder
    /// - Backend creation or initialization failure
    pub fn load_with_factory(config: &BlastConfig, factory: &dyn BackendFactory) -> Result<Self> {
        config.validate()?;
        let model_manager =
            ModelManager::from_dir(&config.model_dir, config.model_variant.as_deref())?;
        let backend = factory.create_backend(config.backend_type, model_manager)?;
        Self::from_backend(backend, config)
    }

    /// Wrap an already constructed backend, initializing it if needed
    ///
    /// # Errors
    /// - Backend initialization failure
    /// - Backend cannot report its preprocessing or model info
    pub fn from_backend(mut backend: Box<dyn InferenceBackend>, config: &BlastConfig) -> Result<Self> {
        if let Some(load_time) = backend.initialize(config)? {
            log::info!(
                "Inference provider ready in {:.0}ms",
                load_time.as_secs_f64() * 1000.0
            );
        }
        let preprocessing = backend.preprocessing_config()?;
        let model_info = backend.model_info()?;

        Ok(Self {
            backend: Arc::new(Mutex::new(backend)),
            preprocessing,
            model_info,
        })
    }

    /// Run the model once
    ///
    /// A panic in an earlier call does not disable the provider; the next
    /// call runs against the same backend.
    ///
    /// # Errors
    /// - Backend inference failure
    pub fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let mut backend = self.backend.lock().unwrap_or_else(|poisoned| {
            log::debug!("Inference provider lock poisoned by an earlier panic, reusing backend");
            PoisonError::into_inner(poisoned)
        });
        backend.infer(input)
    }

    #[must_use]
    pub fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    #[must_use]
    pub fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }
}
