//! Shared fixtures for the integration tests

#![allow(dead_code)]

use bgblast::{
    BlastConfig, BlastError, ImageFile, InferenceBackend, MattingPipeline, ModelInfo,
    PreprocessingConfig, ProviderHandle, Result, SqliteRecordStore,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use instant::Duration;
use ndarray::Array4;
use std::io::Cursor;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

/// Backend returning a constant matte with the spatial size of its input
///
/// With several values the matte cycles through them, one per `infer` call.
#[derive(Debug, Clone)]
pub struct FixedMatteBackend {
    values: Vec<f32>,
    initialized: bool,
    fail_inference: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl FixedMatteBackend {
    pub fn new(value: f32) -> Self {
        Self::sequence(&[value])
    }

    pub fn sequence(values: &[f32]) -> Self {
        assert!(!values.is_empty());
        Self {
            values: values.to_vec(),
            initialized: false,
            fail_inference: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Switch that makes every `infer` call fail while set
    pub fn failure_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_inference)
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl InferenceBackend for FixedMatteBackend {
    fn initialize(&mut self, _config: &BlastConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inference.load(Ordering::SeqCst) {
            return Err(BlastError::inference("forced failure"));
        }
        let (_, _, height, width) = input.dim();
        let value = self.values[call % self.values.len()];
        Ok(Array4::from_elem((1, 1, height, width), value))
    }

    fn preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(PreprocessingConfig::default().with_fixed_square(32))
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "fixed-matte".to_string(),
            variant: "fp32".to_string(),
            size_bytes: 0,
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

pub fn pipeline(backend: FixedMatteBackend) -> MattingPipeline {
    let config = BlastConfig::default();
    let provider = ProviderHandle::from_backend(Box::new(backend), &config).unwrap();
    MattingPipeline::new(provider, &config)
}

pub fn memory_store() -> Arc<SqliteRecordStore> {
    Arc::new(SqliteRecordStore::open_in_memory().unwrap())
}

/// PNG of a single solid colour
pub fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let mut data = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
        .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        .unwrap();
    data
}

pub fn png_file(name: &str, width: u32, height: u32, color: [u8; 4]) -> ImageFile {
    ImageFile::new(name, "image/png", solid_png(width, height, color))
}

pub fn decode_rgba(file: &ImageFile) -> RgbaImage {
    image::load_from_memory(&file.data).unwrap().to_rgba8()
}
