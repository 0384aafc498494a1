//! Single-channel alpha mattes produced by the inference provider

use crate::{
    config::ResampleMethod,
    error::{BlastError, Result},
};
use image::{GrayImage, ImageBuffer, Luma};
use ndarray::Array4;

/// Per-pixel foreground opacity in [0, 255], row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matte {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Matte {
    /// Create a matte from raw intensities
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| BlastError::inference("Matte dimensions overflow"))?;
        if data.len() != expected {
            return Err(BlastError::inference(format!(
                "Matte data has {} values, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A matte with the same intensity everywhere
    #[must_use]
    pub fn uniform(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Convert the first item of a `[N, 1, h, w]` model output
    ///
    /// Values are clamped to [0, 1] and scaled to [0, 255].
    #[allow(clippy::get_first)]
    pub fn from_tensor(tensor: &Array4<f32>) -> Result<Self> {
        let shape = tensor.shape();
        let batch = shape.get(0).copied().unwrap_or(0);
        let channels = shape.get(1).copied().unwrap_or(0);
        let height = shape.get(2).copied().unwrap_or(0);
        let width = shape.get(3).copied().unwrap_or(0);

        if batch == 0 {
            return Err(BlastError::inference("Model returned an empty batch"));
        }
        if channels != 1 {
            return Err(BlastError::inference(format!(
                "Expected a single-channel matte, got {channels} channels"
            )));
        }
        if height == 0 || width == 0 {
            return Err(BlastError::inference(format!(
                "Model returned an empty matte ({width}x{height})"
            )));
        }

        let width = u32::try_from(width)
            .map_err(|_| BlastError::inference("Matte width exceeds u32"))?;
        let height = u32::try_from(height)
            .map_err(|_| BlastError::inference("Matte height exceeds u32"))?;

        let data = tensor
            .index_axis(ndarray::Axis(0), 0)
            .index_axis(ndarray::Axis(0), 0)
            .iter()
            .map(|value| to_intensity(*value))
            .collect();

        Self::new(width, height, data)
    }

    /// Resample to exactly `width` x `height`
    pub fn resample(&self, width: u32, height: u32, method: ResampleMethod) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BlastError::render_target(format!(
                "Cannot resample matte to {width}x{height}"
            )));
        }
        if (width, height) == self.dimensions() {
            return Ok(self.clone());
        }

        let image = self.to_image()?;
        let resized = image::imageops::resize(&image, width, height, method.filter_type());
        Ok(Self::from_image(&resized))
    }

    #[must_use]
    pub fn from_image(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.as_raw().clone(),
        }
    }

    /// Convert to a grayscale image
    pub fn to_image(&self) -> Result<GrayImage> {
        ImageBuffer::<Luma<u8>, Vec<u8>>::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| BlastError::render_target("Failed to create image from matte data"))
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Intensity at (x, y), if inside the matte
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_intensity(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
