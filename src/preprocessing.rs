//! Image preprocessing for matting model input

use crate::{
    error::{BlastError, Result},
    models::{PreprocessingConfig, ResizeTarget},
};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;

/// Upper bound on either side of a shortest-edge model input
pub const MAX_INPUT_EDGE: u32 = 2048;

/// Converts decoded images into normalized NCHW tensors
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Model input size for a source of `width` x `height`
    ///
    /// For shortest-edge targets the aspect ratio is kept and each side is
    /// rounded to the nearest multiple of the divisibility (at least one
    /// multiple). Neither side exceeds [`MAX_INPUT_EDGE`]; very elongated
    /// sources are scaled down until the longer side fits.
    pub fn target_dimensions(width: u32, height: u32, resize: ResizeTarget) -> Result<(u32, u32)> {
        match resize {
            ResizeTarget::Fixed { width, height } => Ok((width, height)),
            ResizeTarget::ShortestEdge { edge, divisibility } => {
                let divisor = divisibility.max(1);
                let cap = MAX_INPUT_EDGE.max(divisor);
                let shortest = f64::from(width.min(height).max(1));
                let longest = f64::from(width.max(height).max(1));
                let scale = (f64::from(edge) / shortest).min(f64::from(cap) / longest);

                let target_width = round_to_multiple(f64::from(width) * scale, divisor, cap)?;
                let target_height = round_to_multiple(f64::from(height) * scale, divisor, cap)?;
                Ok((target_width, target_height))
            },
        }
    }

    /// Resize, rescale and normalize an image into a `[1, 3, h, w]` tensor
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let rgb_image = image.to_rgb8();
        let (orig_width, orig_height) = rgb_image.dimensions();
        if orig_width == 0 || orig_height == 0 {
            return Err(BlastError::decode("Image has zero width or height"));
        }

        let (target_width, target_height) =
            Self::target_dimensions(orig_width, orig_height, config.resize)?;
        if target_width == 0 || target_height == 0 {
            return Err(BlastError::invalid_config(format!(
                "Preprocessing produced an empty input ({target_width}x{target_height})"
            )));
        }

        let resized = if (target_width, target_height) == (orig_width, orig_height) {
            rgb_image
        } else {
            image::imageops::resize(
                &rgb_image,
                target_width,
                target_height,
                FilterType::Triangle,
            )
        };

        Ok(Self::image_to_tensor(&resized, config))
    }

    /// Convert an RGB image to a normalized tensor
    fn image_to_tensor(image: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = image.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match image size
        for (x, y, pixel) in image.enumerate_pixels() {
            for channel in 0..3 {
                let value = f32::from(pixel[channel]) * config.rescale_factor;
                tensor[[0, channel, y as usize, x as usize]] = (value
                    - config.normalization_mean[channel])
                    / config.normalization_std[channel];
            }
        }

        tensor
    }
}

/// Nearest multiple of `divisor` to `value`, at least one multiple and at most `cap`
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_to_multiple(value: f64, divisor: u32, cap: u32) -> Result<u32> {
    let max_multiples = u64::from(cap / divisor).max(1);
    let multiples = (value / f64::from(divisor)).round().max(1.0);
    // Saturating float-to-int cast, then clamp before multiplying
    let multiples = (multiples as u64).min(max_multiples);
    multiples
        .checked_mul(u64::from(divisor))
        .and_then(|side| u32::try_from(side).ok())
        .ok_or_else(|| {
            BlastError::invalid_config(format!(
                "Model input side overflows ({multiples} x {divisor})"
            ))
        })
}
