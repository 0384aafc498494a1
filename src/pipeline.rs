//! The matting pipeline: one encoded image in, one transparent PNG out

use crate::{
    compositor,
    config::{BlastConfig, ResampleMethod},
    error::{BlastError, Result},
    inference::ProviderHandle,
    matte::Matte,
    preprocessing::ImagePreprocessor,
    types::{ImageFile, MattingResult, ProcessingTimings},
};
use image::{DynamicImage, ImageFormat};
use instant::{Duration, Instant};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, instrument, span, Level};

/// Removes the background of single images with a shared provider
///
/// The pipeline has no store side effects; callers decide what to do with
/// the result.
#[derive(Debug, Clone)]
pub struct MattingPipeline {
    provider: ProviderHandle,
    resample: ResampleMethod,
    output_suffix: String,
}

impl MattingPipeline {
    #[must_use]
    pub fn new(provider: ProviderHandle, config: &BlastConfig) -> Self {
        Self {
            provider,
            resample: config.resample,
            output_suffix: config.output_suffix.clone(),
        }
    }

    #[must_use]
    pub fn provider(&self) -> &ProviderHandle {
        &self.provider
    }

    #[must_use]
    pub fn resample_method(&self) -> ResampleMethod {
        self.resample
    }

    /// Remove the background of one image
    ///
    /// The output is a PNG with the source dimensions, the source colour
    /// channels and the predicted matte as alpha.
    ///
    /// # Errors
    /// - `Decode` when the payload is not a decodable image or is empty
    /// - `Inference` when the provider fails or returns an unusable matte
    /// - `RenderTarget` when the output surface cannot be allocated
    /// - `Encode` when PNG encoding fails
    #[instrument(
        skip(self, file),
        fields(name = %file.name, bytes = file.data.len(), model = %self.provider.model_info().name)
    )]
    pub fn remove_background(&self, file: &ImageFile) -> Result<MattingResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        let image = {
            let _span = span!(Level::DEBUG, "decode").entered();
            let start = Instant::now();
            let image = decode(file)?;
            timings.decode_ms = millis(start.elapsed());
            image
        };
        let (width, height) = (image.width(), image.height());
        debug!(width, height, "Decoded source image");

        let input_tensor = {
            let _span = span!(Level::DEBUG, "preprocessing", width, height).entered();
            let start = Instant::now();
            let tensor = ImagePreprocessor::preprocess_for_inference(
                &image,
                self.provider.preprocessing_config(),
            )?;
            timings.preprocessing_ms = millis(start.elapsed());
            tensor
        };

        let output_tensor = {
            let _span = span!(Level::INFO, "inference", input = ?input_tensor.dim()).entered();
            let start = Instant::now();
            let output = self.provider.infer(&input_tensor)?;
            timings.inference_ms = millis(start.elapsed());
            output
        };

        let composited = {
            let _span = span!(Level::DEBUG, "postprocessing", resample = ?self.resample).entered();
            let start = Instant::now();
            let matte = Matte::from_tensor(&output_tensor)?.resample(width, height, self.resample)?;
            let composited = compositor::composite(&image.to_rgba8(), &matte)?;
            timings.postprocessing_ms = millis(start.elapsed());
            composited
        };

        let data = {
            let _span = span!(Level::DEBUG, "encode").entered();
            let start = Instant::now();
            let data = encode_png(DynamicImage::ImageRgba8(composited))?;
            timings.encode_ms = millis(start.elapsed());
            data
        };

        timings.total_ms = millis(total_start.elapsed());
        info!(timings = %timings.summary(), "Background removed");

        Ok(MattingResult {
            file: ImageFile::new(
                processed_file_name(&file.name, &self.output_suffix),
                "image/png",
                data,
            ),
            dimensions: (width, height),
            timings,
        })
    }
}

fn decode(file: &ImageFile) -> Result<DynamicImage> {
    if file.data.is_empty() {
        return Err(BlastError::decode(format!("'{}' is empty", file.name)));
    }
    let image = image::load_from_memory(&file.data)
        .map_err(|e| BlastError::decode(format!("Failed to decode '{}': {e}", file.name)))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(BlastError::decode(format!(
            "'{}' has zero width or height",
            file.name
        )));
    }
    Ok(image)
}

fn encode_png(image: DynamicImage) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        .map_err(|e| BlastError::encode(format!("Failed to encode PNG: {e}")))?;
    Ok(data)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// `<stem><suffix>.png` for a submitted file name
#[must_use]
pub fn processed_file_name(name: &str, suffix: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image".to_string());
    format!("{stem}{suffix}.png")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{MockMatte, MockMattingBackend};
    use image::{Rgba, RgbaImage};

    fn pipeline_with(backend: MockMattingBackend, resample: ResampleMethod) -> MattingPipeline {
        let config = BlastConfig::builder().resample(resample).build().unwrap();
        let provider = ProviderHandle::from_backend(Box::new(backend), &config).unwrap();
        MattingPipeline::new(provider, &config)
    }

    fn png_file(name: &str, image: &RgbaImage) -> ImageFile {
        let data = encode_png(DynamicImage::ImageRgba8(image.clone())).unwrap();
        ImageFile::new(name, "image/png", data)
    }

    #[test]
    fn test_processed_file_name() {
        assert_eq!(processed_file_name("cat.jpg", "-bg-blasted"), "cat-bg-blasted.png");
        assert_eq!(processed_file_name("a.b.webp", "-x"), "a.b-x.png");
        assert_eq!(processed_file_name("noext", "-bg"), "noext-bg.png");
        assert_eq!(processed_file_name("", "-bg"), "image-bg.png");
    }

    #[test]
    fn test_output_keeps_dimensions_and_colour() {
        let pipeline = pipeline_with(MockMattingBackend::uniform(1.0), ResampleMethod::Bilinear);
        let source = RgbaImage::from_pixel(37, 23, Rgba([12, 34, 56, 255]));

        let result = pipeline.remove_background(&png_file("odd.png", &source)).unwrap();
        assert_eq!(result.dimensions, (37, 23));
        assert_eq!(result.file.name, "odd-bg-blasted.png");
        assert_eq!(result.file.mime_type, "image/png");

        let decoded = image::load_from_memory(&result.file.data).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (37, 23));
        assert!(decoded.pixels().all(|p| *p == Rgba([12, 34, 56, 255])));
    }

    #[test]
    fn test_nearest_resample_keeps_split_edge() {
        let pipeline = pipeline_with(
            MockMattingBackend::new(MockMatte::VerticalSplit),
            ResampleMethod::Nearest,
        );
        let source = RgbaImage::from_pixel(128, 16, Rgba([200, 100, 50, 255]));

        let result = pipeline.remove_background(&png_file("split.png", &source)).unwrap();
        let decoded = image::load_from_memory(&result.file.data).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 8)[3], 0);
        assert_eq!(decoded.get_pixel(127, 8)[3], 255);
    }

    #[test]
    fn test_undecodable_input() {
        let pipeline = pipeline_with(MockMattingBackend::uniform(1.0), ResampleMethod::Bilinear);
        let file = ImageFile::new("broken.png", "image/png", b"definitely not a png".to_vec());
        assert!(matches!(
            pipeline.remove_background(&file),
            Err(BlastError::Decode(_))
        ));

        let empty = ImageFile::new("empty.png", "image/png", Vec::new());
        assert!(matches!(
            pipeline.remove_background(&empty),
            Err(BlastError::Decode(_))
        ));
    }

    #[test]
    fn test_inference_failure_is_reported() {
        let pipeline = pipeline_with(
            MockMattingBackend::uniform(1.0).failing_inference(),
            ResampleMethod::Bilinear,
        );
        let source = RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255]));
        assert!(matches!(
            pipeline.remove_background(&png_file("a.png", &source)),
            Err(BlastError::Inference(_))
        ));
    }
}
