//! Writes a matte into the alpha channel of the source pixels

use crate::{
    error::{BlastError, Result},
    matte::Matte,
};
use image::{ImageBuffer, RgbaImage};

/// Combine source colour with the matte as straight (non-premultiplied) alpha
///
/// RGB is copied unchanged and alpha is replaced by the matte intensity. The
/// matte must already have the source dimensions.
pub fn composite(source: &RgbaImage, matte: &Matte) -> Result<RgbaImage> {
    let (width, height) = source.dimensions();
    if matte.dimensions() != (width, height) {
        let (matte_width, matte_height) = matte.dimensions();
        return Err(BlastError::internal(format!(
            "Matte is {matte_width}x{matte_height} but source is {width}x{height}"
        )));
    }

    let byte_len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| {
            BlastError::render_target(format!("Output surface {width}x{height} is too large"))
        })?;

    let mut buffer = Vec::new();
    buffer.try_reserve_exact(byte_len).map_err(|e| {
        BlastError::render_target(format!("Cannot allocate {width}x{height} output surface: {e}"))
    })?;

    for (pixel, alpha) in source.pixels().zip(matte.data()) {
        buffer.extend_from_slice(&[pixel[0], pixel[1], pixel[2], *alpha]);
    }

    ImageBuffer::from_raw(width, height, buffer).ok_or_else(|| {
        BlastError::render_target("Output buffer does not match the surface dimensions")
    })
}
