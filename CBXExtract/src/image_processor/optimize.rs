//! In-place page optimization
//!
//! Pages larger than the bounding box are downscaled with Lanczos3 and
//! written back in their original format. JPEG pages are always re-encoded
//! at the requested quality.

use fast_image_resize as fr;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

use super::decoder::decode_image;
use crate::utils::error::{CbxError, Result};

/// Rewrites an image file in place, keeping its format
pub trait ImageOptimizer: Send + Sync {
    fn optimize(&self, path: &Path, quality: u8, max_dimension: u32) -> Result<()>;
}

/// Default optimizer backed by `image` and `fast_image_resize`
#[derive(Debug, Clone, Copy, Default)]
pub struct ResizingOptimizer;

impl ImageOptimizer for ResizingOptimizer {
    fn optimize(&self, path: &Path, quality: u8, max_dimension: u32) -> Result<()> {
        let data = fs::read(path)?;
        let decoded = decode_image(&data)?;
        let (width, height) = (decoded.image.width(), decoded.image.height());

        let image = match fit_within(width, height, max_dimension) {
            Some((new_width, new_height)) => resize(&decoded.image, new_width, new_height)?,
            None if decoded.format == ImageFormat::Jpeg => decoded.image,
            // Lossless formats gain nothing from a rewrite at the same size
            None => return Ok(()),
        };

        let encoded = encode(&image, decoded.format, quality)?;
        fs::write(path, encoded)?;

        debug!(
            path = %path.display(),
            from = ?(width, height),
            to = ?(image.width(), image.height()),
            "optimized image"
        );
        Ok(())
    }
}

/// Leaves files untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOptimizer;

impl ImageOptimizer for NoopOptimizer {
    fn optimize(&self, _path: &Path, _quality: u8, _max_dimension: u32) -> Result<()> {
        Ok(())
    }
}

/// Size that fits `width x height` inside a `max x max` box, keeping the
/// aspect ratio. `None` when no shrinking is needed.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    if max_dimension == 0 || (width <= max_dimension && height <= max_dimension) {
        return None;
    }

    let scale = f64::from(max_dimension) / f64::from(width.max(height));
    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).clamp(1, max_dimension);
    Some((scaled(width), scaled(height)))
}

fn resize(image: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage> {
    let rgba = image.to_rgba8();
    let (src_width, src_height) = rgba.dimensions();

    let src = fr::images::Image::from_vec_u8(src_width, src_height, rgba.into_raw(), fr::PixelType::U8x4)
        .map_err(|e| CbxError::Image(format!("Invalid source buffer: {}", e)))?;
    let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x4);

    let options = fr::ResizeOptions::new()
        .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3));
    fr::Resizer::new()
        .resize(&src, &mut dst, &options)
        .map_err(|e| CbxError::Image(format!("Resize failed: {}", e)))?;

    let buffer = RgbaImage::from_raw(width, height, dst.into_vec())
        .ok_or_else(|| CbxError::Image("Resized buffer has unexpected size".to_string()))?;
    Ok(DynamicImage::ImageRgba8(buffer))
}

fn encode(image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());

    let written = match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg => {
            JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode_image(&image.to_rgb8())
        }
        _ => image.write_to(&mut out, format),
    };
    written.map_err(|e| CbxError::Image(format!("Failed to encode {:?}: {}", format, e)))?;

    Ok(out.into_inner())
}
