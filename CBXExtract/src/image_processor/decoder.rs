//! Image decoding from raw bytes
//!
//! Supports the formats enabled on the `image` dependency: JPEG, PNG, GIF,
//! BMP, TIFF, ICO and WebP. The detected container format is kept so the
//! optimizer can write the page back in the same format.

use crate::utils::error::{CbxError, Result};
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;

/// A decoded page plus the format it was stored in
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
}

/// Decode image from raw bytes
///
/// The format is sniffed from the content, not from a file name, so a PNG
/// saved as `.jpg` inside an archive still decodes and is written back as PNG.
///
/// # Returns
/// * `Ok(DecodedImage)` - Successfully decoded image and its format
/// * `Err(CbxError::Image)` - Unknown format, corrupt or truncated data
pub fn decode_image(data: &[u8]) -> Result<DecodedImage> {
    if data.is_empty() {
        return Err(CbxError::Image("Empty image data".to_string()));
    }

    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| CbxError::Image(format!("Format detection failed: {}", e)))?;

    let format = reader
        .format()
        .ok_or_else(|| CbxError::Image("Unrecognized image format".to_string()))?;

    let image = reader
        .decode()
        .map_err(|e| CbxError::Image(format!("Failed to decode image: {}", e)))?;

    Ok(DecodedImage { image, format })
}
