//! Image encoding: composite grid → base64 JPEG.
//!
//! The vision endpoint takes the image as a bare base64 string in the
//! `pdfPage` field, no data-URI prefix.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tracing::debug;

/// JPEG quality used for batch grids.
pub const JPEG_QUALITY: u8 = 85;

/// Encode a grid image as base64 JPEG at `quality` (1-100).
pub fn encode_jpeg_base64(img: &RgbImage, quality: u8) -> Result<String, image::ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(img)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} grid → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );
    Ok(b64)
}
