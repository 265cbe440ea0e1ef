//! Image preparation for the reasoning backend.
//!
//! The agent service wants a compact JPEG: frames are downscaled so the
//! longest edge stays within [`MAX_EDGE`] (aspect ratio preserved, never
//! upsampled), normalized to 3-channel RGB, re-encoded at quality 85, and
//! wrapped in a base64 data URL.

use crate::error::Result;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;
use tracing::debug;

/// Maximum pixel length of the longest image edge sent to the backend.
pub const MAX_EDGE: u32 = 1024;

/// JPEG quality for the re-encoded payload.
pub const JPEG_QUALITY: u8 = 85;

/// A prepared image payload ready for the reasoning call.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    /// `data:image/jpeg;base64,...` URL.
    pub data_url: String,
    /// Dimensions after downscaling.
    pub width: u32,
    pub height: u32,
}

/// Load an image from disk and prepare it for the backend.
pub fn prepare(path: &Path) -> Result<ImagePayload> {
    let img = image::ImageReader::open(path)?.decode()?;
    let original = (img.width(), img.height());

    let img = downscale(img);
    if (img.width(), img.height()) != original {
        debug!(
            path = %path.display(),
            width = img.width(),
            height = img.height(),
            "image downscaled for backend"
        );
    }

    let jpeg = encode_jpeg(&img)?;
    Ok(ImagePayload {
        data_url: format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg)),
        width: img.width(),
        height: img.height(),
    })
}

/// Downscale so the longest edge is at most [`MAX_EDGE`].
///
/// Images already within bounds pass through untouched; this never
/// upsamples.
pub fn downscale(img: DynamicImage) -> DynamicImage {
    if img.width().max(img.height()) <= MAX_EDGE {
        return img;
    }
    img.resize(MAX_EDGE, MAX_EDGE, FilterType::Lanczos3)
}

/// Re-encode as 3-channel RGB JPEG at [`JPEG_QUALITY`].
pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))?;
    Ok(buf)
}
