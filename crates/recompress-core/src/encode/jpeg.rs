//! JPEG encoding for web delivery.
//!
//! Uses `jpeg-encoder`, which supports progressive scans and optimized
//! Huffman tables. Both shrink the file without changing decoded pixels.

use std::fs;
use std::path::Path;

use jpeg_encoder::{ColorType, Encoder};
use thiserror::Error;
use tracing::debug;

use crate::decode::{ColorMode, DecodedImage};

/// Default quality used when a job does not specify one.
pub const DEFAULT_QUALITY: u8 = 82;

/// Errors that can occur during JPEG encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Pixel data length doesn't match expected dimensions
    #[error("Invalid pixel data: expected {expected} bytes, got {actual}")]
    InvalidPixelData { expected: usize, actual: usize },

    /// Width or height is zero or larger than JPEG allows
    #[error("Invalid dimensions: {width}x{height} (each side must be 1-65535)")]
    InvalidDimensions { width: u32, height: u32 },

    /// JPEG encoding failed
    #[error("JPEG encoding failed: {0}")]
    EncodingFailed(String),

    /// Writing the encoded file failed
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegOptions {
    /// JPEG quality (1-100, where 100 is highest quality)
    pub quality: u8,
    /// Emit a progressive scan layout
    pub progressive: bool,
    /// Compute image-specific Huffman tables
    pub optimize_huffman: bool,
}

impl Default for JpegOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            progressive: true,
            optimize_huffman: true,
        }
    }
}

impl JpegOptions {
    /// Web defaults with the given quality.
    pub fn with_quality(quality: u8) -> Self {
        Self {
            quality,
            ..Self::default()
        }
    }
}

/// Encode a decoded image to JPEG bytes.
///
/// # Quality Guidelines
///
/// * 90-100: High quality, suitable for archival or further editing
/// * 80-90: Good quality, a sensible default for hero images
/// * 60-80: Medium quality, acceptable for web carousels
/// * Below 60: Low quality, visible artifacts
///
/// Quality values outside 1-100 are clamped.
pub fn encode_jpeg(image: &DecodedImage, options: &JpegOptions) -> Result<Vec<u8>, EncodeError> {
    let (width, height) = validate_dimensions(image.width, image.height)?;

    let expected = image.width as usize * image.height as usize * image.mode.channels();
    if image.pixels.len() != expected {
        return Err(EncodeError::InvalidPixelData {
            expected,
            actual: image.pixels.len(),
        });
    }

    let quality = options.quality.clamp(1, 100);
    let color_type = match image.mode {
        ColorMode::Rgb => ColorType::Rgb,
        ColorMode::Luma => ColorType::Luma,
    };

    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer, quality);
    encoder.set_progressive(options.progressive);
    encoder.set_optimized_huffman_tables(options.optimize_huffman);

    encoder
        .encode(&image.pixels, width, height, color_type)
        .map_err(|e| EncodeError::EncodingFailed(e.to_string()))?;

    debug!(
        width = image.width,
        height = image.height,
        quality,
        bytes = buffer.len(),
        "encoded jpeg"
    );

    Ok(buffer)
}

/// Encode a decoded image and write it to `path`, creating parent
/// directories as needed. Returns the number of bytes written.
pub fn write_jpeg(
    image: &DecodedImage,
    path: &Path,
    options: &JpegOptions,
) -> Result<u64, EncodeError> {
    let bytes = encode_jpeg(image, options)?;

    let io_err = |source| EncodeError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, &bytes).map_err(io_err)?;

    Ok(bytes.len() as u64)
}

fn validate_dimensions(width: u32, height: u32) -> Result<(u16, u16), EncodeError> {
    let invalid = || EncodeError::InvalidDimensions { width, height };

    if width == 0 || height == 0 {
        return Err(invalid());
    }

    let w = u16::try_from(width).map_err(|_| invalid())?;
    let h = u16::try_from(height).map_err(|_| invalid())?;
    Ok((w, h))
}


// ============================================================================
// Property-Based Tests
// ============================================================================
