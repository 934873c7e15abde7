//! Image resizing for web delivery.
//!
//! Provides resize operations using the `image` crate's algorithms.
//! All functions return new `DecodedImage` instances without modifying the input.

use image::imageops::FilterType;

use super::{DecodeError, DecodedImage};

/// Filter used for every downscale.
const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Resize an image to exact dimensions.
///
/// # Arguments
///
/// * `image` - The source image to resize
/// * `width` - Target width in pixels
/// * `height` - Target height in pixels
///
/// # Errors
///
/// Returns `DecodeError::InvalidFormat` if a target dimension is zero, or
/// `DecodeError::CorruptedFile` if the pixel buffer does not match the
/// image dimensions.
pub fn resize(
    image: &DecodedImage,
    width: u32,
    height: u32,
) -> Result<DecodedImage, DecodeError> {
    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidFormat);
    }

    // Fast path: if dimensions match, just clone
    if image.width == width && image.height == height {
        return Ok(image.clone());
    }

    let source = image
        .to_dynamic_image()
        .ok_or_else(|| DecodeError::CorruptedFile("Pixel buffer size mismatch".to_string()))?;

    let resized = source.resize_exact(width, height, RESIZE_FILTER);

    Ok(match resized {
        image::DynamicImage::ImageLuma8(gray) => DecodedImage::from_gray_image(gray),
        other => DecodedImage::from_rgb_image(other.into_rgb8()),
    })
}

/// Downscale an image so its width does not exceed `max_width`.
///
/// Height follows the original aspect ratio, rounded to the nearest pixel.
/// Images at or under the limit are returned unchanged; this never upscales.
///
/// # Errors
///
/// Returns `DecodeError::InvalidFormat` if `max_width` is zero.
pub fn resize_to_width(
    image: &DecodedImage,
    max_width: u32,
) -> Result<DecodedImage, DecodeError> {
    if max_width == 0 {
        return Err(DecodeError::InvalidFormat);
    }

    if image.width <= max_width {
        return Ok(image.clone());
    }

    let (new_width, new_height) = fit_width_dimensions(image.width, image.height, max_width);

    resize(image, new_width, new_height)
}

/// Calculate dimensions that cap the width at `max_width` while preserving
/// aspect ratio.
///
/// `new_height = round(height * max_width / width)`, never below 1.
/// Dimensions already within the cap are returned as-is.
pub fn fit_width_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }

    if width <= max_width {
        return (width, height);
    }

    let scale = max_width as f64 / width as f64;
    let new_height = (height as f64 * scale).round() as u32;

    (max_width, new_height.max(1))
}


// ============================================================================
// Property-Based Tests
// ============================================================================
