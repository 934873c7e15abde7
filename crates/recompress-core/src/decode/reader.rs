//! Image decoding with color normalization and optional EXIF orientation.

use std::io::Cursor;

use exif::{In, Reader, Tag};
use image::{DynamicImage, ImageReader};
use tracing::debug;

use super::{ColorMode, DecodeError, DecodedImage, Orientation, SourceMode};

/// Decode an image from bytes, normalizing it to a JPEG-encodable mode.
///
/// The format is guessed from the content, so PNG, JPEG and any other format
/// the `image` crate was built with are accepted regardless of file name.
/// Pixel data is used as stored; EXIF orientation is ignored.
///
/// # Errors
///
/// Returns `DecodeError::CorruptedFile` if the bytes cannot be decoded.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    let img = read_dynamic(bytes)?;
    Ok(normalize(img).0)
}

/// Decode an image from bytes, applying EXIF orientation correction.
///
/// Falls back to the stored orientation when no EXIF data is present.
pub fn decode_image_oriented(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    let orientation = extract_orientation(bytes);
    let img = read_dynamic(bytes)?;

    if orientation != Orientation::Normal {
        debug!(?orientation, "applying EXIF orientation");
    }

    Ok(normalize(apply_orientation(img, orientation)).0)
}

/// Convert a decoded image to a JPEG-encodable 8-bit layout.
///
/// Alpha channels are dropped without compositing against a background.
/// Grayscale without alpha stays grayscale. Returns the mode the decoder
/// reported alongside the normalized image.
pub fn normalize(img: DynamicImage) -> (DecodedImage, SourceMode) {
    let source = SourceMode::of(img.color());

    let decoded = match source.normalized() {
        ColorMode::Luma => DecodedImage::from_gray_image(img.into_luma8()),
        ColorMode::Rgb => DecodedImage::from_rgb_image(img.into_rgb8()),
    };

    debug!(
        ?source,
        alpha_dropped = source.has_alpha(),
        mode = ?decoded.mode,
        width = decoded.width,
        height = decoded.height,
        "decoded image"
    );

    (decoded, source)
}

fn read_dynamic(bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::InvalidFormat);
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::IoError(e.to_string()))?;

    if reader.format().is_none() {
        return Err(DecodeError::InvalidFormat);
    }

    reader
        .decode()
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))
}

/// Extract EXIF orientation from image bytes.
///
/// Returns `Orientation::Normal` if no EXIF data is found or orientation
/// cannot be determined.
fn extract_orientation(bytes: &[u8]) -> Orientation {
    let mut cursor = Cursor::new(bytes);

    match Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif
            .get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .map(Orientation::from)
            .unwrap_or_default(),
        Err(_) => Orientation::Normal,
    }
}

/// Apply EXIF orientation transformation to an image.
fn apply_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Normal => img,
        Orientation::FlipHorizontal => img.fliph(),
        Orientation::Rotate180 => img.rotate180(),
        Orientation::FlipVertical => img.flipv(),
        Orientation::Transpose => img.rotate90().fliph(),
        Orientation::Rotate90CW => img.rotate90(),
        Orientation::Transverse => img.rotate270().fliph(),
        Orientation::Rotate270CW => img.rotate270(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb([200, 10, 10]),
        ));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_jpeg() {
        let img = decode_image(&jpeg_bytes(8, 4)).unwrap();
        assert_eq!((img.width, img.height), (8, 4));
        assert_eq!(img.mode, ColorMode::Rgb);
        assert_eq!(img.pixels.len(), 8 * 4 * 3);
    }

    #[test]
    fn test_decode_rgba_png_flattens_to_rgb() {
        let rgba = RgbaImage::from_pixel(5, 3, Rgba([10, 20, 30, 0]));
        let img = decode_image(&png_bytes(DynamicImage::ImageRgba8(rgba))).unwrap();

        assert_eq!(img.mode, ColorMode::Rgb);
        assert_eq!(img.pixels.len(), 5 * 3 * 3);
        // Alpha is dropped, not composited
        assert_eq!(&img.pixels[0..3], &[10, 20, 30]);
    }

    #[test]
    fn test_decode_gray_png_stays_gray() {
        let gray = image::GrayImage::from_pixel(4, 4, image::Luma([77]));
        let img = decode_image(&png_bytes(DynamicImage::ImageLuma8(gray))).unwrap();

        assert_eq!(img.mode, ColorMode::Luma);
        assert_eq!(img.pixels, vec![77u8; 16]);
    }

    #[test]
    fn test_decode_gray_alpha_png_becomes_rgb() {
        let la = image::GrayAlphaImage::from_pixel(2, 2, image::LumaA([50, 128]));
        let img = decode_image(&png_bytes(DynamicImage::ImageLumaA8(la))).unwrap();

        assert_eq!(img.mode, ColorMode::Rgb);
        assert_eq!(&img.pixels[0..3], &[50, 50, 50]);
    }

    #[test]
    fn test_decode_sixteen_bit_png_reduces_depth() {
        let wide = image::ImageBuffer::<image::Rgb<u16>, _>::from_pixel(
            3,
            3,
            image::Rgb([65535u16, 0, 65535]),
        );
        let img = decode_image(&png_bytes(DynamicImage::ImageRgb16(wide))).unwrap();

        assert_eq!(img.mode, ColorMode::Rgb);
        assert_eq!(&img.pixels[0..3], &[255, 0, 255]);
    }

    #[test]
    fn test_normalize_reports_source_mode() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::new(2, 2));
        let (img, source) = normalize(rgba);
        assert_eq!(source, SourceMode::Rgba);
        assert_eq!(img.mode, ColorMode::Rgb);
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let result = decode_image(&[0x00, 0x01, 0x02, 0x03]);
        assert!(matches!(result, Err(DecodeError::InvalidFormat)));
    }

    #[test]
    fn test_decode_empty_bytes() {
        assert!(matches!(decode_image(&[]), Err(DecodeError::InvalidFormat)));
    }

    #[test]
    fn test_decode_truncated_png() {
        let bytes = png_bytes(DynamicImage::ImageRgb8(image::RgbImage::new(16, 16)));
        let result = decode_image(&bytes[..bytes.len() / 2]);

        match result {
            Err(DecodeError::CorruptedFile(_)) => {}
            other => panic!("Expected CorruptedFile error, got: {:?}", other),
        }
    }

    #[test]
    fn test_orientation_extraction_no_exif() {
        assert_eq!(extract_orientation(&jpeg_bytes(2, 2)), Orientation::Normal);
    }

    #[test]
    fn test_orientation_extraction_invalid_data() {
        assert_eq!(extract_orientation(&[0x00, 0x01, 0x02]), Orientation::Normal);
    }

    #[test]
    fn test_decode_oriented_without_exif_keeps_dimensions() {
        let img = decode_image_oriented(&jpeg_bytes(6, 2)).unwrap();
        assert_eq!((img.width, img.height), (6, 2));
    }

    #[test]
    fn test_apply_orientation_rotate90() {
        let pixels = vec![
            255, 0, 0, // Red (left)
            0, 255, 0, // Green (right)
        ];
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_raw(2, 1, pixels).unwrap());

        let rotated = apply_orientation(img, Orientation::Rotate90CW).into_rgb8();
        assert_eq!(rotated.dimensions(), (1, 2));
    }

    #[test]
    fn test_apply_orientation_flip_horizontal() {
        let pixels = vec![
            255, 0, 0, // Red (left)
            0, 255, 0, // Green (right)
        ];
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_raw(2, 1, pixels).unwrap());

        let flipped = apply_orientation(img, Orientation::FlipHorizontal).into_rgb8();
        assert_eq!(flipped.get_pixel(0, 0).0, [0, 255, 0]);
        assert_eq!(flipped.get_pixel(1, 0).0, [255, 0, 0]);
    }
}
