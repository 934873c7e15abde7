//! Core types for image decoding.

use thiserror::Error;

/// Error types for image decoding operations.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The file format is not recognized or supported.
    #[error("Invalid or unsupported image format")]
    InvalidFormat,

    /// The image file is corrupted or incomplete.
    #[error("Corrupted or incomplete image file: {0}")]
    CorruptedFile(String),

    /// I/O error during file reading.
    #[error("I/O error: {0}")]
    IoError(String),
}

/// EXIF orientation values (1-8).
/// See: https://exiftool.org/TagNames/EXIF.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Orientation {
    /// Normal (no transformation needed).
    #[default]
    Normal = 1,
    /// Horizontal flip.
    FlipHorizontal = 2,
    /// Rotate 180 degrees.
    Rotate180 = 3,
    /// Vertical flip.
    FlipVertical = 4,
    /// Transpose (flip horizontal + rotate 270 CW).
    Transpose = 5,
    /// Rotate 90 degrees clockwise.
    Rotate90CW = 6,
    /// Transverse (flip horizontal + rotate 90 CW).
    Transverse = 7,
    /// Rotate 270 degrees clockwise (90 CCW).
    Rotate270CW = 8,
}

impl From<u32> for Orientation {
    fn from(value: u32) -> Self {
        match value {
            1 => Orientation::Normal,
            2 => Orientation::FlipHorizontal,
            3 => Orientation::Rotate180,
            4 => Orientation::FlipVertical,
            5 => Orientation::Transpose,
            6 => Orientation::Rotate90CW,
            7 => Orientation::Transverse,
            8 => Orientation::Rotate270CW,
            _ => Orientation::Normal,
        }
    }
}

/// Color layout of the pixels the decoder produced, before normalization.
///
/// Palette images never show up here: the decoder expands them to
/// `Rgb`/`Rgba` while reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    Luma,
    LumaAlpha,
    Rgb,
    Rgba,
    /// 16-bit or floating point grayscale.
    LumaWide,
    /// 16-bit or floating point grayscale with alpha.
    LumaAlphaWide,
    /// 16-bit or floating point RGB.
    RgbWide,
    /// 16-bit or floating point RGBA.
    RgbaWide,
}

impl SourceMode {
    /// Returns true if the mode carries an alpha channel.
    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            SourceMode::LumaAlpha
                | SourceMode::Rgba
                | SourceMode::LumaAlphaWide
                | SourceMode::RgbaWide
        )
    }

    /// The JPEG-encodable mode this source normalizes to.
    ///
    /// Alpha-bearing modes flatten to RGB; plain grayscale stays grayscale.
    pub fn normalized(self) -> ColorMode {
        match self {
            SourceMode::Luma | SourceMode::LumaWide => ColorMode::Luma,
            _ => ColorMode::Rgb,
        }
    }

    pub(crate) fn of(color: image::ColorType) -> Self {
        use image::ColorType;

        match color {
            ColorType::L8 => SourceMode::Luma,
            ColorType::La8 => SourceMode::LumaAlpha,
            ColorType::Rgb8 => SourceMode::Rgb,
            ColorType::Rgba8 => SourceMode::Rgba,
            ColorType::L16 => SourceMode::LumaWide,
            ColorType::La16 => SourceMode::LumaAlphaWide,
            ColorType::Rgb16 | ColorType::Rgb32F => SourceMode::RgbWide,
            ColorType::Rgba16 | ColorType::Rgba32F => SourceMode::RgbaWide,
            // `ColorType` is non-exhaustive; anything new still ends up as RGB.
            _ => SourceMode::RgbaWide,
        }
    }
}

/// Pixel layout of a [`DecodedImage`]. Both variants are JPEG-encodable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    /// Single channel grayscale.
    Luma,
    /// Three channel RGB.
    #[default]
    Rgb,
}

impl ColorMode {
    /// Bytes per pixel.
    #[inline]
    pub fn channels(self) -> usize {
        match self {
            ColorMode::Luma => 1,
            ColorMode::Rgb => 3,
        }
    }
}

/// A decoded 8-bit image in a JPEG-encodable color mode.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Pixel layout of `pixels`.
    pub mode: ColorMode,
    /// Pixel data in row-major order.
    /// Length should be width * height * mode.channels().
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Create a new RGB DecodedImage with the given dimensions and pixel data.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self::with_mode(width, height, ColorMode::Rgb, pixels)
    }

    /// Create a new DecodedImage with an explicit color mode.
    pub fn with_mode(width: u32, height: u32, mode: ColorMode, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(
            pixels.len(),
            width as usize * height as usize * mode.channels(),
            "Pixel buffer size mismatch"
        );
        Self {
            width,
            height,
            mode,
            pixels,
        }
    }

    /// Create a DecodedImage from an image::RgbImage.
    pub fn from_rgb_image(img: image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            mode: ColorMode::Rgb,
            pixels: img.into_raw(),
        }
    }

    /// Create a DecodedImage from an image::GrayImage.
    pub fn from_gray_image(img: image::GrayImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            mode: ColorMode::Luma,
            pixels: img.into_raw(),
        }
    }

    /// Convert to an image::DynamicImage for further processing.
    pub fn to_dynamic_image(&self) -> Option<image::DynamicImage> {
        match self.mode {
            ColorMode::Rgb => {
                image::RgbImage::from_raw(self.width, self.height, self.pixels.clone())
                    .map(image::DynamicImage::ImageRgb8)
            }
            ColorMode::Luma => {
                image::GrayImage::from_raw(self.width, self.height, self.pixels.clone())
                    .map(image::DynamicImage::ImageLuma8)
            }
        }
    }
}
