//! Image decoding pipeline.
//!
//! This module provides functionality for:
//! - Decoding PNG, JPEG and other still image formats from bytes
//! - Normalizing color modes to something JPEG can represent
//! - Optional EXIF orientation correction
//! - Width-capped resizing for web delivery
//!
//! # Color normalization
//!
//! Alpha-bearing images are flattened to RGB by dropping the alpha channel.
//! Palette images are expanded by the decoder and follow the same rule.
//! Plain grayscale is kept as grayscale. Everything is reduced to 8 bits per
//! channel.
//!
//! # Examples
//!
//! ```ignore
//! use recompress_core::decode::{decode_image, resize_to_width};
//!
//! let bytes = std::fs::read("photo.png").unwrap();
//! let image = decode_image(&bytes).unwrap();
//! let web = resize_to_width(&image, 1600).unwrap();
//! println!("{}x{} -> {}x{}", image.width, image.height, web.width, web.height);
//! ```

mod reader;
mod resize;
mod types;

pub use reader::{decode_image, decode_image_oriented, normalize};
pub use resize::{fit_width_dimensions, resize, resize_to_width};
pub use types::{ColorMode, DecodeError, DecodedImage, Orientation, SourceMode};
