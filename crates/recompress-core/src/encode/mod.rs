//! Image encoding pipeline.
//!
//! This module provides functionality for:
//! - Encoding images to progressive JPEG with optimized Huffman tables
//! - Writing encoded images to disk
//!
//! # Examples
//!
//! ```ignore
//! use recompress_core::decode::DecodedImage;
//! use recompress_core::encode::{encode_jpeg, JpegOptions};
//!
//! let image = DecodedImage::new(100, 100, vec![128u8; 100 * 100 * 3]);
//! let jpeg_bytes = encode_jpeg(&image, &JpegOptions::with_quality(82)).unwrap();
//! println!("Encoded {} bytes", jpeg_bytes.len());
//! ```

mod jpeg;

pub use jpeg::{encode_jpeg, write_jpeg, EncodeError, JpegOptions, DEFAULT_QUALITY};
