//! Recompress Core - web asset recompression library
//!
//! This crate turns source images into size-reduced progressive JPEGs and
//! shrinks videos through external encoders. Jobs are described in a TOML
//! config and processed strictly in order; one bad input never aborts a
//! batch.
//!
//! # Module Structure
//!
//! - `decode` - Image decoding, color normalization and resizing
//! - `encode` - Progressive JPEG encoding
//! - `job` - Compression jobs and the batch runner
//! - `config` - TOML job configuration
//! - `video` - Video compression backends with fallback

pub mod config;
pub mod decode;
pub mod encode;
pub mod job;
pub mod video;

pub use config::{Config, ConfigError, DEFAULT_CONFIG_FILE};
pub use job::{run, run_with, BatchReport, CompressionJob, JobError, JobOutcome};
pub use video::{
    compress_video, default_encoders, VideoEncoder, VideoError, VideoJob, VideoReport,
    VideoSettings, MAX_CRF,
};
