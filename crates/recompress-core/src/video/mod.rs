//! Video shrinking with a chain of fallback encoders.
//!
//! A [`VideoEncoder`] is one way of re-encoding a video. [`compress_video`]
//! tries a list of them in priority order: unavailable backends are skipped,
//! the first success wins, and if every backend fails the individual
//! failures are combined into a single [`VideoError::AllBackendsFailed`].

mod ffmpeg;
#[cfg(feature = "ffmpeg")]
mod libav;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use ffmpeg::{BitrateEncoder, FfmpegEncoder};
#[cfg(feature = "ffmpeg")]
pub use libav::LibavEncoder;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Highest x264 constant rate factor for 8-bit output.
pub const MAX_CRF: u8 = 51;

/// Errors from video compression.
#[derive(Debug, Error)]
pub enum VideoError {
    #[error("input video not found: {0}")]
    MissingInput(PathBuf),

    #[error("output would overwrite the input video: {0}")]
    SameInputOutput(PathBuf),

    #[error("{backend} is not available")]
    Unavailable { backend: String },

    #[error("failed to run {backend}: {source}")]
    Spawn {
        backend: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{backend} exited with {status}: {stderr}")]
    Failed {
        backend: String,
        status: String,
        stderr: String,
    },

    #[error("{backend} failed: {message}")]
    Backend { backend: String, message: String },

    #[error("failed to inspect {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("all video backends failed: {}", join_failures(.0))]
    AllBackendsFailed(Vec<VideoError>),
}

fn join_failures(failures: &[VideoError]) -> String {
    if failures.is_empty() {
        return "no backends configured".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Encoder parameters shared by the ffmpeg-based backends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    /// Largest output width; smaller videos are never upscaled
    pub max_width: u32,
    /// Largest output height
    pub max_height: u32,
    /// x264 constant rate factor
    pub crf: u8,
    /// x264 speed/compression preset
    pub preset: String,
    /// AAC bitrate for the primary encoder, in kbit/s
    pub audio_bitrate_kbps: u32,
    /// Primary encoder executable
    pub program: String,
    /// Executable for the bitrate-capped command-line fallback
    pub fallback_program: String,
    /// Video bitrate cap for the fallback encoder, in kbit/s
    pub fallback_video_bitrate_kbps: u32,
    /// AAC bitrate for the fallback encoder, in kbit/s
    pub fallback_audio_bitrate_kbps: u32,
    /// Encoder threads for the fallback encoder
    pub fallback_threads: u32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            crf: 28,
            preset: "medium".to_string(),
            audio_bitrate_kbps: 128,
            program: "ffmpeg".to_string(),
            fallback_program: "ffmpeg".to_string(),
            fallback_video_bitrate_kbps: 1500,
            fallback_audio_bitrate_kbps: 96,
            fallback_threads: 4,
        }
    }
}

/// A single video to shrink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl VideoJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// A backend able to re-encode a video.
pub trait VideoEncoder {
    /// Human readable backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Cheap check for whether the backend can run at all.
    fn is_available(&self) -> bool;

    /// Re-encode `job.input` into `job.output`, overwriting it.
    ///
    /// [`compress_video`] points `job.output` at a staging file and only
    /// moves it over the real destination after a successful encode.
    fn encode(&self, job: &VideoJob) -> Result<(), VideoError>;
}

/// Result of a successful compression.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoReport {
    pub backend: String,
    pub output: PathBuf,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
}

impl VideoReport {
    pub fn original_mb(&self) -> f64 {
        self.original_bytes as f64 / BYTES_PER_MB
    }

    pub fn compressed_mb(&self) -> f64 {
        self.compressed_bytes as f64 / BYTES_PER_MB
    }

    /// Size reduction relative to the original, in percent.
    ///
    /// Negative when the output grew. Zero for an empty original.
    pub fn reduction_percent(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.compressed_bytes as f64 / self.original_bytes as f64) * 100.0
    }
}

/// The summary block printed after a successful compression.
impl fmt::Display for VideoReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.output.display().to_string());

        writeln!(f, "[OK] Compressed video saved to {name}")?;
        writeln!(f, "  Original size: {:.2} MB", self.original_mb())?;
        writeln!(f, "  Compressed size: {:.2} MB", self.compressed_mb())?;
        write!(f, "  Reduction: {:.1}%", self.reduction_percent())
    }
}

/// The primary and fallback backends for `settings`, in priority order.
///
/// With the `ffmpeg` feature the linked libav encoder runs right after the
/// primary, so a missing `ffmpeg` executable still leaves a working backend.
pub fn default_encoders(settings: &VideoSettings) -> Vec<Box<dyn VideoEncoder>> {
    let mut encoders: Vec<Box<dyn VideoEncoder>> =
        vec![Box::new(FfmpegEncoder::new(settings.clone()))];
    #[cfg(feature = "ffmpeg")]
    encoders.push(Box::new(LibavEncoder::new(settings.clone())));
    encoders.push(Box::new(BitrateEncoder::new(settings.clone())));
    encoders
}

/// Shrink `job.input` using the first backend that succeeds.
///
/// Each backend writes to a staging file next to `job.output`. The staging
/// file replaces `job.output` only on success, so a failed run never
/// touches an output left by an earlier run.
pub fn compress_video(
    job: &VideoJob,
    encoders: &[Box<dyn VideoEncoder>],
) -> Result<VideoReport, VideoError> {
    if !job.input.is_file() {
        return Err(VideoError::MissingInput(job.input.clone()));
    }
    if same_file(&job.input, &job.output) {
        return Err(VideoError::SameInputOutput(job.output.clone()));
    }
    let original_bytes = file_size(&job.input)?;

    let dir = output_dir(&job.output);
    fs::create_dir_all(dir).map_err(|source| VideoError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut failures = Vec::new();

    for encoder in encoders {
        if !encoder.is_available() {
            warn!(backend = encoder.name(), "video backend not available");
            failures.push(VideoError::Unavailable {
                backend: encoder.name().to_string(),
            });
            continue;
        }

        info!(
            backend = encoder.name(),
            input = %job.input.display(),
            "compressing video"
        );

        let staging = staging_file(&job.output)?;
        let attempt = VideoJob::new(&job.input, staging.to_path_buf());
        debug!(staging = %staging.display(), "encoding to staging file");

        match encoder.encode(&attempt) {
            Ok(()) => {
                let compressed_bytes = file_size(&staging)?;
                staging
                    .persist(&job.output)
                    .map_err(|e| VideoError::Io {
                        path: job.output.clone(),
                        source: e.error,
                    })?;
                return Ok(VideoReport {
                    backend: encoder.name().to_string(),
                    output: job.output.clone(),
                    original_bytes,
                    compressed_bytes,
                });
            }
            Err(e) => {
                warn!(backend = encoder.name(), error = %e, "video backend failed");
                failures.push(e);
            }
        }
    }

    Err(VideoError::AllBackendsFailed(failures))
}

fn output_dir(output: &Path) -> &Path {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// An empty file beside `output` with the same extension, removed on drop.
fn staging_file(output: &Path) -> Result<TempPath, VideoError> {
    let dir = output_dir(output);
    let suffix = output
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    tempfile::Builder::new()
        .prefix(".recompress-")
        .suffix(&suffix)
        .tempfile_in(dir)
        .map(NamedTempFile::into_temp_path)
        .map_err(|source| VideoError::Io {
            path: dir.to_path_buf(),
            source,
        })
}

/// Whether `input` and `output` name the same file. `output` may not exist.
fn same_file(input: &Path, output: &Path) -> bool {
    let input = match fs::canonicalize(input) {
        Ok(path) => path,
        Err(_) => return false,
    };
    let output = match fs::canonicalize(output) {
        Ok(path) => path,
        Err(_) => match (output.file_name(), fs::canonicalize(output_dir(output))) {
            (Some(name), Ok(dir)) => dir.join(name),
            _ => return false,
        },
    };
    input == output
}

fn file_size(path: &Path) -> Result<u64, VideoError> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| VideoError::Io {
            path: path.to_path_buf(),
            source,
        })
}
