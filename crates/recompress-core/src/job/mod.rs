//! Batch image recompression.
//!
//! A run takes an ordered list of [`CompressionJob`]s and processes them one
//! at a time. Each job is independent: a missing source is skipped, a codec
//! failure is recorded, and the batch always continues with the next job.

mod naming;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::decode::{self, DecodeError};
use crate::encode::{self, EncodeError, JpegOptions, DEFAULT_QUALITY};

pub use naming::{compressed_name, destination_for, COMPRESSED_PREFIX};

/// Default width cap applied when a job does not specify one.
pub const DEFAULT_MAX_WIDTH: u32 = 1600;

/// Errors that fail a single job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// One source-to-destination compression task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionJob {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// JPEG quality (1-100)
    pub quality: u8,
    /// Width cap in pixels, `None` keeps the original size
    pub max_width: Option<u32>,
    /// Apply EXIF orientation before resizing
    pub auto_orient: bool,
}

impl CompressionJob {
    /// A job with the default quality and width cap, writing to the
    /// conventional `compressed_<slug>.jpg` next to the source.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let destination = destination_for(&source);
        Self {
            source,
            destination,
            quality: DEFAULT_QUALITY,
            max_width: Some(DEFAULT_MAX_WIDTH),
            auto_orient: false,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_max_width(mut self, max_width: Option<u32>) -> Self {
        self.max_width = max_width;
        self
    }

    pub fn with_auto_orient(mut self, auto_orient: bool) -> Self {
        self.auto_orient = auto_orient;
        self
    }

    /// Decode, normalize, resize and encode this job's source.
    ///
    /// The caller is responsible for checking that the source exists.
    fn execute(&self) -> Result<Written, JobError> {
        let bytes = fs::read(&self.source).map_err(|source| JobError::Read {
            path: self.source.display().to_string(),
            source,
        })?;

        let image = if self.auto_orient {
            decode::decode_image_oriented(&bytes)?
        } else {
            decode::decode_image(&bytes)?
        };
        // Release the encoded source before allocating the resized copy.
        drop(bytes);

        let image = match self.max_width {
            Some(max_width) if image.width > max_width => {
                let resized = decode::resize_to_width(&image, max_width)?;
                debug!(
                    from = ?(image.width, image.height),
                    to = ?(resized.width, resized.height),
                    "downscaled"
                );
                resized
            }
            _ => image,
        };

        let bytes = encode::write_jpeg(
            &image,
            &self.destination,
            &JpegOptions::with_quality(self.quality),
        )?;

        Ok(Written {
            width: image.width,
            height: image.height,
            bytes,
        })
    }
}

struct Written {
    width: u32,
    height: u32,
    bytes: u64,
}

/// What happened to a single job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The destination was written.
    Written {
        source: PathBuf,
        destination: PathBuf,
        width: u32,
        height: u32,
        bytes: u64,
    },
    /// The source does not exist; nothing was written.
    Skipped { source: PathBuf },
    /// Decoding or encoding failed.
    Failed { source: PathBuf, reason: String },
}

impl JobOutcome {
    pub fn source(&self) -> &Path {
        match self {
            JobOutcome::Written { source, .. }
            | JobOutcome::Skipped { source }
            | JobOutcome::Failed { source, .. } => source,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, JobOutcome::Written { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, JobOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobOutcome::Failed { .. })
    }
}

/// The console status line for the outcome.
impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Written { destination, .. } => {
                write!(f, "[OK] Wrote {}", destination.display())
            }
            JobOutcome::Skipped { source } => {
                write!(f, "[SKIP] Source not found: {}", source.display())
            }
            JobOutcome::Failed { source, reason } => {
                write!(f, "ERROR processing {}: {reason}", display_name(source))
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Ordered outcomes of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outcomes: Vec<JobOutcome>,
}

impl BatchReport {
    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_written()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }
}

/// Process a single job and return its outcome. Never fails.
pub fn process(job: &CompressionJob) -> JobOutcome {
    if !job.source.exists() {
        info!(source = %job.source.display(), "source not found, skipping");
        return JobOutcome::Skipped {
            source: job.source.clone(),
        };
    }

    match job.execute() {
        Ok(written) => {
            info!(
                source = %job.source.display(),
                destination = %job.destination.display(),
                width = written.width,
                height = written.height,
                bytes = written.bytes,
                "wrote compressed image"
            );
            JobOutcome::Written {
                source: job.source.clone(),
                destination: job.destination.clone(),
                width: written.width,
                height: written.height,
                bytes: written.bytes,
            }
        }
        Err(e) => {
            debug!(source = %job.source.display(), error = %e, "job failed");
            JobOutcome::Failed {
                source: job.source.clone(),
                reason: e.to_string(),
            }
        }
    }
}

/// Run every job in order.
pub fn run(jobs: &[CompressionJob]) -> BatchReport {
    run_with(jobs, |_| {})
}

/// Run every job in order, calling `on_outcome` as soon as each job finishes.
pub fn run_with<F>(jobs: &[CompressionJob], mut on_outcome: F) -> BatchReport
where
    F: FnMut(&JobOutcome),
{
    let mut report = BatchReport {
        outcomes: Vec::with_capacity(jobs.len()),
    };

    for job in jobs {
        let outcome = process(job);
        on_outcome(&outcome);
        report.outcomes.push(outcome);
    }

    debug!(
        written = report.written(),
        skipped = report.skipped(),
        failed = report.failed(),
        "batch finished"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_defaults() {
        let job = CompressionJob::new("hero image.png");

        assert_eq!(job.destination, PathBuf::from("compressed_hero_image.jpg"));
        assert_eq!(job.quality, 82);
        assert_eq!(job.max_width, Some(1600));
        assert!(!job.auto_orient);
    }

    #[test]
    fn test_builder_overrides() {
        let job = CompressionJob::new("a.jpeg")
            .with_destination("out.jpg")
            .with_quality(72)
            .with_max_width(Some(1800))
            .with_auto_orient(true);

        assert_eq!(job.destination, PathBuf::from("out.jpg"));
        assert_eq!(job.quality, 72);
        assert_eq!(job.max_width, Some(1800));
        assert!(job.auto_orient);
    }

    #[test]
    fn test_outcome_lines() {
        let ok = JobOutcome::Written {
            source: PathBuf::from("a.png"),
            destination: PathBuf::from("compressed_a.jpg"),
            width: 1,
            height: 1,
            bytes: 10,
        };
        assert_eq!(ok.to_string(), "[OK] Wrote compressed_a.jpg");

        let skip = JobOutcome::Skipped {
            source: PathBuf::from("missing.png"),
        };
        assert_eq!(skip.to_string(), "[SKIP] Source not found: missing.png");

        let failed = JobOutcome::Failed {
            source: PathBuf::from("dir/broken.png"),
            reason: "Invalid or unsupported image format".to_string(),
        };
        assert_eq!(
            failed.to_string(),
            "ERROR processing broken.png: Invalid or unsupported image format"
        );
    }

    #[test]
    fn test_report_counts() {
        let report = BatchReport {
            outcomes: vec![
                JobOutcome::Skipped {
                    source: PathBuf::from("a"),
                },
                JobOutcome::Failed {
                    source: PathBuf::from("b"),
                    reason: "x".into(),
                },
                JobOutcome::Skipped {
                    source: PathBuf::from("c"),
                },
            ],
        };

        assert_eq!(report.written(), 0);
        assert_eq!(report.skipped(), 2);
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn test_missing_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let job = CompressionJob::new(dir.path().join("nope.png"));

        let outcome = process(&job);

        assert!(outcome.is_skipped());
        assert!(!job.destination.exists());
    }

    #[test]
    fn test_corrupt_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.png");
        fs::write(&source, b"definitely not a png").unwrap();

        let job = CompressionJob::new(&source);
        let outcome = process(&job);

        assert!(outcome.is_failed());
        assert_eq!(outcome.source(), source.as_path());
        assert!(!job.destination.exists());
    }

    #[test]
    fn test_run_with_streams_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let jobs: Vec<_> = ["one.png", "two.png", "three.png"]
            .iter()
            .map(|n| CompressionJob::new(dir.path().join(n)))
            .collect();

        let mut seen = Vec::new();
        let report = run_with(&jobs, |o| seen.push(o.source().to_path_buf()));

        let expected: Vec<_> = jobs.iter().map(|j| j.source.clone()).collect();
        assert_eq!(seen, expected);
        assert_eq!(report.skipped(), 3);
    }
}
