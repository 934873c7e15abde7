//! ffmpeg command-line backends.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::process::{Command, Stdio};

use tracing::debug;

use super::{VideoEncoder, VideoError, VideoJob, VideoSettings};

/// Lines of encoder stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Primary backend: H.264 at a constant rate factor, AAC audio, faststart.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    settings: VideoSettings,
}

impl FfmpegEncoder {
    pub fn new(settings: VideoSettings) -> Self {
        Self { settings }
    }

    /// Full ffmpeg argument list for `job`.
    pub fn args(&self, job: &VideoJob) -> Vec<OsString> {
        let s = &self.settings;
        let mut args: Vec<OsString> = vec!["-i".into(), job.input.clone().into()];
        args.extend(
            [
                "-c:v".to_string(),
                "libx264".to_string(),
                "-preset".to_string(),
                s.preset.clone(),
                "-crf".to_string(),
                s.crf.to_string(),
                "-c:a".to_string(),
                "aac".to_string(),
                "-b:a".to_string(),
                format!("{}k", s.audio_bitrate_kbps),
                "-movflags".to_string(),
                "+faststart".to_string(),
                "-vf".to_string(),
                scale_filter(s),
                "-y".to_string(),
            ]
            .map(OsString::from),
        );
        args.push(job.output.clone().into());
        args
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg (crf)"
    }

    fn is_available(&self) -> bool {
        answers_version(&self.settings.program)
    }

    fn encode(&self, job: &VideoJob) -> Result<(), VideoError> {
        run(self.name(), &self.settings.program, self.args(job))
    }
}

/// Fallback backend: bitrate-capped H.264 with lower audio bitrate and a
/// fixed thread count.
#[derive(Debug, Clone)]
pub struct BitrateEncoder {
    settings: VideoSettings,
}

impl BitrateEncoder {
    pub fn new(settings: VideoSettings) -> Self {
        Self { settings }
    }

    /// Full ffmpeg argument list for `job`.
    pub fn args(&self, job: &VideoJob) -> Vec<OsString> {
        let s = &self.settings;
        let mut args: Vec<OsString> = vec!["-i".into(), job.input.clone().into()];
        args.extend(
            [
                "-vf".to_string(),
                scale_filter(s),
                "-c:v".to_string(),
                "libx264".to_string(),
                "-preset".to_string(),
                s.preset.clone(),
                "-b:v".to_string(),
                format!("{}k", s.fallback_video_bitrate_kbps),
                "-crf".to_string(),
                s.crf.to_string(),
                "-c:a".to_string(),
                "aac".to_string(),
                "-b:a".to_string(),
                format!("{}k", s.fallback_audio_bitrate_kbps),
                "-threads".to_string(),
                s.fallback_threads.to_string(),
                "-y".to_string(),
            ]
            .map(OsString::from),
        );
        args.push(job.output.clone().into());
        args
    }
}

impl VideoEncoder for BitrateEncoder {
    fn name(&self) -> &str {
        "ffmpeg (bitrate-capped)"
    }

    fn is_available(&self) -> bool {
        answers_version(&self.settings.fallback_program)
    }

    fn encode(&self, job: &VideoJob) -> Result<(), VideoError> {
        run(self.name(), &self.settings.fallback_program, self.args(job))
    }
}

/// Downscale into the bounding box, keep aspect ratio, never upscale, and
/// keep both sides even for yuv420p.
fn scale_filter(s: &VideoSettings) -> String {
    format!(
        "scale='min({w},iw)':'min({h},ih)':force_original_aspect_ratio=decrease:force_divisible_by=2",
        w = s.max_width,
        h = s.max_height,
    )
}

/// Returns true if `program -version` runs and exits successfully.
fn answers_version(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn run(backend: &str, program: &str, args: Vec<OsString>) -> Result<(), VideoError> {
    debug!(backend, program, ?args, "spawning encoder");

    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| match source.kind() {
            ErrorKind::NotFound => VideoError::Unavailable {
                backend: backend.to_string(),
            },
            _ => VideoError::Spawn {
                backend: backend.to_string(),
                source,
            },
        })?;

    if output.status.success() {
        return Ok(());
    }

    Err(VideoError::Failed {
        backend: backend.to_string(),
        status: output.status.to_string(),
        stderr: stderr_tail(&output.stderr),
    })
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
