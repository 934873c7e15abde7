//! TOML job configuration.
//!
//! A config file lists the images to recompress, in order, with optional
//! per-job quality and width overrides. Relative paths are resolved against
//! the directory containing the config file.
//!
//! ```toml
//! [defaults]
//! quality = 82
//! max_width = 1600
//!
//! [[jobs]]
//! source = "understairs carousel 1 image 2.png"
//! quality = 72
//! max_width = 1800
//!
//! [[jobs]]
//! source = "understairs carousel 2 image 1.jpeg"
//! max_width = "none"
//!
//! [video]
//! input = "python kitchen video 4.mp4"
//! crf = 28
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::encode::DEFAULT_QUALITY;
use crate::job::{compressed_name, destination_for, CompressionJob, DEFAULT_MAX_WIDTH};
use crate::video::{VideoJob, VideoSettings, MAX_CRF};

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "recompress.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{context}: quality must be between 1 and 100, got {value}")]
    InvalidQuality { context: String, value: u32 },

    #[error("{context}: max_width must be a positive number or \"none\", got {value}")]
    InvalidMaxWidth { context: String, value: String },

    #[error("video: crf must be between 0 and {max}, got {value}", max = MAX_CRF)]
    InvalidCrf { value: u8 },

    #[error("job {index}: source must not be empty")]
    EmptySource { index: usize },

    #[error("no video input configured")]
    NoVideoInput,
}

/// A width cap as written in the config: a pixel count or `"none"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WidthLimit {
    Pixels(u32),
    Keyword(String),
}

impl WidthLimit {
    fn resolve(&self, context: impl Fn() -> String) -> Result<Option<u32>, ConfigError> {
        match self {
            WidthLimit::Pixels(0) => Err(ConfigError::InvalidMaxWidth {
                context: context(),
                value: "0".to_string(),
            }),
            WidthLimit::Pixels(px) => Ok(Some(*px)),
            WidthLimit::Keyword(k) if k.eq_ignore_ascii_case("none") => Ok(None),
            WidthLimit::Keyword(k) => Err(ConfigError::InvalidMaxWidth {
                context: context(),
                value: k.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    pub quality: Option<u32>,
    pub max_width: Option<WidthLimit>,
    pub auto_orient: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobEntry {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub quality: Option<u32>,
    pub max_width: Option<WidthLimit>,
    pub auto_orient: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoSection {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    #[serde(flatten)]
    pub settings: VideoSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    defaults: Defaults,
    #[serde(default)]
    jobs: Vec<JobEntry>,
    #[serde(default)]
    video: VideoSection,
}

/// A validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    base_dir: PathBuf,
    jobs: Vec<CompressionJob>,
    video: VideoSection,
}

impl Config {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Self::parse(&text, base_dir)
    }

    /// Parse config text, resolving relative paths against `base_dir`.
    pub fn parse(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;
        let base_dir = base_dir.into();

        let default_quality = match raw.defaults.quality {
            Some(q) => check_quality(q, || "defaults".to_string())?,
            None => DEFAULT_QUALITY,
        };
        let default_max_width = match &raw.defaults.max_width {
            Some(limit) => limit.resolve(|| "defaults".to_string())?,
            None => Some(DEFAULT_MAX_WIDTH),
        };
        let default_auto_orient = raw.defaults.auto_orient.unwrap_or(false);

        let jobs = raw
            .jobs
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                if entry.source.as_os_str().is_empty() {
                    return Err(ConfigError::EmptySource { index });
                }
                let context = || format!("job {index} ({})", entry.source.display());

                let source = base_dir.join(&entry.source);
                let destination = match &entry.destination {
                    Some(dest) => base_dir.join(dest),
                    None => destination_for(&source),
                };
                let quality = match entry.quality {
                    Some(q) => check_quality(q, context)?,
                    None => default_quality,
                };
                let max_width = match &entry.max_width {
                    Some(limit) => limit.resolve(context)?,
                    None => default_max_width,
                };

                Ok(CompressionJob {
                    source,
                    destination,
                    quality,
                    max_width,
                    auto_orient: entry.auto_orient.unwrap_or(default_auto_orient),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        check_crf(raw.video.settings.crf)?;

        Ok(Self {
            base_dir,
            jobs,
            video: raw.video,
        })
    }

    /// Directory relative paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The ordered job list.
    pub fn jobs(&self) -> &[CompressionJob] {
        &self.jobs
    }

    /// Encoder settings from the `[video]` section.
    pub fn video_settings(&self) -> &VideoSettings {
        &self.video.settings
    }

    /// The video job, with command-line overrides taking precedence.
    ///
    /// Override paths are used as given; config paths are resolved against
    /// the config directory. The output defaults to
    /// `compressed_<slug>.mp4` next to the input.
    pub fn video_job(
        &self,
        input: Option<&Path>,
        output: Option<&Path>,
    ) -> Result<VideoJob, ConfigError> {
        let input = match (input, &self.video.input) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(path)) => self.base_dir.join(path),
            (None, None) => return Err(ConfigError::NoVideoInput),
        };
        let output = match (output, &self.video.output) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(path)) => self.base_dir.join(path),
            (None, None) => compressed_name(&input, "mp4"),
        };
        Ok(VideoJob::new(input, output))
    }
}

fn check_quality(value: u32, context: impl Fn() -> String) -> Result<u8, ConfigError> {
    match u8::try_from(value) {
        Ok(q @ 1..=100) => Ok(q),
        _ => Err(ConfigError::InvalidQuality {
            context: context(),
            value,
        }),
    }
}

fn check_crf(value: u8) -> Result<u8, ConfigError> {
    if value > MAX_CRF {
        return Err(ConfigError::InvalidCrf { value });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[defaults]
quality = 82
max_width = 1600

[[jobs]]
source = "bespoke furniture carousel 1 image 1.png"
destination = "compressed_bespoke_furniture_carousel_1_image_1.jpg"

[[jobs]]
source = "understairs carousel 1 image 2.png"
quality = 72
max_width = 1800

[[jobs]]
source = "understairs carousel 2 image 1.jpeg"
quality = 75
max_width = "none"

[video]
input = "python kitchen video 4.mp4"
crf = 30
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::parse(SAMPLE, "/site").unwrap();
        let jobs = config.jobs();

        assert_eq!(jobs.len(), 3);

        assert_eq!(
            jobs[0].source,
            PathBuf::from("/site/bespoke furniture carousel 1 image 1.png")
        );
        assert_eq!(
            jobs[0].destination,
            PathBuf::from("/site/compressed_bespoke_furniture_carousel_1_image_1.jpg")
        );
        assert_eq!(jobs[0].quality, 82);
        assert_eq!(jobs[0].max_width, Some(1600));

        assert_eq!(jobs[1].quality, 72);
        assert_eq!(jobs[1].max_width, Some(1800));
        assert_eq!(
            jobs[1].destination,
            PathBuf::from("/site/compressed_understairs_carousel_1_image_2.jpg")
        );

        assert_eq!(jobs[2].quality, 75);
        assert_eq!(jobs[2].max_width, None);
    }

    #[test]
    fn test_builtin_defaults() {
        let config = Config::parse("[[jobs]]\nsource = \"a.png\"\n", ".").unwrap();
        let job = &config.jobs()[0];

        assert_eq!(job.quality, DEFAULT_QUALITY);
        assert_eq!(job.max_width, Some(DEFAULT_MAX_WIDTH));
        assert!(!job.auto_orient);
    }

    #[test]
    fn test_empty_config_has_no_jobs() {
        let config = Config::parse("", ".").unwrap();
        assert!(config.jobs().is_empty());
        assert_eq!(config.video_settings(), &VideoSettings::default());
    }

    #[test]
    fn test_absolute_paths_are_kept() {
        let config = Config::parse(
            "[[jobs]]\nsource = \"/abs/a.png\"\ndestination = \"/out/a.jpg\"\n",
            "/site",
        )
        .unwrap();

        assert_eq!(config.jobs()[0].source, PathBuf::from("/abs/a.png"));
        assert_eq!(config.jobs()[0].destination, PathBuf::from("/out/a.jpg"));
    }

    #[test]
    fn test_invalid_quality() {
        let err = Config::parse("[[jobs]]\nsource = \"a.png\"\nquality = 0\n", ".").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidQuality { value: 0, .. }));

        let err = Config::parse("[defaults]\nquality = 101\n", ".").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidQuality { value: 101, .. }));

        let err = Config::parse("[[jobs]]\nsource = \"a.png\"\nquality = 300\n", ".").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidQuality { value: 300, .. }));
    }

    #[test]
    fn test_invalid_crf() {
        let err = Config::parse("[video]\ncrf = 52\n", ".").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCrf { value: 52 }));
        assert_eq!(
            err.to_string(),
            "video: crf must be between 0 and 51, got 52"
        );

        let config = Config::parse("[video]\ncrf = 51\n", ".").unwrap();
        assert_eq!(config.video_settings().crf, 51);
        assert!(Config::parse("[video]\ncrf = 0\n", ".").is_ok());
    }

    #[test]
    fn test_invalid_max_width() {
        let err = Config::parse("[[jobs]]\nsource = \"a.png\"\nmax_width = 0\n", ".").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMaxWidth { .. }));

        let err =
            Config::parse("[[jobs]]\nsource = \"a.png\"\nmax_width = \"wide\"\n", ".").unwrap_err();
        assert!(err.to_string().contains("\"none\""));
    }

    #[test]
    fn test_empty_source() {
        let err = Config::parse("[[jobs]]\nsource = \"\"\n", ".").unwrap_err();
        assert!(matches!(err, ConfigError::EmptySource { index: 0 }));
    }

    #[test]
    fn test_unknown_job_field_rejected() {
        let err = Config::parse("[[jobs]]\nsource = \"a.png\"\nqualty = 80\n", ".").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_video_section() {
        let config = Config::parse(SAMPLE, "/site").unwrap();

        assert_eq!(config.video_settings().crf, 30);
        assert_eq!(config.video_settings().max_width, 1920);

        let job = config.video_job(None, None).unwrap();
        assert_eq!(job.input, PathBuf::from("/site/python kitchen video 4.mp4"));
        assert_eq!(
            job.output,
            PathBuf::from("/site/compressed_python_kitchen_video_4.mp4")
        );
    }

    #[test]
    fn test_video_job_overrides() {
        let config = Config::parse(SAMPLE, "/site").unwrap();
        let job = config
            .video_job(Some(Path::new("clip.mov")), Some(Path::new("small.mp4")))
            .unwrap();

        assert_eq!(job.input, PathBuf::from("clip.mov"));
        assert_eq!(job.output, PathBuf::from("small.mp4"));
    }

    #[test]
    fn test_video_job_without_input() {
        let config = Config::parse("", ".").unwrap();
        assert!(matches!(
            config.video_job(None, None),
            Err(ConfigError::NoVideoInput)
        ));
    }

    #[test]
    fn test_load_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[[jobs]]\nsource = \"hero image.png\"\n").unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.base_dir(), dir.path());
        assert_eq!(config.jobs()[0].source, dir.path().join("hero image.png"));
        assert_eq!(
            config.jobs()[0].destination,
            dir.path().join("compressed_hero_image.jpg")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
