//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use recompress_core::{DEFAULT_CONFIG_FILE, MAX_CRF};

/// Shrink images and videos for the web.
#[derive(Parser, Debug)]
#[command(name = "recompress", author, version, about, long_about = None)]
pub struct Cli {
    /// Job configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "RECOMPRESS_CONFIG",
        default_value = DEFAULT_CONFIG_FILE
    )]
    pub config: PathBuf,

    /// Log more detail to stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Recompress every image job listed in the config, in order
    Images,

    /// Shrink a video with ffmpeg, falling back to a bitrate-capped encode
    Video(VideoArgs),
}

#[derive(Args, Debug, Default)]
pub struct VideoArgs {
    /// Source video (defaults to `[video] input` from the config)
    pub input: Option<PathBuf>,

    /// Destination video (defaults to compressed_<name>.mp4 next to the input)
    pub output: Option<PathBuf>,

    /// Override the constant rate factor (0-51)
    #[arg(long, value_parser = clap::value_parser!(u8).range(..=i64::from(MAX_CRF)))]
    pub crf: Option<u8>,

    /// Primary encoder executable
    #[arg(long, env = "RECOMPRESS_FFMPEG")]
    pub ffmpeg: Option<String>,

    /// Executable for the bitrate-capped fallback
    #[arg(long, env = "RECOMPRESS_FALLBACK_FFMPEG")]
    pub fallback_ffmpeg: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_images_defaults() {
        let cli = Cli::try_parse_from(["recompress", "images"]).unwrap();

        assert!(matches!(cli.command, Command::Images));
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["recompress", "images", "-vv", "--config", "site/jobs.toml"])
                .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, PathBuf::from("site/jobs.toml"));
    }

    #[test]
    fn test_video_args() {
        let cli = Cli::try_parse_from([
            "recompress",
            "video",
            "python kitchen video 4.mp4",
            "--crf",
            "30",
        ])
        .unwrap();

        match cli.command {
            Command::Video(args) => {
                assert_eq!(args.input, Some(PathBuf::from("python kitchen video 4.mp4")));
                assert_eq!(args.output, None);
                assert_eq!(args.crf, Some(30));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_crf_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["recompress", "video", "a.mp4", "--crf", "52"]).is_err());

        let cli = Cli::try_parse_from(["recompress", "video", "a.mp4", "--crf", "51"]).unwrap();
        assert!(matches!(cli.command, Command::Video(VideoArgs { crf: Some(51), .. })));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["recompress"]).is_err());
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
