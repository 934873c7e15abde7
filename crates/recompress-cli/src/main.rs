//! `recompress` - shrink images and videos for the web.

mod cli;
mod logging;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use recompress_core::{compress_video, default_encoders, run_with, Config, VideoError};
use tracing::info;

use cli::{Cli, Command, VideoArgs};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Command::Images => images(&cli.config),
        Command::Video(args) => video(&cli.config, args),
    }
}

fn images(config_path: &Path) -> Result<ExitCode> {
    let config = load_config(config_path, true)?;

    let report = run_with(config.jobs(), |outcome| println!("{outcome}"));

    info!(
        written = report.written(),
        skipped = report.skipped(),
        failed = report.failed(),
        "image batch complete"
    );

    Ok(ExitCode::SUCCESS)
}

fn video(config_path: &Path, args: VideoArgs) -> Result<ExitCode> {
    let config = load_config(config_path, false)?;

    let mut settings = config.video_settings().clone();
    if let Some(crf) = args.crf {
        settings.crf = crf;
    }
    if let Some(program) = args.ffmpeg {
        settings.program = program;
    }
    if let Some(program) = args.fallback_ffmpeg {
        settings.fallback_program = program;
    }

    let job = config
        .video_job(args.input.as_deref(), args.output.as_deref())
        .context("no video to compress; pass INPUT or set [video] input")?;

    if !job.input.is_file() {
        println!("Error: {} not found!", display_name(&job.input));
        return Ok(ExitCode::FAILURE);
    }

    println!("Compressing {}...", display_name(&job.input));

    match compress_video(&job, &default_encoders(&settings)) {
        Ok(report) => {
            info!(backend = %report.backend, "video compressed");
            println!("{report}");
            println!("\n[OK] Video compression complete!");
            Ok(ExitCode::SUCCESS)
        }
        Err(VideoError::MissingInput(path)) => {
            println!("Error: {} not found!", display_name(&path));
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            println!("\n[ERROR] Video compression failed: {e}");
            println!("Install ffmpeg or point --ffmpeg/--fallback-ffmpeg at a working encoder.");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Load the config file. When `required` is false a missing file yields an
/// empty config rooted at the working directory.
fn load_config(path: &Path, required: bool) -> Result<Config> {
    if !required && !path.exists() {
        return Ok(Config::parse("", ".")?);
    }

    Config::load(path).with_context(|| format!("failed to load {}", path.display()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
