use anyhow::{Result, bail};
use clap::{ArgAction, Parser, ValueHint};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "sound_adder",
    version,
    about = "Add audio tracks from one directory to the videos of another"
)]
pub struct Cli {
    /// Path to directory with videos
    #[arg(value_name = "VIDEOS", value_parser = parse_dir_path, value_hint = ValueHint::DirPath)]
    pub dir_videos: PathBuf,

    /// Path to directory with audios
    #[arg(value_name = "AUDIOS", value_parser = parse_dir_path, value_hint = ValueHint::DirPath)]
    pub dir_audios: PathBuf,

    /// Path to directory to store results
    #[arg(value_name = "RESULTS", value_parser = parse_dir_path, value_hint = ValueHint::DirPath)]
    pub dir_results: PathBuf,

    /// Run without confirmation prompt
    #[arg(short = 'y', action = ArgAction::SetTrue)]
    pub confirm: bool,

    /// Show per-pair progress while ffmpeg runs
    #[arg(short = 'v', long, action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Skip failed pairs. Without it the first failure stops the batch
    #[arg(short = 's', long, action = ArgAction::SetTrue)]
    pub skip: bool,

    /// Save report to the specified file in JSON format
    #[arg(short = 'r', long, value_name = "FILEPATH", value_parser = parse_writable_filepath, value_hint = ValueHint::FilePath)]
    pub report: Option<PathBuf>,

    /// Maximum delta between durations of video and audio, in seconds
    #[arg(short = 'd', long, default_value = "0", allow_hyphen_values = true, value_parser = parse_duration_delta)]
    pub delta: u64,

    /// Do not compare video and audio durations before running
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_duration_check: bool,

    /// Leave the video's own audio track (stream 0:1) out of the result
    #[arg(long, action = ArgAction::SetTrue)]
    pub drop_original_audio: bool,

    /// Path to ffmpeg binary (overrides PATH lookup)
    #[arg(long, value_hint = ValueHint::ExecutablePath)]
    pub ffmpeg: Option<PathBuf>,

    /// Path to ffprobe binary (overrides PATH lookup)
    #[arg(long, value_hint = ValueHint::ExecutablePath)]
    pub ffprobe: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub dir_videos: PathBuf,
    pub dir_audios: PathBuf,
    pub dir_results: PathBuf,
    pub assume_yes: bool,
    pub verbose: bool,
    pub skip: bool,
    pub report: Option<PathBuf>,
    /// `None` disables the duration check.
    pub tolerance: Option<Duration>,
    pub keep_original_audio: bool,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

impl Cli {
    pub fn into_config(self) -> Result<AppConfig> {
        if self.dir_results == self.dir_videos {
            bail!(
                "Results directory must differ from the video directory: {}",
                self.dir_results.display()
            );
        }
        let tolerance = if self.no_duration_check {
            None
        } else {
            Some(Duration::from_secs(self.delta))
        };

        Ok(AppConfig {
            dir_videos: self.dir_videos,
            dir_audios: self.dir_audios,
            dir_results: self.dir_results,
            assume_yes: self.confirm,
            verbose: self.verbose,
            skip: self.skip,
            report: self.report,
            tolerance,
            keep_original_audio: !self.drop_original_audio,
            ffmpeg: self.ffmpeg,
            ffprobe: self.ffprobe,
        })
    }
}

pub fn parse_dir_path(raw: &str) -> Result<PathBuf, String> {
    let path = Path::new(raw);
    if !path.is_dir() {
        return Err(format!("Nonexistent directory: {raw}"));
    }
    std::path::absolute(path).map_err(|e| format!("cannot resolve {raw}: {e}"))
}

pub fn parse_writable_filepath(raw: &str) -> Result<PathBuf, String> {
    let path = Path::new(raw);
    if path.is_file() {
        if !is_writable(path) {
            return Err(format!("Don't have permission to rewrite file: {raw}"));
        }
    } else {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if !parent.is_dir() {
            return Err(format!("Nonexistent directory: {}", parent.display()));
        }
        if !is_writable(parent) {
            return Err(format!(
                "Don't have permissions to write file in this directory: {}",
                parent.display()
            ));
        }
    }
    std::path::absolute(path).map_err(|e| format!("cannot resolve {raw}: {e}"))
}

pub fn parse_duration_delta(raw: &str) -> Result<u64, String> {
    let parsed: i64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("`{raw}` must be a whole number of seconds"))?;
    if parsed < 0 {
        return Err("Duration delta can not be negative".into());
    }
    Ok(parsed as u64)
}

/// Whether the current user may write to `path`, as the kernel decides it.
#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    nix::unistd::access(path, nix::unistd::AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}
