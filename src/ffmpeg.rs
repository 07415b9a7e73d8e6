use crate::pairing::CorrespondencePair;
use crate::process::{self, Invocation};
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use which::which;

#[derive(Debug, Clone)]
pub struct Tools {
    pub ffmpeg: PathBuf,
    pub ffprobe: Option<PathBuf>,
}

/// Builds the external command that muxes one pair.
pub trait Muxer {
    fn invocation(&self, pair: &CorrespondencePair) -> Invocation;
}

#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    ffmpeg: PathBuf,
    keep_original_audio: bool,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg: PathBuf, keep_original_audio: bool) -> Self {
        Self {
            ffmpeg,
            keep_original_audio,
        }
    }
}

impl Muxer for FfmpegMuxer {
    /// Stream-copies everything. Track order in the output is the map order:
    /// video `0:0`, the new audio `1:0`, then the video's own audio `0:1`.
    fn invocation(&self, pair: &CorrespondencePair) -> Invocation {
        let inv = Invocation::new(&self.ffmpeg)
            .arg("-i")
            .arg(&pair.video_path)
            .arg("-i")
            .arg(&pair.audio_path)
            .args(["-c:v", "copy", "-c:a", "copy"])
            .args(["-map", "0:0", "-map", "1:0"]);
        let inv = if self.keep_original_audio {
            inv.args(["-map", "0:1"])
        } else {
            inv
        };
        inv.arg(&pair.result_path)
    }
}

pub fn resolve_tools(ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Result<Tools> {
    let ffmpeg = resolve_bin(ffmpeg, "ffmpeg")?;
    check_version(&ffmpeg)?;

    let ffprobe = match ffprobe {
        Some(path) => Some(resolve_bin(Some(path), "ffprobe")?),
        None => resolve_bin(None, "ffprobe").ok(),
    };
    if let Some(path) = &ffprobe {
        check_version(path)?;
    }

    tracing::debug!(ffmpeg = %ffmpeg.display(), ffprobe = ?ffprobe, "resolved tools");
    Ok(Tools { ffmpeg, ffprobe })
}

fn check_version(bin: &Path) -> Result<()> {
    let inv = Invocation::new(bin).arg("-version");
    let code = process::run_discarding(&inv)
        .with_context(|| format!("failed to run {}", bin.display()))?;
    if code != 0 {
        bail!("`{} -version` exited with code {code}", bin.display());
    }
    Ok(())
}

fn resolve_bin(bin_opt: Option<PathBuf>, default: &str) -> Result<PathBuf> {
    if let Some(path) = bin_opt {
        if path.is_file() {
            return Ok(path);
        }
        bail!("Provided binary not found: {}", path.display());
    }

    which(default)
        .or_else(|_| {
            if cfg!(windows) {
                let exe = format!("{default}.exe");
                which(&exe)
            } else {
                Err(which::Error::CannotFindBinaryPath)
            }
        })
        .with_context(|| format!("`{default}` not found in PATH"))
}
