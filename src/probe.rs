//! Duration and stream-type queries against media files.
//!
//! [`FfprobeProbe`] scrapes the text ffprobe prints. [`ExtensionProbe`] is the
//! filename-suffix fallback used when ffprobe is not installed; it cannot
//! measure durations.

use crate::process::{Invocation, MergedOutput};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi"];
pub const AUDIO_EXTENSIONS: &[&str] = &["mka", "aac", "mp3", "m4a"];

static STREAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Stream #\d+:\d+(?:\[0x[0-9a-fA-F]+\])?(?:\([a-z]{0,3}\))?: (Video|Audio)")
        .expect("stream descriptor pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Unknown,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run {tool} on {}: {source}", .path.display())]
    Spawn {
        tool: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse duration of {}: {output:?}", .path.display())]
    Parse { path: PathBuf, output: String },

    #[error("{operation} is unavailable without ffprobe")]
    Unsupported { operation: &'static str },
}

/// Media metadata queries. Every call re-probes the file; nothing is cached.
pub trait MediaProbe {
    /// Whole-second duration of the file. Fractional seconds are truncated.
    fn duration(&self, path: &Path) -> Result<Duration, ProbeError>;

    fn classify(&self, path: &Path) -> Result<MediaKind, ProbeError>;
}

#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe: PathBuf,
}

impl FfprobeProbe {
    pub fn new(ffprobe: PathBuf) -> Self {
        Self { ffprobe }
    }
}

impl MediaProbe for FfprobeProbe {
    fn duration(&self, path: &Path) -> Result<Duration, ProbeError> {
        let out = Command::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(path)
            .output()
            .map_err(|source| ProbeError::Spawn {
                tool: "ffprobe".into(),
                path: path.to_path_buf(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&out.stdout);
        parse_duration(&stdout).ok_or_else(|| {
            let stderr = String::from_utf8_lossy(&out.stderr);
            ProbeError::Parse {
                path: path.to_path_buf(),
                output: format!("{}{}", stdout.trim(), stderr.trim()),
            }
        })
    }

    fn classify(&self, path: &Path) -> Result<MediaKind, ProbeError> {
        let inv = Invocation::new(&self.ffprobe).arg(path);
        let mut output = MergedOutput::spawn(&inv).map_err(|source| ProbeError::Spawn {
            tool: "ffprobe".into(),
            path: path.to_path_buf(),
            source,
        })?;

        let kind = classify_lines(output.by_ref());
        if kind == MediaKind::Unknown {
            // ffprobe's own exit status is irrelevant here; an unreadable
            // file simply has no stream lines.
            let _ = output.wait();
        } else {
            output.terminate();
        }
        tracing::debug!(path = %path.display(), ?kind, "classified");
        Ok(kind)
    }
}

/// Classification by file extension alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionProbe;

impl MediaProbe for ExtensionProbe {
    fn duration(&self, _path: &Path) -> Result<Duration, ProbeError> {
        Err(ProbeError::Unsupported {
            operation: "duration probing",
        })
    }

    fn classify(&self, path: &Path) -> Result<MediaKind, ProbeError> {
        Ok(classify_extension(path))
    }
}

pub fn classify_extension(path: &Path) -> MediaKind {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return MediaKind::Unknown;
    };
    let ext = ext.to_ascii_lowercase();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Video
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Audio
    } else {
        MediaKind::Unknown
    }
}

/// Parses ffprobe's bare `format=duration` value. Fractions are truncated.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs(secs.trunc() as u64))
}

/// The first stream descriptor line decides the kind.
pub fn classify_lines<I, S>(lines: I) -> MediaKind
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for line in lines {
        if let Some(caps) = STREAM_RE.captures(line.as_ref()) {
            return match &caps[1] {
                "Video" => MediaKind::Video,
                _ => MediaKind::Audio,
            };
        }
    }
    MediaKind::Unknown
}
