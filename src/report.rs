//! JSON status report of a batch.
//!
//! The report is append-only while the batch runs and is written exactly
//! once: on [`StatusReport::close`], or on drop if close was never reached.
//! Without a destination nothing touches the filesystem.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result of muxing one pair. `return_code` 0 is success.
///
/// Paths are kept as lossy UTF-8 so any file name can be reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub video_path: String,
    pub audio_path: String,
    pub result_path: String,
    pub return_code: i32,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.return_code == 0
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot write report {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize report {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug)]
pub struct StatusReport {
    destination: Option<PathBuf>,
    outcomes: Vec<RunOutcome>,
    flushed: bool,
}

impl StatusReport {
    pub fn create(destination: Option<PathBuf>) -> Self {
        Self {
            destination,
            outcomes: Vec::new(),
            flushed: false,
        }
    }

    /// Appends one outcome and returns it.
    pub fn add(
        &mut self,
        video_path: &Path,
        audio_path: &Path,
        result_path: &Path,
        return_code: i32,
    ) -> &RunOutcome {
        self.outcomes.push(RunOutcome {
            video_path: video_path.to_string_lossy().into_owned(),
            audio_path: audio_path.to_string_lossy().into_owned(),
            result_path: result_path.to_string_lossy().into_owned(),
            return_code,
        });
        &self.outcomes[self.outcomes.len() - 1]
    }

    pub fn outcomes(&self) -> &[RunOutcome] {
        &self.outcomes
    }

    /// Writes the report, replacing any existing file at the destination.
    pub fn close(mut self) -> Result<(), ReportError> {
        self.flush()
    }

    fn flush(&mut self) -> Result<(), ReportError> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        let Some(path) = &self.destination else {
            return Ok(());
        };

        // Serialize fully before touching the destination so a failure
        // never leaves it truncated.
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.outcomes
            .serialize(&mut ser)
            .map_err(|source| ReportError::Serialize {
                path: path.clone(),
                source,
            })?;
        buf.push(b'\n');
        fs::write(path, &buf).map_err(|source| ReportError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), entries = self.outcomes.len(), "report written");
        Ok(())
    }
}

impl Drop for StatusReport {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            tracing::error!(error = %err, "failed to write report");
        }
    }
}
