//! Sequential execution of a correspondence table.

use crate::ffmpeg::Muxer;
use crate::pairing::{CorrespondencePair, CorrespondenceTable};
use crate::probe::{MediaProbe, ProbeError};
use crate::report::{RunOutcome, StatusReport};
use crate::runner::{NeverRan, RunError, Runner, StreamEvent};
use regex::Regex;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use thiserror::Error;

static ELAPSED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time=(\d{2}):(\d{2}):(\d{2})").expect("elapsed time pattern is valid")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub verbose: bool,
    pub skip_on_failure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Completed,
    CompletedWithFailures,
    /// Stopped at the first failure; `processed` counts the failed pair.
    Aborted { processed: usize, total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub status: BatchStatus,
    pub outcomes: Vec<RunOutcome>,
}

impl ProcessResult {
    pub fn exit_code(&self) -> u8 {
        match self.status {
            BatchStatus::Completed => 0,
            BatchStatus::CompletedWithFailures | BatchStatus::Aborted { .. } => 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    NeverRan(#[from] NeverRan),
}

/// Hooks for whoever displays the batch. All methods default to no-ops.
pub trait BatchObserver {
    fn pair_started(&mut self, _index: usize, _total: usize, _pair: &CorrespondencePair) {}

    /// Completion percentage of the current pair, 0..=100. Verbose runs only.
    fn progress(&mut self, _percent: u8) {}

    fn pair_finished(&mut self, _outcome: &RunOutcome, _elapsed: Duration) {}
}

pub struct Orchestrator<'a> {
    muxer: &'a dyn Muxer,
    probe: &'a dyn MediaProbe,
    observer: &'a mut dyn BatchObserver,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        muxer: &'a dyn Muxer,
        probe: &'a dyn MediaProbe,
        observer: &'a mut dyn BatchObserver,
    ) -> Self {
        Self {
            muxer,
            probe,
            observer,
        }
    }

    /// Runs every pair in table order, recording each outcome in `report`
    /// as soon as it is known.
    pub fn execute(
        &mut self,
        table: &CorrespondenceTable,
        options: BatchOptions,
        report: &mut StatusReport,
    ) -> Result<ProcessResult, BatchError> {
        let total = table.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut any_failed = false;

        for (index, pair) in table.iter().enumerate() {
            self.observer.pair_started(index, total, pair);
            tracing::debug!(
                index = index + 1,
                total,
                video = %pair.video_path.display(),
                audio = %pair.audio_path.display(),
                "starting pair"
            );

            let started = Instant::now();
            let mut runner = Runner::new(self.muxer.invocation(pair));
            let return_code = if options.verbose {
                self.run_verbose(&mut runner, pair)?
            } else {
                runner.run_silent()?
            };
            let elapsed = started.elapsed();

            let outcome = report
                .add(&pair.video_path, &pair.audio_path, &pair.result_path, return_code)
                .clone();
            self.observer.pair_finished(&outcome, elapsed);
            outcomes.push(outcome);

            if return_code == 0 {
                tracing::info!(
                    result = %pair.result_path.display(),
                    elapsed = ?elapsed,
                    "pair {} of {total} done",
                    index + 1
                );
                continue;
            }

            tracing::error!(
                "An error occurred when adding {} to {} and writing to {}, returncode: {}",
                pair.audio_path.display(),
                pair.video_path.display(),
                pair.result_path.display(),
                return_code
            );
            if !options.skip_on_failure {
                return Ok(ProcessResult {
                    status: BatchStatus::Aborted {
                        processed: index + 1,
                        total,
                    },
                    outcomes,
                });
            }
            any_failed = true;
        }

        let status = if any_failed {
            BatchStatus::CompletedWithFailures
        } else {
            BatchStatus::Completed
        };
        Ok(ProcessResult { status, outcomes })
    }

    fn run_verbose(
        &mut self,
        runner: &mut Runner,
        pair: &CorrespondencePair,
    ) -> Result<i32, BatchError> {
        let total = self.probe.duration(&pair.video_path)?;
        for event in runner.run_verbose()? {
            match event? {
                StreamEvent::Line(line) => {
                    if let Some(percent) = progress_percent(&line, total) {
                        self.observer.progress(percent);
                    }
                }
                StreamEvent::Finished => {}
                StreamEvent::Failed(failure) => {
                    tracing::debug!(%failure, "mux command failed");
                }
            }
        }
        Ok(runner.exit_code()?)
    }
}

/// Percentage implied by an ffmpeg `time=HH:MM:SS` stats marker.
/// Lines without a marker, or a zero total, give `None`.
pub fn progress_percent(line: &str, total: Duration) -> Option<u8> {
    let caps = ELAPSED_RE.captures(line)?;
    let hours: u64 = caps[1].parse().ok()?;
    let minutes: u64 = caps[2].parse().ok()?;
    let seconds: u64 = caps[3].parse().ok()?;
    let elapsed = Duration::from_secs(hours * 3600 + minutes * 60 + seconds);

    if total.is_zero() {
        return None;
    }
    let percent = elapsed.as_secs_f64() / total.as_secs_f64() * 100.0;
    Some(percent.min(100.0) as u8)
}
