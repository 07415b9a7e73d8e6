mod batch;
mod cli;
mod ffmpeg;
mod pairing;
mod probe;
mod process;
mod progress;
mod report;
mod runner;
mod tui;

use crate::batch::{BatchOptions, BatchStatus, Orchestrator};
use crate::cli::{AppConfig, Cli};
use crate::ffmpeg::{FfmpegMuxer, resolve_tools};
use crate::pairing::Pairer;
use crate::probe::{ExtensionProbe, FfprobeProbe, MediaProbe};
use crate::progress::ProgressUi;
use crate::report::StatusReport;
use anyhow::{Result, bail};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sound_adder=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = cli.into_config()?;
    run(&cfg)
}

fn run(cfg: &AppConfig) -> Result<ExitCode> {
    let tools = resolve_tools(cfg.ffmpeg.clone(), cfg.ffprobe.clone())?;

    let probe: Box<dyn MediaProbe> = match &tools.ffprobe {
        Some(ffprobe) => Box::new(FfprobeProbe::new(ffprobe.clone())),
        None => {
            if cfg.tolerance.is_some() {
                bail!(
                    "ffprobe is required for the duration check \
                     (pass --no-duration-check to skip it)"
                );
            }
            if cfg.verbose {
                bail!("ffprobe is required for verbose progress");
            }
            tracing::warn!("ffprobe not found, classifying files by extension");
            Box::new(ExtensionProbe)
        }
    };

    tracing::info!("Scanning directories...");
    let table = Pairer::new(probe.as_ref()).build(
        &cfg.dir_videos,
        &cfg.dir_audios,
        &cfg.dir_results,
        cfg.tolerance,
    )?;
    tracing::info!(pairs = table.len(), "correspondence table built");

    tui::show_table(&table, &cfg.dir_results);
    if table.is_empty() {
        tracing::warn!("nothing to do");
        return Ok(ExitCode::SUCCESS);
    }
    if !cfg.assume_yes && !tui::confirm()? {
        tracing::info!("Cancellation of program");
        return Ok(ExitCode::SUCCESS);
    }

    let muxer = FfmpegMuxer::new(tools.ffmpeg.clone(), cfg.keep_original_audio);
    let mut ui = ProgressUi::new(cfg.verbose);
    let mut report = StatusReport::create(cfg.report.clone());
    let options = BatchOptions {
        verbose: cfg.verbose,
        skip_on_failure: cfg.skip,
    };

    let result =
        Orchestrator::new(&muxer, probe.as_ref(), &mut ui).execute(&table, options, &mut report)?;
    report.close()?;

    match result.status {
        BatchStatus::Completed => tracing::info!("all {} pairs processed", table.len()),
        BatchStatus::CompletedWithFailures => {
            let failed = result.outcomes.iter().filter(|o| !o.succeeded()).count();
            tracing::warn!("completed with failures: {failed} of {} pairs failed", table.len());
        }
        BatchStatus::Aborted { processed, total } => {
            tracing::error!("failed after {processed} of {total}");
        }
    }
    Ok(ExitCode::from(result.exit_code()))
}
