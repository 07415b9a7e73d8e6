use crate::batch::BatchObserver;
use crate::pairing::CorrespondencePair;
use crate::report::RunOutcome;
use crate::tui::file_name;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal progress for a batch: a percentage bar per pair in verbose mode,
/// a spinner naming the current pair otherwise.
pub struct ProgressUi {
    verbose: bool,
    current: Option<ProgressBar>,
}

impl ProgressUi {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            current: None,
        }
    }

    fn bar() -> ProgressBar {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}]  [{bar:60.cyan/bright-black}] {percent:>3}%  ETA:{eta_precise}",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar
    }

    fn spinner(message: String) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.enable_steady_tick(Duration::from_millis(80));
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style.tick_strings(&["-", "\\", "|", "/", "+"]));
        }
        spinner.set_message(message);
        spinner
    }
}

impl BatchObserver for ProgressUi {
    fn pair_started(&mut self, index: usize, total: usize, pair: &CorrespondencePair) {
        let title = format!(
            "{}: {} + {}",
            index + 1,
            file_name(&pair.video_path),
            file_name(&pair.audio_path)
        );
        let bar = if self.verbose {
            println!("{title}");
            Self::bar()
        } else {
            Self::spinner(format!("[{}/{total}] {title}", index + 1))
        };
        self.current = Some(bar);
    }

    fn progress(&mut self, percent: u8) {
        if let Some(bar) = &self.current {
            bar.set_position(u64::from(percent));
        }
    }

    fn pair_finished(&mut self, outcome: &RunOutcome, elapsed: Duration) {
        let Some(bar) = self.current.take() else {
            return;
        };
        if outcome.succeeded() {
            if self.verbose {
                bar.set_position(100);
            }
            bar.finish_with_message(format!("Done in {}s", elapsed.as_secs()));
        } else {
            bar.abandon_with_message(format!("Failed with code {}", outcome.return_code));
        }
    }
}
