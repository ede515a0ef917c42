use indicatif::{ProgressBar, ProgressStyle};

use upstat_core::details::{UpgradeObserver, UpgradeSnapshot, UpgradeState};

const BAR_LENGTH: u64 = 1000;

/// Renders an upgrade as an `indicatif` bar on stderr.
///
/// The bar tracks `download_percent`; its message carries the current
/// state and rate. The bar is finished on completion and abandoned (left on
/// screen with the error) on failure.
pub struct TerminalObserver {
    bar: ProgressBar,
    finished: bool,
}

impl TerminalObserver {
    pub fn new() -> Self {
        let bar = ProgressBar::new(BAR_LENGTH);
        if let Ok(style) = ProgressStyle::with_template(
            "{prefix} [{wide_bar:.cyan/blue}] {percent:>3}% {msg}",
        ) {
            bar.set_style(style.progress_chars("█░"));
        }
        Self {
            bar,
            finished: false,
        }
    }

    fn show(&mut self, snapshot: &UpgradeSnapshot) {
        self.bar.set_prefix(format!("[{}]", snapshot.target_version));
        let percent = snapshot.metadata.download_percent.clamp(0.0, 1.0);
        self.bar.set_position((percent * BAR_LENGTH as f64).round() as u64);

        match snapshot.state {
            UpgradeState::Downloading => self.bar.set_message(format!(
                "{} {}",
                snapshot.state, snapshot.metadata.download_rate
            )),
            UpgradeState::Failed => {
                let failed_in = snapshot
                    .metadata
                    .failed_state
                    .map_or("unknown state", UpgradeState::as_str);
                self.bar.abandon_with_message(format!(
                    "Failed in {}: {}",
                    failed_in, snapshot.metadata.error_msg
                ));
                self.finished = true;
            }
            state => self.bar.set_message(state.to_string()),
        }
    }
}

impl Default for TerminalObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl UpgradeObserver for TerminalObserver {
    fn on_update(&mut self, update: Option<UpgradeSnapshot>) {
        if self.finished {
            return;
        }
        match update {
            Some(snapshot) => self.show(&snapshot),
            None => {
                self.bar.finish_with_message(UpgradeState::Completed.to_string());
                self.finished = true;
            }
        }
    }
}
