//! Simulated upgrade run. Drives an `UpgradeDetails` tracker through every
//! phase while a tokio task streams each snapshot to stdout.
//!
//! The driver runs on a blocking thread, the same way a real upgrade worker
//! would push state from outside the async runtime. The stream ends when the
//! tracker, and with it the channel observer, is dropped.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use upstat_core::details::{ChannelObserver, UpgradeDetails, UpgradeSnapshot, UpgradeState};

use crate::terminal_observer::TerminalObserver;
use crate::{render, CliError, Format};

/// Size of the pretend artifact.
const ARTIFACT_BYTES: f64 = 64.0 * 1024.0 * 1024.0;
const DOWNLOAD_STEPS: u32 = 10;

/// Phases after download, in the order an upgrade walks them.
const INSTALL_PHASES: [UpgradeState; 4] = [
    UpgradeState::Extracting,
    UpgradeState::Replacing,
    UpgradeState::Restarting,
    UpgradeState::Watching,
];

#[derive(Debug, Error)]
#[error("simulated failure while in {0}")]
struct SimulatedFailure(UpgradeState);

pub struct Plan {
    pub target_version: String,
    pub action_id: String,
    pub fail_at: Option<UpgradeState>,
    pub step: Duration,
    pub format: Format,
    pub show_bar: bool,
}

/// Whether `drive` ever enters `state`, i.e. whether `--fail-at` can fire.
fn is_driven(state: UpgradeState) -> bool {
    matches!(
        state,
        UpgradeState::Requested | UpgradeState::Scheduled | UpgradeState::Downloading
    ) || INSTALL_PHASES.contains(&state)
}

pub async fn run(plan: Plan) -> Result<UpgradeSnapshot, CliError> {
    if let Some(state) = plan.fail_at.filter(|s| !is_driven(*s)) {
        return Err(CliError::UnreachableFailPoint(state));
    }

    let details = Arc::new(UpgradeDetails::new(
        plan.target_version.clone(),
        UpgradeState::Requested,
        plan.action_id.clone(),
    ));

    if plan.show_bar {
        details.register_observer(TerminalObserver::new());
    }

    let (observer, mut rx) = ChannelObserver::new();
    details.register_observer(observer);

    let format = plan.format;
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            match update {
                Some(snapshot) => match render(&snapshot, format) {
                    Ok(text) => println!("{}", text.trim_end()),
                    Err(e) => log::error!("[simulate] could not render snapshot: {}", e),
                },
                None => log::info!("[simulate] upgrade completed, stream closed"),
            }
        }
    });

    let driver = Arc::clone(&details);
    let fail_at = plan.fail_at;
    let step = plan.step;
    tokio::task::spawn_blocking(move || drive(&driver, fail_at, step)).await?;

    let last = details.snapshot();
    // Dropping the tracker drops the channel observer, which ends the printer.
    drop(details);
    printer.await?;

    Ok(last)
}

/// Walk the tracker through a full upgrade, failing at `fail_at` if given.
fn drive(details: &UpgradeDetails, fail_at: Option<UpgradeState>, step: Duration) {
    let enter = |state: UpgradeState| -> bool {
        details.set_state(state);
        if fail_at == Some(state) {
            details.fail(SimulatedFailure(state));
            return false;
        }
        thread::sleep(step);
        true
    };

    if fail_at == Some(UpgradeState::Requested) {
        details.fail(SimulatedFailure(UpgradeState::Requested));
        return;
    }

    details.set_scheduled_at(Utc::now().into());
    if !enter(UpgradeState::Scheduled) || !enter(UpgradeState::Downloading) {
        return;
    }

    let step_secs = step.as_secs_f64();
    for done in 1..=DOWNLOAD_STEPS {
        let fraction = f64::from(done) / f64::from(DOWNLOAD_STEPS);
        // A zero step means the whole artifact "arrived" instantly: an
        // infinite rate.
        let elapsed = step_secs * f64::from(done);
        details.set_download_progress(fraction, ARTIFACT_BYTES * fraction / elapsed);
        thread::sleep(step);
    }

    for phase in INSTALL_PHASES {
        if !enter(phase) {
            return;
        }
    }

    details.set_state(UpgradeState::Completed);
}
