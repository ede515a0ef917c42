use tokio::sync::{mpsc, watch};

use super::observer::UpgradeObserver;
use super::snapshot::UpgradeSnapshot;

/// Forwards every update into an unbounded `mpsc` channel.
///
/// Sending never blocks, so it is safe to call under the tracker's lock, and
/// the receiver sees every update in order. The receiver side is where a
/// remote status stream (RPC, SSE, …) attaches. The channel closes once the
/// tracker holding this observer is dropped.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<Option<UpgradeSnapshot>>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Option<UpgradeSnapshot>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl UpgradeObserver for ChannelObserver {
    fn on_update(&mut self, update: Option<UpgradeSnapshot>) {
        if self.tx.send(update).is_err() {
            log::debug!("[ChannelObserver] receiver dropped, update discarded");
        }
    }
}

/// Publishes the latest update to a `watch` channel.
///
/// Intermediate values can be skipped by slow readers; use this for status
/// endpoints that only ever report the current state and
/// [`ChannelObserver`] when every transition matters.
pub struct WatchObserver {
    tx: watch::Sender<Option<UpgradeSnapshot>>,
}

impl WatchObserver {
    /// Creates the observer and a receiver that can be cloned and handed to
    /// any number of reader tasks.
    pub fn new(initial: Option<UpgradeSnapshot>) -> (Self, watch::Receiver<Option<UpgradeSnapshot>>) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx }, rx)
    }
}

impl UpgradeObserver for WatchObserver {
    fn on_update(&mut self, update: Option<UpgradeSnapshot>) {
        // send_replace keeps the value current even while no receiver exists.
        self.tx.send_replace(update);
    }
}
