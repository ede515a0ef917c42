use super::snapshot::UpgradeSnapshot;

/// Anything that wants to follow an upgrade.
///
/// `UpgradeDetails` calls `on_update` on every registered observer after
/// each mutation, and once at registration time.
///
/// Lifecycle:
/// - `Some(snapshot)` carries an owned copy of the current fields; the
///   observer may keep it.
/// - `None` means the upgrade reached `UPG_COMPLETED` and there is nothing
///   left to track.
///
/// Observers run while the tracker's lock is held. An observer must not call
/// back into the tracker that invokes it; doing so deadlocks. Hand the
/// snapshot to another thread or task (see `ChannelObserver`) when follow-up
/// work needs the tracker.
///
/// A panic inside `on_update` is caught by the tracker, which logs it and
/// unregisters the observer. It receives no further updates.
pub trait UpgradeObserver: Send + 'static {
    fn on_update(&mut self, update: Option<UpgradeSnapshot>);
}

impl<F> UpgradeObserver for F
where
    F: FnMut(Option<UpgradeSnapshot>) + Send + 'static,
{
    fn on_update(&mut self, update: Option<UpgradeSnapshot>) {
        self(update)
    }
}
