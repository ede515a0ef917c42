use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, FixedOffset};

use super::observer::UpgradeObserver;
use super::snapshot::UpgradeSnapshot;
use super::state::UpgradeState;
use crate::rate::DownloadRate;

/// State guarded by the tracker's lock. Observers live next to the
/// snapshot so that "mutate + notify" happens under a single acquisition.
struct Inner {
    snapshot: UpgradeSnapshot,
    observers: Vec<Box<dyn UpgradeObserver>>,
}

impl Inner {
    fn notify_observers(&mut self) {
        let Inner { snapshot, observers } = self;
        let snapshot: &UpgradeSnapshot = snapshot;
        observers.retain_mut(|observer| notify_observer(snapshot, observer.as_mut()));
    }
}

/// Deliver one update. Returns `false` if the observer panicked, in which
/// case it must be dropped from the registry.
fn notify_observer(snapshot: &UpgradeSnapshot, observer: &mut dyn UpgradeObserver) -> bool {
    let update = if snapshot.state == UpgradeState::Completed {
        None
    } else {
        Some(snapshot.clone())
    };

    match panic::catch_unwind(AssertUnwindSafe(|| observer.on_update(update))) {
        Ok(()) => true,
        Err(payload) => {
            log::error!(
                "[upgrade] {}: observer panicked during {}, removing it: {}",
                snapshot.target_version,
                snapshot.state,
                panic_message(&*payload)
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Tracks a single upgrade and broadcasts every change to its observers.
///
/// # Concurrency
///
/// Every operation takes one internal mutex for its whole duration,
/// including the observer loop, so each observer sees the updates in exactly
/// the order the mutations were serialized. Share the tracker with `Arc`.
///
/// Observers run under that mutex and must never call back into the same
/// tracker (see [`UpgradeObserver`]). An observer that panics is logged and
/// unregistered; the caller and the remaining observers are unaffected.
///
/// # Lifecycle
///
/// | Operation                 | Observers receive                         |
/// |---------------------------|-------------------------------------------|
/// | `register_observer`       | the new observer only, current snapshot   |
/// | `set_state(Completed)`    | `None` (stop tracking)                    |
/// | any other mutation        | `Some(snapshot)` copy                     |
pub struct UpgradeDetails {
    inner: Mutex<Inner>,
}

impl UpgradeDetails {
    pub fn new(
        target_version: impl Into<String>,
        initial_state: UpgradeState,
        action_id: impl Into<String>,
    ) -> Self {
        Self::from_snapshot(UpgradeSnapshot::new(target_version, initial_state, action_id))
    }

    /// Resume tracking from a previously stored snapshot. No observers are
    /// carried over.
    pub fn from_snapshot(snapshot: UpgradeSnapshot) -> Self {
        Self {
            inner: Mutex::new(Inner {
                snapshot,
                observers: Vec::new(),
            }),
        }
    }

    /// Observer panics are caught inside the lock, so poisoning needs a panic
    /// in the tracker itself; the snapshot is still whole in that case.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the state and notify all observers.
    ///
    /// Any state other than `Failed` clears `failed_state` and `error_msg`.
    /// Do not pass `Failed` here; call [`fail`](Self::fail) so the failure
    /// context is recorded.
    pub fn set_state(&self, state: UpgradeState) {
        let mut inner = self.lock();
        let previous = inner.snapshot.state;
        inner.snapshot.state = state;

        if state == UpgradeState::Failed {
            log::warn!(
                "[upgrade] {} set to {} without a cause; use fail() to record the error",
                inner.snapshot.target_version,
                state
            );
        } else {
            inner.snapshot.metadata.failed_state = None;
            inner.snapshot.metadata.error_msg.clear();
        }

        log::debug!(
            "[upgrade] {}: {} -> {}",
            inner.snapshot.target_version,
            previous,
            state
        );
        inner.notify_observers();
    }

    /// Record download progress. Values are stored as given; `percent`
    /// is not clamped and `rate_bytes_per_second` may be infinite.
    pub fn set_download_progress(&self, percent: f64, rate_bytes_per_second: f64) {
        let mut inner = self.lock();
        inner.snapshot.metadata.download_percent = percent;
        inner.snapshot.metadata.download_rate = DownloadRate::from(rate_bytes_per_second);
        inner.notify_observers();
    }

    pub fn set_scheduled_at(&self, at: DateTime<FixedOffset>) {
        let mut inner = self.lock();
        inner.snapshot.metadata.scheduled_at = Some(at);
        inner.notify_observers();
    }

    /// Move to `Failed`, remembering the phase that failed and the cause.
    ///
    /// Failing an already failed upgrade replaces the message but keeps the
    /// originally recorded `failed_state`.
    pub fn fail(&self, err: impl fmt::Display) {
        let mut inner = self.lock();
        let current = inner.snapshot.state;
        if current != UpgradeState::Failed {
            inner.snapshot.metadata.failed_state = Some(current);
        }

        inner.snapshot.metadata.error_msg = err.to_string();
        inner.snapshot.state = UpgradeState::Failed;

        log::warn!(
            "[upgrade] {} failed during {}: {}",
            inner.snapshot.target_version,
            inner
                .snapshot
                .metadata
                .failed_state
                .map_or("unknown state", UpgradeState::as_str),
            inner.snapshot.metadata.error_msg
        );
        inner.notify_observers();
    }

    /// Register an observer. It is called right away with the current
    /// snapshot, then after every subsequent mutation.
    pub fn register_observer(&self, observer: impl UpgradeObserver) {
        let mut observer: Box<dyn UpgradeObserver> = Box::new(observer);
        let mut inner = self.lock();
        if notify_observer(&inner.snapshot, observer.as_mut()) {
            inner.observers.push(observer);
        }
    }

    /// Copy of the current serializable fields.
    pub fn snapshot(&self) -> UpgradeSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn state(&self) -> UpgradeState {
        self.lock().snapshot.state
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    /// Equality over optional trackers: two absent trackers are equal, an
    /// absent and a present one never are.
    pub fn equals(a: Option<&UpgradeDetails>, b: Option<&UpgradeDetails>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for UpgradeDetails {
    /// Compares the serializable fields only; observer lists are ignored.
    fn eq(&self, other: &Self) -> bool {
        if ptr::eq(self, other) {
            return true;
        }
        // One lock at a time, so `a == b` racing `b == a` cannot deadlock.
        let mine = self.snapshot();
        let theirs = other.snapshot();
        mine == theirs
    }
}

impl fmt::Debug for UpgradeDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("UpgradeDetails")
            .field("snapshot", &inner.snapshot)
            .field("observers", &inner.observers.len())
            .finish()
    }
}
