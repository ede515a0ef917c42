use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phase of an upgrade, serialized by its `UPG_*` wire name.
///
/// `Completed` and `Failed` are terminal. `Failed` can be entered from any
/// phase; `Completed` is expected to follow `Watching`. Neither rule is
/// enforced here; the tracker records whatever its driver asserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpgradeState {
    #[serde(rename = "UPG_NOT_STARTED")]
    NotStarted,
    #[serde(rename = "UPG_REQUESTED")]
    Requested,
    #[serde(rename = "UPG_SCHEDULED")]
    Scheduled,
    #[serde(rename = "UPG_DOWNLOADING")]
    Downloading,
    #[serde(rename = "UPG_EXTRACTING")]
    Extracting,
    #[serde(rename = "UPG_REPLACING")]
    Replacing,
    #[serde(rename = "UPG_RESTARTING")]
    Restarting,
    #[serde(rename = "UPG_WATCHING")]
    Watching,
    #[serde(rename = "UPG_ROLLBACK")]
    Rollback,
    #[serde(rename = "UPG_COMPLETED")]
    Completed,
    #[serde(rename = "UPG_FAILED")]
    Failed,
}

impl UpgradeState {
    pub const ALL: [UpgradeState; 11] = [
        UpgradeState::NotStarted,
        UpgradeState::Requested,
        UpgradeState::Scheduled,
        UpgradeState::Downloading,
        UpgradeState::Extracting,
        UpgradeState::Replacing,
        UpgradeState::Restarting,
        UpgradeState::Watching,
        UpgradeState::Rollback,
        UpgradeState::Completed,
        UpgradeState::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UpgradeState::NotStarted => "UPG_NOT_STARTED",
            UpgradeState::Requested => "UPG_REQUESTED",
            UpgradeState::Scheduled => "UPG_SCHEDULED",
            UpgradeState::Downloading => "UPG_DOWNLOADING",
            UpgradeState::Extracting => "UPG_EXTRACTING",
            UpgradeState::Replacing => "UPG_REPLACING",
            UpgradeState::Restarting => "UPG_RESTARTING",
            UpgradeState::Watching => "UPG_WATCHING",
            UpgradeState::Rollback => "UPG_ROLLBACK",
            UpgradeState::Completed => "UPG_COMPLETED",
            UpgradeState::Failed => "UPG_FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UpgradeState::Completed | UpgradeState::Failed)
    }
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown upgrade state {0:?}")]
pub struct UnknownStateError(pub String);

impl FromStr for UpgradeState {
    type Err = UnknownStateError;

    /// Accepts the wire name (`UPG_DOWNLOADING`) or the bare phase
    /// (`downloading`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        let wanted = wanted.strip_prefix("UPG_").unwrap_or(&wanted);
        UpgradeState::ALL
            .into_iter()
            .find(|state| &state.as_str()["UPG_".len()..] == wanted)
            .ok_or_else(|| UnknownStateError(s.to_string()))
    }
}
