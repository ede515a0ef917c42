use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::UpgradeState;
use crate::rate::DownloadRate;

#[derive(Debug, Error)]
pub enum SnapshotFormatError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Auxiliary fields of an upgrade. Zero values mean "unused" and are left
/// out of the serialized form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<FixedOffset>>,

    /// Fraction of the artifact downloaded, nominally in `[0, 1]`.
    #[serde(skip_serializing_if = "is_zero")]
    pub download_percent: f64,

    #[serde(skip_serializing_if = "DownloadRate::is_zero")]
    pub download_rate: DownloadRate,

    /// Phase the upgrade was in when it failed. Only set while the state is
    /// `Failed`; use `UpgradeDetails::fail` to record it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_state: Option<UpgradeState>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_msg: String,
}

/// Point-in-time copy of an upgrade's serializable fields.
///
/// `PartialEq` compares `scheduled_at` as an instant, so the same moment
/// written with different UTC offsets is equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeSnapshot {
    pub target_version: String,
    pub state: UpgradeState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action_id: String,
    #[serde(default)]
    pub metadata: UpgradeMetadata,
}

impl UpgradeSnapshot {
    pub fn new(
        target_version: impl Into<String>,
        state: UpgradeState,
        action_id: impl Into<String>,
    ) -> Self {
        Self {
            target_version: target_version.into(),
            state,
            action_id: action_id.into(),
            metadata: UpgradeMetadata::default(),
        }
    }

    pub fn to_json(&self) -> Result<String, SnapshotFormatError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, SnapshotFormatError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, SnapshotFormatError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_yaml(&self) -> Result<String, SnapshotFormatError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(text: &str) -> Result<Self, SnapshotFormatError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

fn is_zero(value: &f64) -> bool {
    *value == 0.0
}
