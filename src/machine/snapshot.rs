//! Serializable snapshots of a running machine.
//!
//! Snapshots are read-only views for diagnostics and report generators.
//! They carry no actions and cannot restart a machine.

use crate::core::{EventKind, State, TransitionHistory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version identifier for the snapshot format
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors that can occur while exporting or reading snapshots
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Unsupported snapshot version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Configuration and recent history of a machine at one point in time.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Snapshot<S: State, E: EventKind> {
    /// Snapshot format version
    pub version: u32,

    /// Unique snapshot identifier
    pub id: String,

    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,

    /// Root of the machine's state tree
    pub root: S,

    /// Active leaf states
    pub active: Vec<S>,

    /// Most recent transitions, oldest first
    pub history: TransitionHistory<S, E>,
}

impl<S: State, E: EventKind> Snapshot<S, E> {
    pub(crate) fn new(root: S, active: Vec<S>, history: TransitionHistory<S, E>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            taken_at: Utc::now(),
            root,
            active,
            history,
        }
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SnapshotError::SerializationFailed(e.to_string()))
    }

    /// Read a snapshot previously exported with [`to_json`](Self::to_json).
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json)
            .map_err(|e| SnapshotError::DeserializationFailed(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }
}
