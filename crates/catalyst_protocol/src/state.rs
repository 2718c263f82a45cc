//! Synchronization state reported by a node.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of the cluster synchronization loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SynchronizationState {
    /// First round after process start, not yet finished.
    Bootstrapping,
    /// A round is in progress.
    Syncing,
    /// The last round finished successfully.
    Synced,
    /// The last round failed.
    FailedToSync,
}

impl SynchronizationState {
    /// Returns the label used for metrics.
    pub fn as_metric_label(&self) -> &'static str {
        match self {
            SynchronizationState::Bootstrapping => "bootstrapping",
            SynchronizationState::Syncing => "syncing",
            SynchronizationState::Synced => "synced",
            SynchronizationState::FailedToSync => "failed_to_sync",
        }
    }

    /// Returns true while a round is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SynchronizationState::Syncing)
    }
}

impl Default for SynchronizationState {
    fn default() -> Self {
        SynchronizationState::Bootstrapping
    }
}

impl fmt::Display for SynchronizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_metric_label())
    }
}
