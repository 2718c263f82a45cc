//! Round metrics.

use catalyst_protocol::SynchronizationState;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives one observation per sync round.
pub trait MetricsSink: Send + Sync {
    /// Records the state a round started or ended in.
    fn observe_state(&self, state: SynchronizationState);
}

/// Discards every observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn observe_state(&self, _state: SynchronizationState) {}
}

/// Counts observations per state, as a `dcl_sync_state_summary` exporter
/// would.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    bootstrapping: AtomicU64,
    syncing: AtomicU64,
    synced: AtomicU64,
    failed_to_sync: AtomicU64,
}

impl CounterMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observations recorded for `state`.
    pub fn count(&self, state: SynchronizationState) -> u64 {
        self.counter(state).load(Ordering::Relaxed)
    }

    /// `(label, count)` pairs for every state.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        [
            SynchronizationState::Bootstrapping,
            SynchronizationState::Syncing,
            SynchronizationState::Synced,
            SynchronizationState::FailedToSync,
        ]
        .into_iter()
        .map(|state| (state.as_metric_label(), self.count(state)))
        .collect()
    }

    fn counter(&self, state: SynchronizationState) -> &AtomicU64 {
        match state {
            SynchronizationState::Bootstrapping => &self.bootstrapping,
            SynchronizationState::Syncing => &self.syncing,
            SynchronizationState::Synced => &self.synced,
            SynchronizationState::FailedToSync => &self.failed_to_sync,
        }
    }
}

impl MetricsSink for CounterMetrics {
    fn observe_state(&self, state: SynchronizationState) {
        self.counter(state).fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_per_state() {
        let metrics = CounterMetrics::new();
        metrics.observe_state(SynchronizationState::Syncing);
        metrics.observe_state(SynchronizationState::Syncing);
        metrics.observe_state(SynchronizationState::Synced);

        assert_eq!(metrics.count(SynchronizationState::Syncing), 2);
        assert_eq!(metrics.count(SynchronizationState::FailedToSync), 0);
        assert!(metrics.snapshot().contains(&("synced", 1)));
    }
}
