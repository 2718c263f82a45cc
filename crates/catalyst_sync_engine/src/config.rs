//! Configuration for the sync engine.

use catalyst_protocol::ServerAddress;
use std::time::Duration;

/// Configuration for the synchronization loop and its watchdog.
#[derive(Debug, Clone)]
pub struct SynchronizationConfig {
    /// Delay between the end of one round and the start of the next.
    pub time_between_syncs: Duration,
    /// Skip synchronization entirely.
    pub disable_synchronization: bool,
    /// Time in `SYNCING` without a successful round after which the node is
    /// considered wedged.
    pub check_sync_range: Duration,
    /// Delay before the watchdog's first check.
    pub watchdog_grace: Duration,
    /// Delay between watchdog checks.
    pub watchdog_interval: Duration,
    /// Polling interval used by `stop()` while a round is in flight.
    pub stop_poll_interval: Duration,
}

impl SynchronizationConfig {
    /// Creates a configuration with the default timings.
    pub fn new() -> Self {
        Self {
            time_between_syncs: Duration::from_secs(20),
            disable_synchronization: false,
            check_sync_range: Duration::from_secs(20 * 60),
            watchdog_grace: Duration::from_secs(30 * 60),
            watchdog_interval: Duration::from_secs(5 * 60),
            stop_poll_interval: Duration::from_secs(1),
        }
    }

    /// Sets the delay between rounds.
    pub fn with_time_between_syncs(mut self, delay: Duration) -> Self {
        self.time_between_syncs = delay;
        self
    }

    /// Disables synchronization.
    pub fn disabled(mut self) -> Self {
        self.disable_synchronization = true;
        self
    }

    /// Sets the wedge threshold.
    pub fn with_check_sync_range(mut self, range: Duration) -> Self {
        self.check_sync_range = range;
        self
    }

    /// Sets the watchdog grace period and check interval.
    pub fn with_watchdog(mut self, grace: Duration, interval: Duration) -> Self {
        self.watchdog_grace = grace;
        self.watchdog_interval = interval;
        self
    }

    /// Sets the polling interval used by `stop()`.
    pub fn with_stop_poll_interval(mut self, interval: Duration) -> Self {
        self.stop_poll_interval = interval;
        self
    }
}

impl Default for SynchronizationConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the peer registry.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// This node's own address, excluded from the peer set.
    pub own_address: Option<ServerAddress>,
    /// The first node of a cluster may start without reachable peers.
    pub first_peer: bool,
    /// Deployments requested per page.
    pub page_size: u32,
}

impl ClusterConfig {
    /// Creates a configuration with the default page size.
    pub fn new() -> Self {
        Self {
            own_address: None,
            first_peer: false,
            page_size: 500,
        }
    }

    /// Sets this node's own address.
    pub fn with_own_address(mut self, address: impl Into<ServerAddress>) -> Self {
        self.own_address = Some(address.into());
        self
    }

    /// Marks this node as the first of its cluster.
    pub fn as_first_peer(mut self) -> Self {
        self.first_peer = true;
        self
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synchronization_config_defaults() {
        let config = SynchronizationConfig::default();
        assert_eq!(config.time_between_syncs, Duration::from_secs(20));
        assert_eq!(config.check_sync_range, Duration::from_secs(1200));
        assert_eq!(config.watchdog_grace, Duration::from_secs(1800));
        assert_eq!(config.watchdog_interval, Duration::from_secs(300));
        assert!(!config.disable_synchronization);
    }

    #[test]
    fn synchronization_config_builder() {
        let config = SynchronizationConfig::new()
            .with_time_between_syncs(Duration::from_millis(10))
            .with_watchdog(Duration::ZERO, Duration::from_millis(5))
            .disabled();

        assert_eq!(config.time_between_syncs, Duration::from_millis(10));
        assert_eq!(config.watchdog_interval, Duration::from_millis(5));
        assert!(config.disable_synchronization);
    }

    #[test]
    fn cluster_config_builder() {
        let config = ClusterConfig::new()
            .with_own_address("https://self.example.com")
            .as_first_peer()
            .with_page_size(0);

        assert_eq!(config.own_address.as_deref(), Some("https://self.example.com"));
        assert!(config.first_peer);
        assert_eq!(config.page_size, 1);
    }
}
