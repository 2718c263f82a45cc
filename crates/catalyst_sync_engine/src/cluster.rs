//! Peer registry.

use crate::client::ContentServerClient;
use crate::config::ClusterConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::PeerTransport;
use async_trait::async_trait;
use catalyst_protocol::ServerAddress;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Source of the cluster's peer addresses.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// Returns the addresses of every node in the cluster.
    async fn peer_addresses(&self) -> SyncResult<Vec<ServerAddress>>;
}

/// A peer directory backed by a fixed, replaceable list.
#[derive(Debug, Default)]
pub struct StaticPeerDirectory {
    addresses: RwLock<Vec<ServerAddress>>,
    unreachable: RwLock<bool>,
}

impl StaticPeerDirectory {
    /// Creates a directory listing `addresses`.
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ServerAddress>,
    {
        Self {
            addresses: RwLock::new(addresses.into_iter().map(Into::into).collect()),
            unreachable: RwLock::new(false),
        }
    }

    /// Replaces the listed addresses.
    pub fn set_addresses<I, S>(&self, addresses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<ServerAddress>,
    {
        *self.addresses.write() = addresses.into_iter().map(Into::into).collect();
    }

    /// Makes lookups fail, as if the directory could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.write() = unreachable;
    }
}

#[async_trait]
impl PeerDirectory for StaticPeerDirectory {
    async fn peer_addresses(&self) -> SyncResult<Vec<ServerAddress>> {
        if *self.unreachable.read() {
            return Err(SyncError::ClusterUnreachable("peer directory unavailable".into()));
        }
        Ok(self.addresses.read().clone())
    }
}

/// Health summary of the peer registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Whether `connect()` succeeded and `disconnect()` has not been called.
    pub connected: bool,
    /// Addresses of the known peers.
    pub peers: Vec<ServerAddress>,
    /// This node's own address, if configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub own_address: Option<ServerAddress>,
}

#[derive(Default)]
struct ClusterState {
    connected: bool,
    clients: BTreeMap<ServerAddress, Arc<ContentServerClient>>,
}

/// The set of peers this node synchronizes from.
pub struct ContentCluster {
    config: ClusterConfig,
    directory: Arc<dyn PeerDirectory>,
    transport: Arc<dyn PeerTransport>,
    state: RwLock<ClusterState>,
}

impl ContentCluster {
    /// Creates a disconnected cluster.
    pub fn new(
        config: ClusterConfig,
        directory: Arc<dyn PeerDirectory>,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        Self {
            config,
            directory,
            transport,
            state: RwLock::new(ClusterState::default()),
        }
    }

    /// Loads the peer set.
    ///
    /// Fails with [`SyncError::ClusterUnreachable`] when the directory cannot
    /// be read, unless this node is configured as the first of its cluster.
    pub async fn connect(&self) -> SyncResult<()> {
        match self.load_peers().await {
            Ok(()) => {}
            Err(e) if self.config.first_peer => {
                info!(error = %e, "no peers available, starting as first peer");
            }
            Err(e) => {
                return Err(match e {
                    SyncError::ClusterUnreachable(_) => e,
                    other => SyncError::ClusterUnreachable(other.to_string()),
                })
            }
        }
        self.state.write().connected = true;
        info!(peers = self.state.read().clients.len(), "connected to cluster");
        Ok(())
    }

    /// Re-reads the peer directory.
    ///
    /// Clients of peers still listed are kept. On error the previous set is
    /// left untouched. Once disconnected, the peer set stays empty.
    pub async fn refresh(&self) -> SyncResult<()> {
        if !self.is_connected() {
            debug!("not connected, peer set not refreshed");
            return Ok(());
        }
        self.load_peers().await
    }

    async fn load_peers(&self) -> SyncResult<()> {
        let addresses = self.directory.peer_addresses().await?;
        let own = self.config.own_address.as_deref().map(normalize);

        let mut state = self.state.write();
        let mut clients = BTreeMap::new();
        for address in addresses {
            if own.as_deref() == Some(normalize(&address).as_str()) {
                continue;
            }
            let client = state.clients.remove(&address).unwrap_or_else(|| {
                Arc::new(ContentServerClient::new(
                    address.clone(),
                    self.transport.clone(),
                    self.config.page_size,
                ))
            });
            clients.insert(address, client);
        }
        debug!(peers = clients.len(), "peer set refreshed");
        state.clients = clients;
        Ok(())
    }

    /// Releases every peer client. Calling it twice is a no-op.
    pub fn disconnect(&self) {
        let mut state = self.state.write();
        if state.connected || !state.clients.is_empty() {
            info!("disconnected from cluster");
        }
        state.connected = false;
        state.clients.clear();
    }

    /// Returns true between `connect()` and `disconnect()`.
    pub fn is_connected(&self) -> bool {
        self.state.read().connected
    }

    /// Snapshot of the current peer clients.
    pub fn get_all_servers_in_cluster(&self) -> Vec<Arc<ContentServerClient>> {
        self.state.read().clients.values().cloned().collect()
    }

    /// Health summary.
    pub fn get_status(&self) -> ClusterStatus {
        let state = self.state.read();
        ClusterStatus {
            connected: state.connected,
            peers: state.clients.keys().cloned().collect(),
            own_address: self.config.own_address.clone(),
        }
    }
}

fn normalize(address: &str) -> String {
    address.trim_end_matches('/').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    const SELF: &str = "https://self.example.com";

    fn cluster(config: ClusterConfig, directory: Arc<StaticPeerDirectory>) -> ContentCluster {
        ContentCluster::new(config, directory, Arc::new(MockTransport::new()))
    }

    #[tokio::test]
    async fn connect_excludes_own_address() {
        let directory = Arc::new(StaticPeerDirectory::new([
            "https://a.example.com",
            "https://SELF.example.com/",
            "https://b.example.com",
        ]));
        let cluster = cluster(ClusterConfig::new().with_own_address(SELF), directory);

        cluster.connect().await.unwrap();
        let status = cluster.get_status();
        assert!(status.connected);
        assert_eq!(status.peers, vec!["https://a.example.com", "https://b.example.com"]);
    }

    #[tokio::test]
    async fn connect_fails_when_unreachable() {
        let directory = Arc::new(StaticPeerDirectory::new(Vec::<String>::new()));
        directory.set_unreachable(true);
        let cluster = cluster(ClusterConfig::new(), directory);

        let result = cluster.connect().await;
        assert!(matches!(result, Err(SyncError::ClusterUnreachable(_))));
        assert!(!cluster.is_connected());
    }

    #[tokio::test]
    async fn first_peer_connects_without_directory() {
        let directory = Arc::new(StaticPeerDirectory::new(Vec::<String>::new()));
        directory.set_unreachable(true);
        let cluster = cluster(ClusterConfig::new().as_first_peer(), directory);

        cluster.connect().await.unwrap();
        assert!(cluster.is_connected());
        assert!(cluster.get_all_servers_in_cluster().is_empty());
    }

    #[tokio::test]
    async fn refresh_keeps_existing_clients() {
        let directory = Arc::new(StaticPeerDirectory::new(["https://a.example.com"]));
        let cluster = cluster(ClusterConfig::new(), directory.clone());
        cluster.connect().await.unwrap();
        let before = cluster.get_all_servers_in_cluster();

        directory.set_addresses(["https://a.example.com", "https://b.example.com"]);
        cluster.refresh().await.unwrap();
        let after = cluster.get_all_servers_in_cluster();

        assert_eq!(after.len(), 2);
        assert!(Arc::ptr_eq(&before[0], &after[0]));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_set() {
        let directory = Arc::new(StaticPeerDirectory::new(["https://a.example.com"]));
        let cluster = cluster(ClusterConfig::new(), directory.clone());
        cluster.connect().await.unwrap();

        directory.set_unreachable(true);
        assert!(cluster.refresh().await.is_err());
        assert_eq!(cluster.get_all_servers_in_cluster().len(), 1);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let directory = Arc::new(StaticPeerDirectory::new(["https://a.example.com"]));
        let cluster = cluster(ClusterConfig::new(), directory);
        cluster.connect().await.unwrap();

        cluster.disconnect();
        cluster.disconnect();
        assert!(!cluster.is_connected());
        assert!(cluster.get_all_servers_in_cluster().is_empty());
    }

    #[tokio::test]
    async fn refresh_after_disconnect_adds_no_peers() {
        let directory = Arc::new(StaticPeerDirectory::new(["https://a.example.com"]));
        let cluster = cluster(ClusterConfig::new(), directory.clone());
        cluster.connect().await.unwrap();
        cluster.disconnect();

        directory.set_addresses(["https://a.example.com", "https://b.example.com"]);
        cluster.refresh().await.unwrap();

        assert!(!cluster.is_connected());
        assert!(cluster.get_all_servers_in_cluster().is_empty());
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = ClusterStatus {
            connected: true,
            peers: vec!["https://a.example.com".into()],
            own_address: Some(SELF.into()),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["ownAddress"], SELF);
        assert_eq!(json["connected"], true);
    }
}
