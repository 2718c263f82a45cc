//! In-memory sync nodes wired to mock peers.

use catalyst_protocol::{DeploymentFiles, DeploymentWithAuditInfo, ServerAddress};
use catalyst_sync_engine::{
    ClusterConfig, ContentCluster, CounterMetrics, EventDeployer, JsonFilePropertiesStore,
    MemoryDeploymentApplier, MemoryPropertiesStore, MockTransport, StaticPeerDirectory,
    SynchronizationConfig, SynchronizationManager, SystemPropertiesManager, SystemPropertiesStore,
};
use catalyst_validation::{ServerEnvironment, Validator};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Mock peers shared by the nodes of a test.
#[derive(Debug, Clone, Default)]
pub struct TestPeers {
    transport: Arc<MockTransport>,
}

impl TestPeers {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// The transport nodes use to reach the peers.
    pub fn transport(&self) -> Arc<MockTransport> {
        self.transport.clone()
    }

    /// Makes `peer` report `deployment` and serve its files.
    pub fn publish(&self, peer: &str, (deployment, files): (DeploymentWithAuditInfo, DeploymentFiles)) {
        for (hash, bytes) in files {
            self.transport.add_content(peer, hash, bytes);
        }
        self.transport.add_deployment(peer, deployment);
    }
}

/// A JSON property file in a temporary directory.
pub struct TempProperties {
    dir: TempDir,
}

impl TempProperties {
    /// Creates the directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Path of the property file.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("system_properties.json")
    }

    /// Opens a store on the file; several stores may share it in sequence.
    pub fn store(&self) -> Arc<JsonFilePropertiesStore> {
        Arc::new(JsonFilePropertiesStore::new(self.path()))
    }
}

impl Default for TempProperties {
    fn default() -> Self {
        Self::new()
    }
}

/// A sync node and handles on its collaborators.
pub struct TestNode {
    /// The manager under test.
    pub manager: SynchronizationManager,
    /// The node's peer registry.
    pub cluster: Arc<ContentCluster>,
    /// The node's peer directory.
    pub directory: Arc<StaticPeerDirectory>,
    /// The node's storage.
    pub applier: Arc<MemoryDeploymentApplier>,
    /// Round metrics.
    pub metrics: Arc<CounterMetrics>,
    /// The node's property store.
    pub properties: SystemPropertiesManager,
}

/// Builds a [`TestNode`].
pub struct TestNodeBuilder {
    peers: TestPeers,
    addresses: Vec<ServerAddress>,
    config: SynchronizationConfig,
    cluster: ClusterConfig,
    env: ServerEnvironment,
    applier: Option<Arc<MemoryDeploymentApplier>>,
    store: Option<Arc<dyn SystemPropertiesStore>>,
}

impl TestNodeBuilder {
    /// A node that syncs from `addresses` through `peers`, with rounds
    /// every 20ms.
    pub fn new(peers: &TestPeers, addresses: &[&str]) -> Self {
        Self {
            peers: peers.clone(),
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
            config: SynchronizationConfig::new()
                .with_time_between_syncs(Duration::from_millis(20))
                .with_stop_poll_interval(Duration::from_millis(5)),
            cluster: ClusterConfig::new().with_page_size(2),
            env: ServerEnvironment::new(),
            applier: None,
            store: None,
        }
    }

    /// Overrides the sync configuration.
    pub fn config(mut self, config: SynchronizationConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the cluster configuration.
    pub fn cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = cluster;
        self
    }

    /// Overrides the validation environment.
    pub fn env(mut self, env: ServerEnvironment) -> Self {
        self.env = env;
        self
    }

    /// Reuses existing storage, as a restarted node would.
    pub fn applier(mut self, applier: Arc<MemoryDeploymentApplier>) -> Self {
        self.applier = Some(applier);
        self
    }

    /// Uses the given property store.
    pub fn store(mut self, store: Arc<dyn SystemPropertiesStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the node without starting it.
    pub fn build(self) -> TestNode {
        let directory = Arc::new(StaticPeerDirectory::new(self.addresses));
        let applier = self.applier.unwrap_or_default();
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryPropertiesStore::new()));
        let properties = SystemPropertiesManager::new(store);
        let metrics = Arc::new(CounterMetrics::new());

        let cluster = Arc::new(ContentCluster::new(
            self.cluster,
            directory.clone(),
            self.peers.transport(),
        ));
        let deployer = Arc::new(EventDeployer::new(
            Validator::new(self.env),
            applier.clone(),
            applier.clone(),
        ));
        let manager = SynchronizationManager::new(
            self.config,
            cluster.clone(),
            deployer,
            properties.clone(),
            metrics.clone(),
        );

        TestNode {
            manager,
            cluster,
            directory,
            applier,
            metrics,
            properties,
        }
    }
}

/// Polls `condition` every 10ms until it holds, panicking after `timeout`.
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within {timeout:?}");
}
