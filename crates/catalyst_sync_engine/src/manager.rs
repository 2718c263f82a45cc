//! Synchronization manager.
//!
//! Owns the state machine, the re-arming round timer and the watchdog.
//!
//! ```text
//! BOOTSTRAPPING ──first round──► SYNCED | FAILED_TO_SYNC
//!                                   ▲           │
//!                                   └─ SYNCING ◄┘  (every later round)
//! ```
//!
//! Only one round runs at a time; the next one is scheduled once the
//! current one has settled. A manager that was stopped can be started
//! again. The watchdog never exits the process itself:
//! it publishes a [`FatalSignal`] that the embedding binary acts on.

use crate::cluster::{ClusterStatus, ContentCluster};
use crate::config::SynchronizationConfig;
use crate::deployer::{DeployerReport, DeploymentSource, EventDeployer};
use crate::error::SyncResult;
use crate::metrics::MetricsSink;
use crate::watermarks::{SystemPropertiesManager, Watermarks};
use catalyst_protocol::{SynchronizationState, Timestamp};
use catalyst_validation::system_now;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tracing::{debug, error, info, warn};

/// Raised by the watchdog when a round has been stuck in `SYNCING` for
/// longer than the configured range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalSignal {
    /// Human-readable description.
    pub reason: String,
    /// Time of the last successful round, in milliseconds since the epoch.
    pub last_sync: Timestamp,
    /// Time spent since then.
    pub elapsed: Duration,
}

/// Health summary of the node's synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizationStatus {
    /// Peer registry status.
    pub cluster_status: ClusterStatus,
    /// Current state.
    pub synchronization_state: SynchronizationState,
    /// Time of the last successful round, in milliseconds since the epoch.
    pub last_sync_with_other_servers: Timestamp,
}

struct Inner {
    config: SynchronizationConfig,
    cluster: Arc<ContentCluster>,
    deployer: Arc<EventDeployer>,
    properties: SystemPropertiesManager,
    metrics: Arc<dyn MetricsSink>,
    state: RwLock<SynchronizationState>,
    bootstrapping: AtomicBool,
    round_in_progress: AtomicBool,
    stopping: AtomicBool,
    started: AtomicBool,
    /// Bumped by every `stop()`; loops spawned before it exit.
    generation: AtomicU64,
    time_of_last_sync: AtomicU64,
    watermarks: Mutex<Watermarks>,
    wake: Arc<Notify>,
    fatal: watch::Sender<Option<FatalSignal>>,
}

/// Keeps this node's content in sync with the rest of the cluster.
#[derive(Clone)]
pub struct SynchronizationManager {
    inner: Arc<Inner>,
}

impl SynchronizationManager {
    /// Creates a manager in the `BOOTSTRAPPING` state.
    pub fn new(
        config: SynchronizationConfig,
        cluster: Arc<ContentCluster>,
        deployer: Arc<EventDeployer>,
        properties: SystemPropertiesManager,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let (fatal, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                config,
                cluster,
                deployer,
                properties,
                metrics,
                state: RwLock::new(SynchronizationState::Bootstrapping),
                bootstrapping: AtomicBool::new(true),
                round_in_progress: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                started: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                time_of_last_sync: AtomicU64::new(0),
                watermarks: Mutex::new(Watermarks::new()),
                wake: Arc::new(Notify::new()),
                fatal,
            }),
        }
    }

    /// Connects to the cluster, loads the watermarks, starts the watchdog
    /// and runs the first (bootstrap) round before returning.
    ///
    /// Later rounds run in the background until [`stop`](Self::stop).
    /// Does nothing when synchronization is disabled or already started.
    pub async fn start(&self) -> SyncResult<()> {
        let inner = &self.inner;
        if inner.config.disable_synchronization {
            warn!("cluster synchronization is disabled");
            return Ok(());
        }
        if inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.load().await {
            inner.started.store(false, Ordering::SeqCst);
            return Err(e);
        }
        info!("starting cluster synchronization");

        let generation = inner.generation.load(Ordering::SeqCst);
        tokio::spawn(watchdog(
            Arc::downgrade(inner),
            generation,
            inner.config.watchdog_grace,
            inner.config.watchdog_interval,
        ));

        inner.sync_round(generation).await;

        tokio::spawn(sync_loop(
            Arc::downgrade(inner),
            generation,
            inner.wake.clone(),
            inner.config.time_between_syncs,
        ));
        Ok(())
    }

    async fn load(&self) -> SyncResult<()> {
        self.inner.cluster.connect().await?;
        let watermarks = self.inner.properties.get_last_known_local_deployments().await?;
        debug!(peers = watermarks.len(), "watermarks loaded");
        *self.inner.watermarks.lock().await = watermarks;
        self.inner.time_of_last_sync.store(system_now(), Ordering::SeqCst);
        Ok(())
    }

    /// Prevents further rounds, waits for the one in flight and disconnects
    /// from the cluster.
    ///
    /// Afterwards [`start`](Self::start) reconnects and resumes from the
    /// watermarks persisted so far.
    pub async fn stop(&self) {
        let inner = &self.inner;
        inner.stopping.store(true, Ordering::SeqCst);
        inner.generation.fetch_add(1, Ordering::SeqCst);
        inner.wake.notify_one();

        while inner.round_in_progress.load(Ordering::SeqCst) {
            tokio::time::sleep(inner.config.stop_poll_interval).await;
        }
        inner.cluster.disconnect();
        inner.stopping.store(false, Ordering::SeqCst);
        inner.started.store(false, Ordering::SeqCst);
        info!("cluster synchronization stopped");
    }

    /// Current state.
    pub fn state(&self) -> SynchronizationState {
        *self.inner.state.read()
    }

    /// Time of the last successful round, in milliseconds since the epoch.
    pub fn time_of_last_sync(&self) -> Timestamp {
        self.inner.time_of_last_sync.load(Ordering::SeqCst)
    }

    /// Current watermarks.
    pub async fn watermarks(&self) -> Watermarks {
        self.inner.watermarks.lock().await.clone()
    }

    /// Health summary.
    pub fn get_status(&self) -> SynchronizationStatus {
        SynchronizationStatus {
            cluster_status: self.inner.cluster.get_status(),
            synchronization_state: self.state(),
            last_sync_with_other_servers: self.time_of_last_sync(),
        }
    }

    /// Subscribes to the watchdog's fatal signal.
    pub fn subscribe(&self) -> watch::Receiver<Option<FatalSignal>> {
        self.inner.fatal.subscribe()
    }

    /// Resolves once the watchdog has raised a fatal signal.
    pub async fn wait_for_fatal(&self) -> Option<FatalSignal> {
        let mut receiver = self.subscribe();
        let signal = receiver.wait_for(Option::is_some).await.ok()?;
        (*signal).clone()
    }
}

impl Inner {
    fn set_state(&self, state: SynchronizationState) {
        *self.state.write() = state;
    }

    fn is_current(&self, generation: u64) -> bool {
        !self.stopping.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Claims the round slot. Fails if a round is running or `stop()` has
    /// begun since `generation` was read.
    fn begin_round(&self, generation: u64) -> bool {
        if self
            .round_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        if !self.is_current(generation) {
            self.round_in_progress.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    async fn sync_round(&self, generation: u64) {
        if !self.begin_round(generation) {
            debug!("sync round skipped");
            return;
        }
        let bootstrap = self.bootstrapping.load(Ordering::SeqCst);
        if !bootstrap {
            self.set_state(SynchronizationState::Syncing);
            self.metrics.observe_state(SynchronizationState::Syncing);
        }
        debug!(bootstrap, "sync round started");

        let state = match self.run_round(bootstrap).await {
            Ok(report) if report.is_success() => {
                self.time_of_last_sync.store(system_now(), Ordering::SeqCst);
                debug!(applied = report.applied, "sync round finished");
                SynchronizationState::Synced
            }
            Ok(report) => {
                warn!(failed_peers = ?report.failed_peers, "sync round finished with failures");
                SynchronizationState::FailedToSync
            }
            Err(e) => {
                error!(error = %e, "sync round failed");
                SynchronizationState::FailedToSync
            }
        };

        self.set_state(state);
        self.metrics.observe_state(state);
        self.bootstrapping.store(false, Ordering::SeqCst);
        self.round_in_progress.store(false, Ordering::SeqCst);
    }

    async fn run_round(&self, bootstrap: bool) -> SyncResult<DeployerReport> {
        if let Err(e) = self.cluster.refresh().await {
            warn!(error = %e, "could not refresh the peer set, keeping the previous one");
        }
        let clients = self.cluster.get_all_servers_in_cluster();

        let mut watermarks = self.watermarks.lock().await;
        let sources = clients
            .iter()
            .map(|client| {
                let since = watermarks.get(client.address()).copied().unwrap_or(0);
                DeploymentSource::new(client, since)
            })
            .collect();
        let report = self.deployer.process_all_deployments(sources, bootstrap).await?;

        for client in &clients {
            let reached = client.all_deployments_were_successful();
            let watermark = watermarks.entry(client.address().to_string()).or_insert(0);
            *watermark = (*watermark).max(reached);
        }
        self.properties.set_last_known_local_deployments(&watermarks).await?;
        Ok(report)
    }
}

async fn sync_loop(inner: Weak<Inner>, generation: u64, wake: Arc<Notify>, delay: Duration) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wake.notified() => {}
        }
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if !inner.is_current(generation) {
            return;
        }
        inner.sync_round(generation).await;
    }
}

async fn watchdog(inner: Weak<Inner>, generation: u64, grace: Duration, interval: Duration) {
    tokio::time::sleep(grace).await;
    loop {
        let Some(manager) = inner.upgrade() else {
            return;
        };
        if !manager.is_current(generation) {
            return;
        }
        if *manager.state.read() == SynchronizationState::Syncing {
            let last_sync = manager.time_of_last_sync.load(Ordering::SeqCst);
            let elapsed = Duration::from_millis(system_now().saturating_sub(last_sync));
            if elapsed > manager.config.check_sync_range {
                error!(?elapsed, last_sync, "synchronization is stuck");
                manager.fatal.send_replace(Some(FatalSignal {
                    reason: format!("no successful sync for {}s while syncing", elapsed.as_secs()),
                    last_sync,
                    elapsed,
                }));
                return;
            }
        }
        drop(manager);
        tokio::time::sleep(interval).await;
    }
}
