//! # Catalyst Sync Engine
//!
//! Keeps a content node in sync with the other nodes of its cluster.
//!
//! This crate provides:
//! - Peer registry and per-peer clients with lazy, paginated streams
//! - Transport abstraction (HTTP, in-memory)
//! - Per-peer watermarks persisted in a system-properties store
//! - An event deployer that validates and applies synced deployments
//! - The synchronization state machine, its round timer and watchdog
//!
//! ## Architecture
//!
//! Each round the [`SynchronizationManager`]:
//! 1. Refreshes the peer set of the [`ContentCluster`]
//! 2. Opens one stream per peer, starting after that peer's watermark
//! 3. Lets the [`EventDeployer`] validate and apply every deployment
//! 4. Advances and persists the watermarks
//!
//! ## Key Invariants
//!
//! - One round at a time; the next is scheduled after the current settles
//! - A peer's watermark only moves forward, and only after a round in
//!   which every deployment from that peer was processed
//! - Applying a known entity again is a no-op
//! - The first round after start runs in bootstrap mode

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod cluster;
mod config;
mod deployer;
mod error;
mod http;
mod manager;
mod metrics;
mod transport;
mod watermarks;

pub use client::ContentServerClient;
pub use cluster::{ClusterStatus, ContentCluster, PeerDirectory, StaticPeerDirectory};
pub use config::{ClusterConfig, SynchronizationConfig};
pub use deployer::{
    DeployerReport, DeploymentApplier, DeploymentSource, EventDeployer, MemoryDeploymentApplier,
};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use manager::{FatalSignal, SynchronizationManager, SynchronizationStatus};
pub use metrics::{CounterMetrics, MetricsSink, NoopMetrics};
pub use transport::{MockTransport, PeerFault, PeerTransport};
pub use watermarks::{
    JsonFilePropertiesStore, MemoryPropertiesStore, SystemPropertiesManager, SystemPropertiesStore,
    Watermarks, LAST_KNOWN_LOCAL_DEPLOYMENTS,
};
