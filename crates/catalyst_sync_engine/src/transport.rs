//! Transport layer abstraction for talking to peers.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use bytes::Bytes;
use catalyst_protocol::{
    ContentHash, DeploymentWithAuditInfo, DeploymentsPage, DeploymentsRequest, ServerAddress,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

/// A peer transport fetches deployment pages and content files from peers.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-memory for testing, etc.).
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Fetches one page of a peer's deployments.
    async fn fetch_deployments(
        &self,
        peer: &str,
        request: &DeploymentsRequest,
    ) -> SyncResult<DeploymentsPage>;

    /// Downloads a content file from a peer.
    async fn fetch_content(&self, peer: &str, hash: &str) -> SyncResult<Bytes>;
}

/// How a mock peer misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerFault {
    /// Answers normally.
    #[default]
    None,
    /// Every request fails with a retryable transport error.
    Unreachable,
    /// The first page is served, later pages fail.
    FailAfterFirstPage,
    /// Requests never complete.
    Hang,
    /// Requests complete after a delay.
    Slow(Duration),
    /// Deployment pages are served, content downloads fail with a retryable
    /// transport error.
    ContentUnavailable,
}

#[derive(Debug, Default)]
struct MockPeer {
    deployments: Vec<DeploymentWithAuditInfo>,
    content: HashMap<ContentHash, Bytes>,
    fault: PeerFault,
    requests: Vec<DeploymentsRequest>,
}

/// An in-memory transport for testing.
///
/// Each peer serves its deployments through
/// [`DeploymentsRequest::paginate`], like a real node would.
#[derive(Debug, Default)]
pub struct MockTransport {
    peers: RwLock<HashMap<ServerAddress, MockPeer>>,
}

impl MockTransport {
    /// Creates a transport with no peers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a deployment to a peer, creating the peer if needed.
    pub fn add_deployment(&self, peer: &str, deployment: DeploymentWithAuditInfo) {
        self.peers
            .write()
            .entry(peer.to_string())
            .or_default()
            .deployments
            .push(deployment);
    }

    /// Adds a content file to a peer.
    pub fn add_content(&self, peer: &str, hash: impl Into<ContentHash>, bytes: impl Into<Bytes>) {
        self.peers
            .write()
            .entry(peer.to_string())
            .or_default()
            .content
            .insert(hash.into(), bytes.into());
    }

    /// Sets how a peer misbehaves.
    pub fn set_fault(&self, peer: &str, fault: PeerFault) {
        self.peers.write().entry(peer.to_string()).or_default().fault = fault;
    }

    /// Deployment requests a peer has received, in order.
    pub fn requests(&self, peer: &str) -> Vec<DeploymentsRequest> {
        self.peers
            .read()
            .get(peer)
            .map(|p| p.requests.clone())
            .unwrap_or_default()
    }

    fn fault(&self, peer: &str) -> SyncResult<PeerFault> {
        self.peers
            .read()
            .get(peer)
            .map(|p| p.fault)
            .ok_or_else(|| SyncError::transport_retryable(format!("unknown peer {peer}")))
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn fetch_deployments(
        &self,
        peer: &str,
        request: &DeploymentsRequest,
    ) -> SyncResult<DeploymentsPage> {
        match self.fault(peer)? {
            PeerFault::Hang => futures::future::pending().await,
            PeerFault::Slow(delay) => tokio::time::sleep(delay).await,
            PeerFault::Unreachable => {
                return Err(SyncError::transport_retryable(format!("{peer} is unreachable")))
            }
            PeerFault::FailAfterFirstPage if request.next.is_some() => {
                return Err(SyncError::transport_retryable(format!("{peer} dropped the connection")))
            }
            _ => {}
        }

        let mut peers = self.peers.write();
        let state = peers
            .get_mut(peer)
            .ok_or_else(|| SyncError::transport_retryable(format!("unknown peer {peer}")))?;
        state.requests.push(request.clone());
        Ok(request.paginate(&state.deployments)?)
    }

    async fn fetch_content(&self, peer: &str, hash: &str) -> SyncResult<Bytes> {
        match self.fault(peer)? {
            PeerFault::Hang => futures::future::pending().await,
            PeerFault::Unreachable => {
                Err(SyncError::transport_retryable(format!("{peer} is unreachable")))
            }
            PeerFault::ContentUnavailable => Err(SyncError::transport_retryable(format!(
                "{peer} could not serve content {hash}"
            ))),
            _ => self
                .peers
                .read()
                .get(peer)
                .and_then(|p| p.content.get(hash).cloned())
                .ok_or_else(|| SyncError::Protocol(format!("{peer} does not have content {hash}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalyst_protocol::{AuditInfo, Entity, EntityType, EntityVersion};

    const PEER: &str = "https://peer-1.example.com";

    fn deployment(ts: u64) -> DeploymentWithAuditInfo {
        DeploymentWithAuditInfo::new(
            Entity::new(format!("id-{ts}"), EntityType::Scene, vec!["0,0".into()], ts),
            AuditInfo::new(EntityVersion::V4, vec![]).with_deployed_timestamp(ts),
        )
    }

    #[tokio::test]
    async fn mock_transport_serves_pages() {
        let transport = MockTransport::new();
        for ts in [1, 2, 3] {
            transport.add_deployment(PEER, deployment(ts));
        }

        let page = transport
            .fetch_deployments(PEER, &DeploymentsRequest::new(1, 10))
            .await
            .unwrap();
        assert_eq!(page.deployments.len(), 2);
        assert_eq!(transport.requests(PEER).len(), 1);
    }

    #[tokio::test]
    async fn mock_transport_unknown_peer_error() {
        let transport = MockTransport::new();
        let result = transport
            .fetch_deployments(PEER, &DeploymentsRequest::new(0, 10))
            .await;
        assert!(matches!(result, Err(SyncError::Transport { retryable: true, .. })));
    }

    #[tokio::test]
    async fn mock_transport_faults() {
        let transport = MockTransport::new();
        transport.add_deployment(PEER, deployment(1));
        transport.add_deployment(PEER, deployment(2));
        transport.set_fault(PEER, PeerFault::FailAfterFirstPage);

        let first = transport
            .fetch_deployments(PEER, &DeploymentsRequest::new(0, 1))
            .await
            .unwrap();
        assert!(first.has_more());

        let second = DeploymentsRequest::new(0, 1).with_next(first.pagination.next);
        assert!(transport.fetch_deployments(PEER, &second).await.is_err());

        transport.set_fault(PEER, PeerFault::Unreachable);
        assert!(transport.fetch_content(PEER, "hash").await.is_err());
    }

    #[tokio::test]
    async fn mock_transport_content() {
        let transport = MockTransport::new();
        transport.add_content(PEER, "hash", Bytes::from_static(b"file"));

        assert_eq!(transport.fetch_content(PEER, "hash").await.unwrap(), Bytes::from_static(b"file"));
        assert!(matches!(
            transport.fetch_content(PEER, "other").await,
            Err(SyncError::Protocol(_))
        ));

        transport.set_fault(PEER, PeerFault::ContentUnavailable);
        let err = transport.fetch_content(PEER, "hash").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
