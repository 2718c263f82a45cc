//! HTTP transport implementation.
//!
//! The peer protocol is two GET endpoints on each content server:
//! `/deployments?fromLocalTimestamp=..&limit=..[&next=..]` returning a JSON page, and
//! `/contents/{hash}` returning raw bytes. The actual HTTP client is
//! abstracted via a trait so any HTTP library can be plugged in.

use crate::error::{SyncError, SyncResult};
use crate::transport::PeerTransport;
use async_trait::async_trait;
use bytes::Bytes;
use catalyst_protocol::{DeploymentsPage, DeploymentsRequest};
use parking_lot::RwLock;

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport
/// (reqwest, hyper, ureq, ...).
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a GET request and returns the response body.
    async fn get(&self, url: &str) -> Result<Vec<u8>, String>;

    /// Checks if the client is healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based peer transport.
pub struct HttpTransport<C: HttpClient> {
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(client: C) -> Self {
        Self {
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    async fn get(&self, url: String) -> SyncResult<Vec<u8>> {
        if !self.client.is_healthy() {
            return Err(SyncError::NotConnected);
        }

        let body = self.client.get(&url).await.map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            SyncError::transport_retryable(format!("GET {url}: {e}"))
        })?;

        *self.last_error.write() = None;
        Ok(body)
    }
}

#[async_trait]
impl<C: HttpClient> PeerTransport for HttpTransport<C> {
    async fn fetch_deployments(
        &self,
        peer: &str,
        request: &DeploymentsRequest,
    ) -> SyncResult<DeploymentsPage> {
        let url = peer_url(peer, &format!("deployments?{}", request.to_query_string()))?;
        let body = self.get(url).await?;
        DeploymentsPage::decode(&body)
            .map_err(|e| SyncError::Protocol(format!("invalid deployments page from {peer}: {e}")))
    }

    async fn fetch_content(&self, peer: &str, hash: &str) -> SyncResult<Bytes> {
        let url = peer_url(peer, &format!("contents/{hash}"))?;
        self.get(url).await.map(Bytes::from)
    }
}

/// Joins a peer address and an endpoint path.
///
/// Addresses without an `http` or `https` scheme can never be reached, so
/// they fail with a non-retryable error.
fn peer_url(peer: &str, path: &str) -> SyncResult<String> {
    if !(peer.starts_with("http://") || peer.starts_with("https://")) {
        return Err(SyncError::transport_fatal(format!("invalid peer address {peer}")));
    }
    Ok(format!("{}/{path}", peer.trim_end_matches('/')))
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a GET request for `path` (including its query string).
    fn handle_get(&self, path: &str) -> Result<Vec<u8>, String>;
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

#[async_trait]
impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    async fn get(&self, url: &str) -> Result<Vec<u8>, String> {
        let path = ["/deployments", "/contents/"]
            .iter()
            .filter_map(|p| url.find(p))
            .min()
            .map(|i| &url[i..])
            .unwrap_or(url);

        self.server.handle_get(path)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
