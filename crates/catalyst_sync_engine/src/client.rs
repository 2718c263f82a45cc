//! Per-peer client.
//!
//! A [`ContentServerClient`] turns a peer's paginated `deployments`
//! endpoint into a lazy stream and remembers how far the current round got,
//! so the manager knows which watermark it may checkpoint.

use crate::error::{SyncError, SyncResult};
use crate::transport::PeerTransport;
use bytes::Bytes;
use catalyst_protocol::{DeploymentWithAuditInfo, DeploymentsRequest, ServerAddress, Timestamp};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Progress of the current round against one peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RoundProgress {
    since: Timestamp,
    latest: Timestamp,
    failed: bool,
    finished: bool,
}

enum Cursor {
    Next(DeploymentsRequest),
    Exhausted,
    Stopped,
}

/// Handle on one peer of the cluster.
pub struct ContentServerClient {
    address: ServerAddress,
    transport: Arc<dyn PeerTransport>,
    page_size: u32,
    progress: Mutex<RoundProgress>,
}

impl ContentServerClient {
    /// Creates a client for the peer at `address`.
    pub fn new(address: impl Into<ServerAddress>, transport: Arc<dyn PeerTransport>, page_size: u32) -> Self {
        Self {
            address: address.into(),
            transport,
            page_size: page_size.max(1),
            progress: Mutex::new(RoundProgress::default()),
        }
    }

    /// The peer's address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Streams the peer's deployments with a deployed timestamp strictly
    /// greater than `since`, in ascending order.
    ///
    /// Pages are fetched as the stream is polled. The stream is single-use:
    /// calling this again starts a new round and resets the progress.
    /// A transport error ends the stream after yielding it.
    pub fn get_new_deployments(
        &self,
        since: Timestamp,
    ) -> BoxStream<'_, SyncResult<DeploymentWithAuditInfo>> {
        *self.progress.lock() = RoundProgress {
            since,
            latest: since,
            ..RoundProgress::default()
        };

        let first = Cursor::Next(DeploymentsRequest::new(since, self.page_size));
        stream::unfold(first, move |cursor| async move {
            match cursor {
                Cursor::Next(_) if self.progress.lock().failed => {
                    debug!(peer = %self.address, "round halted, not fetching more pages");
                    None
                }
                Cursor::Next(request) => {
                    match self.transport.fetch_deployments(&self.address, &request).await {
                        Ok(page) => {
                            debug!(peer = %self.address, count = page.deployments.len(), "fetched page");
                            let next = match page.pagination.next {
                                Some(cursor) => Cursor::Next(request.with_next(Some(cursor))),
                                None => Cursor::Exhausted,
                            };
                            let items = stream::iter(page.deployments.into_iter().map(Ok::<_, SyncError>));
                            Some((Ok(items), next))
                        }
                        Err(e) => {
                            warn!(peer = %self.address, error = %e, "failed to fetch deployments");
                            self.progress.lock().failed = true;
                            Some((Err(e), Cursor::Stopped))
                        }
                    }
                }
                Cursor::Exhausted => {
                    self.progress.lock().finished = true;
                    None
                }
                Cursor::Stopped => None,
            }
        })
        .try_flatten()
        .boxed()
    }

    /// Downloads a content file from this peer.
    pub async fn download_content(&self, hash: &str) -> SyncResult<Bytes> {
        self.transport.fetch_content(&self.address, hash).await
    }

    /// Records that a deployment from this peer was applied or permanently
    /// rejected.
    pub fn deployment_processed(&self, deployed_timestamp: Timestamp) {
        let mut progress = self.progress.lock();
        progress.latest = progress.latest.max(deployed_timestamp);
    }

    /// Records that a deployment from this peer could not be processed and
    /// must be retried next round. No further pages are fetched this round.
    pub fn deployment_failed(&self) {
        self.progress.lock().failed = true;
    }

    /// The watermark to checkpoint after this round.
    ///
    /// This is the latest processed timestamp if the stream was fully
    /// consumed without any failure, or the round's starting watermark
    /// otherwise.
    pub fn all_deployments_were_successful(&self) -> Timestamp {
        let progress = self.progress.lock();
        if progress.finished && !progress.failed {
            progress.since.max(progress.latest)
        } else {
            progress.since
        }
    }
}

impl fmt::Debug for ContentServerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentServerClient")
            .field("address", &self.address)
            .field("page_size", &self.page_size)
            .field("progress", &*self.progress.lock())
            .finish()
    }
}
