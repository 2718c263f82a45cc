//! Applies deployments reported by peers.
//!
//! The [`EventDeployer`] merges the per-peer streams of one round, fetches
//! missing content from the reporting peer, validates each deployment and
//! hands admitted ones to a [`DeploymentApplier`].

use crate::client::ContentServerClient;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use bytes::Bytes;
use catalyst_protocol::{
    ContentHash, DeploymentFiles, DeploymentWithAuditInfo, Entity, EntityId, EntityType, Pointer,
    ServerAddress, Timestamp,
};
use catalyst_validation::{
    DeploymentContext, DeploymentToValidate, ExternalCallError, ExternalCalls, ValidationError,
    Validator,
};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Local storage of admitted deployments.
#[async_trait]
pub trait DeploymentApplier: Send + Sync {
    /// Returns true if the entity was already applied.
    async fn is_deployed(&self, entity_id: &str) -> SyncResult<bool>;

    /// Durably stores an admitted deployment and its files.
    async fn apply(&self, deployment: &DeploymentToValidate) -> SyncResult<()>;

    /// Records that an entity failed validation.
    async fn record_failure(&self, entity_id: &str, errors: Vec<String>) -> SyncResult<()>;

    /// Returns true if the entity was recorded as failed.
    async fn is_marked_failed(&self, entity_id: &str) -> SyncResult<bool>;
}

#[derive(Default)]
struct MemoryState {
    deployments: BTreeMap<EntityId, DeploymentWithAuditInfo>,
    applied_order: Vec<EntityId>,
    content: HashMap<ContentHash, Bytes>,
    failures: HashMap<EntityId, Vec<String>>,
}

/// In-memory deployment storage for testing.
///
/// Also answers the validation pipeline's [`ExternalCalls`] from what it
/// holds.
#[derive(Default)]
pub struct MemoryDeploymentApplier {
    state: RwLock<MemoryState>,
    apply_failing: RwLock<bool>,
    calls_failing: RwLock<bool>,
}

impl MemoryDeploymentApplier {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a content file.
    pub fn add_content(&self, hash: impl Into<ContentHash>, bytes: impl Into<Bytes>) {
        self.state.write().content.insert(hash.into(), bytes.into());
    }

    /// Makes `apply` fail with a persistence error.
    pub fn set_apply_failing(&self, failing: bool) {
        *self.apply_failing.write() = failing;
    }

    /// Makes every external call fail.
    pub fn set_calls_failing(&self, failing: bool) {
        *self.calls_failing.write() = failing;
    }

    /// Ids of applied entities, in application order.
    pub fn applied_ids(&self) -> Vec<EntityId> {
        self.state.read().applied_order.clone()
    }

    /// Returns the stored deployment of an entity.
    pub fn deployment(&self, entity_id: &str) -> Option<DeploymentWithAuditInfo> {
        self.state.read().deployments.get(entity_id).cloned()
    }

    /// Returns the recorded validation errors of an entity.
    pub fn failure(&self, entity_id: &str) -> Option<Vec<String>> {
        self.state.read().failures.get(entity_id).cloned()
    }

    /// Returns true if the content file is stored.
    pub fn has_content(&self, hash: &str) -> bool {
        self.state.read().content.contains_key(hash)
    }

    fn check_calls(&self, call: &'static str) -> Result<(), ExternalCallError> {
        if *self.calls_failing.read() {
            return Err(ExternalCallError::new(call, "storage unavailable"));
        }
        Ok(())
    }

    fn overlapping<'a>(
        state: &'a MemoryState,
        entity_type: EntityType,
        pointers: &'a [Pointer],
    ) -> impl Iterator<Item = &'a DeploymentWithAuditInfo> + 'a {
        state.deployments.values().filter(move |d| {
            d.entity.entity_type == entity_type
                && d.entity
                    .pointers
                    .iter()
                    .any(|p| pointers.iter().any(|q| p.eq_ignore_ascii_case(q)))
        })
    }
}

#[async_trait]
impl DeploymentApplier for MemoryDeploymentApplier {
    async fn is_deployed(&self, entity_id: &str) -> SyncResult<bool> {
        Ok(self.state.read().deployments.contains_key(entity_id))
    }

    async fn apply(&self, deployment: &DeploymentToValidate) -> SyncResult<()> {
        if *self.apply_failing.read() {
            return Err(SyncError::Persistence("storage unavailable".into()));
        }
        let mut state = self.state.write();
        for (hash, bytes) in &deployment.files {
            state.content.insert(hash.clone(), bytes.clone());
        }
        let id = deployment.entity.id.clone();
        state.deployments.insert(
            id.clone(),
            DeploymentWithAuditInfo::new(deployment.entity.clone(), deployment.audit_info.clone()),
        );
        state.applied_order.push(id);
        Ok(())
    }

    async fn record_failure(&self, entity_id: &str, errors: Vec<String>) -> SyncResult<()> {
        self.state.write().failures.insert(entity_id.to_string(), errors);
        Ok(())
    }

    async fn is_marked_failed(&self, entity_id: &str) -> SyncResult<bool> {
        Ok(self.state.read().failures.contains_key(entity_id))
    }
}

#[async_trait]
impl ExternalCalls for MemoryDeploymentApplier {
    async fn fetch_deployments_by_pointers(
        &self,
        entity_type: EntityType,
        pointers: &[Pointer],
    ) -> Result<Vec<DeploymentWithAuditInfo>, ExternalCallError> {
        self.check_calls("fetch_deployments_by_pointers")?;
        let state = self.state.read();
        Ok(Self::overlapping(&state, entity_type, pointers).cloned().collect())
    }

    async fn are_there_newer_entities(&self, entity: &Entity) -> Result<bool, ExternalCallError> {
        self.check_calls("are_there_newer_entities")?;
        let state = self.state.read();
        let newer = Self::overlapping(&state, entity.entity_type, &entity.pointers)
            .any(|d| d.entity.timestamp > entity.timestamp);
        Ok(newer)
    }

    async fn is_content_stored_already(
        &self,
        hashes: &[ContentHash],
    ) -> Result<HashMap<ContentHash, bool>, ExternalCallError> {
        self.check_calls("is_content_stored_already")?;
        let state = self.state.read();
        Ok(hashes
            .iter()
            .map(|h| (h.clone(), state.content.contains_key(h)))
            .collect())
    }

    async fn is_entity_rate_limited(&self, _entity: &Entity) -> Result<bool, ExternalCallError> {
        self.check_calls("is_entity_rate_limited")?;
        Ok(false)
    }

    async fn fetch_content_file_size(&self, hash: &str) -> Result<Option<u64>, ExternalCallError> {
        self.check_calls("fetch_content_file_size")?;
        Ok(self.state.read().content.get(hash).map(|b| b.len() as u64))
    }
}

/// One peer's stream for a round.
pub struct DeploymentSource<'a> {
    /// The peer that reports the deployments.
    pub client: &'a ContentServerClient,
    /// The peer's deployments, in ascending order.
    pub deployments: BoxStream<'a, SyncResult<DeploymentWithAuditInfo>>,
}

impl<'a> DeploymentSource<'a> {
    /// Streams `client`'s deployments newer than `since`.
    pub fn new(client: &'a ContentServerClient, since: Timestamp) -> Self {
        Self {
            client,
            deployments: client.get_new_deployments(since),
        }
    }
}

/// Counts for one round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployerReport {
    /// Deployments validated and stored.
    pub applied: usize,
    /// Deployments already known.
    pub skipped: usize,
    /// Deployments that failed validation.
    pub rejected: usize,
    /// Deployments left for the next round.
    pub failed: usize,
    /// Peers whose stream or deployments failed.
    pub failed_peers: BTreeSet<ServerAddress>,
}

impl DeployerReport {
    /// Returns true if every peer was processed without failure.
    pub fn is_success(&self) -> bool {
        self.failed_peers.is_empty()
    }
}

enum Outcome {
    Applied,
    Skipped,
    Rejected,
    Retry,
}

/// Validates and applies deployments from the cluster.
pub struct EventDeployer {
    validator: Validator,
    applier: Arc<dyn DeploymentApplier>,
    external_calls: Arc<dyn ExternalCalls>,
}

impl EventDeployer {
    /// Creates a deployer.
    pub fn new(
        validator: Validator,
        applier: Arc<dyn DeploymentApplier>,
        external_calls: Arc<dyn ExternalCalls>,
    ) -> Self {
        Self {
            validator,
            applier,
            external_calls,
        }
    }

    /// Processes every deployment of every source.
    ///
    /// Streams are consumed concurrently; order is preserved within each
    /// peer. With `bootstrap` set, the rules that need full history are
    /// relaxed. Returns `Err` only when storage fails, which aborts the
    /// round.
    pub async fn process_all_deployments(
        &self,
        sources: Vec<DeploymentSource<'_>>,
        bootstrap: bool,
    ) -> SyncResult<DeployerReport> {
        let context = if bootstrap {
            DeploymentContext::Bootstrap
        } else {
            DeploymentContext::Synced
        };
        let mut report = DeployerReport::default();
        let mut seen = HashSet::new();

        let clients: Vec<&ContentServerClient> = sources.iter().map(|s| s.client).collect();
        let mut merged = stream::select_all(
            sources
                .into_iter()
                .enumerate()
                .map(|(index, source)| source.deployments.map(move |item| (index, item))),
        );

        // Peers with a deployment left for the next round; their later
        // deployments must wait so each peer is applied in order.
        let mut halted = HashSet::new();

        while let Some((index, item)) = merged.next().await {
            let client = clients[index];
            if halted.contains(&index) {
                continue;
            }
            let deployment = match item {
                Ok(deployment) => deployment,
                Err(e) => {
                    warn!(peer = client.address(), error = %e, "peer stream failed");
                    report.failed_peers.insert(client.address().to_string());
                    continue;
                }
            };
            let deployed_timestamp = deployment.deployed_timestamp();

            match self.process_one(client, deployment, context, &mut seen).await? {
                Outcome::Applied => report.applied += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Rejected => report.rejected += 1,
                Outcome::Retry => {
                    debug!(peer = client.address(), "deferring the peer's remaining deployments");
                    client.deployment_failed();
                    report.failed += 1;
                    report.failed_peers.insert(client.address().to_string());
                    halted.insert(index);
                    continue;
                }
            }
            client.deployment_processed(deployed_timestamp);
        }

        info!(
            applied = report.applied,
            skipped = report.skipped,
            rejected = report.rejected,
            failed = report.failed,
            bootstrap,
            "deployments processed"
        );
        Ok(report)
    }

    async fn process_one(
        &self,
        client: &ContentServerClient,
        deployment: DeploymentWithAuditInfo,
        context: DeploymentContext,
        seen: &mut HashSet<EntityId>,
    ) -> SyncResult<Outcome> {
        let id = deployment.entity.id.clone();
        if seen.contains(&id)
            || self.applier.is_deployed(&id).await?
            || self.applier.is_marked_failed(&id).await?
        {
            debug!(entity = %id, "deployment already known");
            return Ok(Outcome::Skipped);
        }

        let files = match self.download_missing_content(client, &deployment.entity).await {
            Ok(files) => files,
            Err(e) => {
                warn!(entity = %id, peer = client.address(), error = %e, "content download failed");
                let message = format!("Couldn't download the content from {}: {e}", client.address());
                return self.settle(id, e, message, seen).await;
            }
        };
        let candidate =
            DeploymentToValidate::new(deployment.entity, deployment.audit_info).with_files(files);

        let outcome = match self
            .validator
            .validate(&candidate, context, self.external_calls.as_ref())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(entity = %id, error = %e, "validation could not complete");
                let message = e.to_string();
                return self.settle(id, SyncError::from(e), message, seen).await;
            }
        };

        if outcome.is_ok() {
            self.applier.apply(&candidate).await?;
            debug!(entity = %id, peer = client.address(), "deployment applied");
            seen.insert(id);
            Ok(Outcome::Applied)
        } else {
            let errors = outcome.into_errors();
            warn!(entity = %id, peer = client.address(), ?errors, "deployment rejected");
            self.applier.record_failure(&id, errors).await?;
            seen.insert(id);
            Ok(Outcome::Rejected)
        }
    }

    /// Turns a deployment that could not be processed into a retry when
    /// the error is transient, or records it as failed otherwise.
    async fn settle(
        &self,
        id: EntityId,
        error: SyncError,
        message: String,
        seen: &mut HashSet<EntityId>,
    ) -> SyncResult<Outcome> {
        if error.is_retryable() {
            return Ok(Outcome::Retry);
        }
        self.applier.record_failure(&id, vec![message]).await?;
        seen.insert(id);
        Ok(Outcome::Rejected)
    }

    async fn download_missing_content(
        &self,
        client: &ContentServerClient,
        entity: &Entity,
    ) -> SyncResult<DeploymentFiles> {
        let referenced: Vec<ContentHash> =
            entity.referenced_hashes().into_iter().map(str::to_string).collect();
        if referenced.is_empty() {
            return Ok(DeploymentFiles::new());
        }

        let stored = self
            .external_calls
            .is_content_stored_already(&referenced)
            .await
            .map_err(|source| ValidationError::ExternalCall {
                rule: "CONTENT_DOWNLOAD",
                source,
            })?;

        let mut files = DeploymentFiles::new();
        for hash in referenced {
            if stored.get(&hash).copied().unwrap_or(false) {
                continue;
            }
            let bytes = client.download_content(&hash).await?;
            files.insert(hash, bytes);
        }
        Ok(files)
    }
}
