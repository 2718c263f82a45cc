//! Stubbed external calls for the validation pipeline.

use async_trait::async_trait;
use catalyst_protocol::{ContentHash, DeploymentWithAuditInfo, Entity, EntityType, Pointer};
use catalyst_validation::{
    DeploymentContext, DeploymentToValidate, ExternalCallError, ExternalCalls, ServerEnvironment,
    ValidationOutcome, Validator,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// External calls answered from fixed data.
///
/// Every call is logged by name so tests can assert which collaborators a
/// rule consulted.
#[derive(Debug, Default)]
pub struct StubExternalCalls {
    existing: Vec<DeploymentWithAuditInfo>,
    stored: HashSet<ContentHash>,
    sizes: HashMap<ContentHash, u64>,
    newer: bool,
    rate_limited: bool,
    failing: Option<&'static str>,
    log: Mutex<Vec<&'static str>>,
}

impl StubExternalCalls {
    /// Nothing stored, nothing deployed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an already deployed entity, returned for any pointer lookup.
    pub fn with_existing(mut self, deployment: DeploymentWithAuditInfo) -> Self {
        self.existing.push(deployment);
        self
    }

    /// Marks a content file as stored, with its size.
    pub fn with_stored(mut self, hash: impl Into<ContentHash>, size: u64) -> Self {
        let hash = hash.into();
        self.stored.insert(hash.clone());
        self.sizes.insert(hash, size);
        self
    }

    /// Marks a content file as stored but with an unknown size.
    pub fn with_stored_without_size(mut self, hash: impl Into<ContentHash>) -> Self {
        self.stored.insert(hash.into());
        self
    }

    /// Reports that newer entities exist on the pointers.
    pub fn with_newer_entities(mut self) -> Self {
        self.newer = true;
        self
    }

    /// Reports every entity as rate limited.
    pub fn rate_limited(mut self) -> Self {
        self.rate_limited = true;
        self
    }

    /// Makes the named call fail.
    pub fn failing(mut self, call: &'static str) -> Self {
        self.failing = Some(call);
        self
    }

    /// Names of the calls made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.log.lock().clone()
    }

    fn record(&self, call: &'static str) -> Result<(), ExternalCallError> {
        self.log.lock().push(call);
        if self.failing == Some(call) {
            return Err(ExternalCallError::new(call, "stubbed failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ExternalCalls for StubExternalCalls {
    async fn fetch_deployments_by_pointers(
        &self,
        _entity_type: EntityType,
        _pointers: &[Pointer],
    ) -> Result<Vec<DeploymentWithAuditInfo>, ExternalCallError> {
        self.record("fetch_deployments_by_pointers")?;
        Ok(self.existing.clone())
    }

    async fn are_there_newer_entities(&self, _entity: &Entity) -> Result<bool, ExternalCallError> {
        self.record("are_there_newer_entities")?;
        Ok(self.newer)
    }

    async fn is_content_stored_already(
        &self,
        hashes: &[ContentHash],
    ) -> Result<HashMap<ContentHash, bool>, ExternalCallError> {
        self.record("is_content_stored_already")?;
        Ok(hashes
            .iter()
            .map(|h| (h.clone(), self.stored.contains(h)))
            .collect())
    }

    async fn is_entity_rate_limited(&self, _entity: &Entity) -> Result<bool, ExternalCallError> {
        self.record("is_entity_rate_limited")?;
        Ok(self.rate_limited)
    }

    async fn fetch_content_file_size(&self, hash: &str) -> Result<Option<u64>, ExternalCallError> {
        self.record("fetch_content_file_size")?;
        Ok(self.sizes.get(hash).copied())
    }
}

/// Validates a locally submitted deployment against the default environment.
pub async fn validate_local(
    deployment: &DeploymentToValidate,
    calls: &dyn ExternalCalls,
) -> ValidationOutcome {
    validate_with(ServerEnvironment::new(), deployment, DeploymentContext::Local, calls).await
}

/// Validates a deployment in the given environment and context.
///
/// Panics if an external call fails.
pub async fn validate_with(
    env: ServerEnvironment,
    deployment: &DeploymentToValidate,
    context: DeploymentContext,
    calls: &dyn ExternalCalls,
) -> ValidationOutcome {
    Validator::new(env)
        .validate(deployment, context, calls)
        .await
        .expect("external calls failed")
}
