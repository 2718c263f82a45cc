//! The side-effecting boundary of the validation pipeline.

use crate::error::ExternalCallError;
use async_trait::async_trait;
use catalyst_protocol::{ContentHash, DeploymentWithAuditInfo, Entity, EntityType, Pointer};
use std::collections::HashMap;

/// Calls the pipeline makes into the rest of the node.
///
/// This is the only place where rules touch storage or the network, so every
/// rule can be exercised with a stub implementation.
#[async_trait]
pub trait ExternalCalls: Send + Sync {
    /// Returns the deployments currently pointed by any of `pointers`.
    async fn fetch_deployments_by_pointers(
        &self,
        entity_type: EntityType,
        pointers: &[Pointer],
    ) -> Result<Vec<DeploymentWithAuditInfo>, ExternalCallError>;

    /// Returns true if a newer entity already owns one of the entity's pointers.
    async fn are_there_newer_entities(&self, entity: &Entity) -> Result<bool, ExternalCallError>;

    /// Reports, for each hash, whether the node already stores that content.
    async fn is_content_stored_already(
        &self,
        hashes: &[ContentHash],
    ) -> Result<HashMap<ContentHash, bool>, ExternalCallError>;

    /// Returns true if the entity's author has exceeded the deployment rate.
    async fn is_entity_rate_limited(&self, entity: &Entity) -> Result<bool, ExternalCallError>;

    /// Size of a stored content file, or `None` if it cannot be found.
    async fn fetch_content_file_size(
        &self,
        hash: &str,
    ) -> Result<Option<u64>, ExternalCallError>;
}
