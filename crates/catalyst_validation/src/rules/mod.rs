//! Validation rules.
//!
//! Each rule is a unit struct implementing [`Validation`]. The rule sets
//! are static, explicitly ordered slices; [`rules_for`] picks the set for a
//! deployment's protocol version.

mod authority;
mod content;
mod entity;
mod metadata;

pub use authority::{Access, RateLimit, Signature};
pub use content::{ContentV3, ContentV4, IpfsHashing, RequestSizeV3, RequestSizeV4};
pub use entity::{EntityStructure, LegacyEntity, NoNewerEntities, Recent};
pub use metadata::MetadataSchema;

use crate::env::ServerEnvironment;
use crate::error::ExternalCallError;
use crate::external::ExternalCalls;
use async_trait::async_trait;
use bytes::Bytes;
use catalyst_protocol::{AuditInfo, ContentHash, DeploymentFiles, Entity, EntityVersion};
use serde::Serialize;
use std::fmt;

/// Errors reported by one rule, or the external call that stopped it.
pub type RuleResult = Result<Vec<String>, ExternalCallError>;

/// Identifies a rule in reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum RuleKind {
    EntityStructure,
    Recent,
    LegacyEntity,
    ContentV3,
    ContentV4,
    Signature,
    Access,
    NoNewerEntities,
    RequestSizeV3,
    RequestSizeV4,
    IpfsHashing,
    MetadataSchema,
    RateLimit,
}

impl RuleKind {
    /// Upper-case rule name.
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::EntityStructure => "ENTITY_STRUCTURE",
            RuleKind::Recent => "RECENT",
            RuleKind::LegacyEntity => "LEGACY_ENTITY",
            RuleKind::ContentV3 => "CONTENT_V3",
            RuleKind::ContentV4 => "CONTENT_V4",
            RuleKind::Signature => "SIGNATURE",
            RuleKind::Access => "ACCESS",
            RuleKind::NoNewerEntities => "NO_NEWER",
            RuleKind::RequestSizeV3 => "REQUEST_SIZE_V3",
            RuleKind::RequestSizeV4 => "REQUEST_SIZE_V4",
            RuleKind::IpfsHashing => "IPFS_HASHING",
            RuleKind::MetadataSchema => "METADATA_SCHEMA",
            RuleKind::RateLimit => "RATE_LIMIT",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a deployment reached the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentContext {
    /// Submitted directly by a client.
    #[default]
    Local,
    /// Received from a peer during an incremental sync round.
    Synced,
    /// Received from a peer during the first round after start.
    Bootstrap,
}

impl DeploymentContext {
    /// Returns true for client submissions.
    pub fn is_local(&self) -> bool {
        matches!(self, DeploymentContext::Local)
    }

    /// Returns true for deployments received from peers.
    pub fn is_synced(&self) -> bool {
        !self.is_local()
    }
}

/// A candidate deployment.
#[derive(Debug, Clone)]
pub struct DeploymentToValidate {
    /// The entity.
    pub entity: Entity,
    /// Its provenance.
    pub audit_info: AuditInfo,
    /// Files uploaded with the deployment, keyed by hash.
    pub files: DeploymentFiles,
}

impl DeploymentToValidate {
    /// Creates a deployment without uploaded files.
    pub fn new(entity: Entity, audit_info: AuditInfo) -> Self {
        Self {
            entity,
            audit_info,
            files: DeploymentFiles::new(),
        }
    }

    /// Adds an uploaded file.
    pub fn with_file(mut self, hash: impl Into<ContentHash>, bytes: impl Into<Bytes>) -> Self {
        self.files.insert(hash.into(), bytes.into());
        self
    }

    /// Replaces the uploaded files.
    pub fn with_files(mut self, files: DeploymentFiles) -> Self {
        self.files = files;
        self
    }
}

/// Everything a rule may look at.
#[derive(Clone, Copy)]
pub struct ValidationArgs<'a> {
    /// The candidate deployment.
    pub deployment: &'a DeploymentToValidate,
    /// Static configuration.
    pub env: &'a ServerEnvironment,
    /// Side-effecting collaborators.
    pub external_calls: &'a dyn ExternalCalls,
}

impl<'a> ValidationArgs<'a> {
    /// Bundles rule arguments.
    pub fn new(
        deployment: &'a DeploymentToValidate,
        env: &'a ServerEnvironment,
        external_calls: &'a dyn ExternalCalls,
    ) -> Self {
        Self {
            deployment,
            env,
            external_calls,
        }
    }

    /// The entity under validation.
    pub fn entity(&self) -> &'a Entity {
        &self.deployment.entity
    }
}

/// One validation rule.
#[async_trait]
pub trait Validation: Send + Sync {
    /// Identifies the rule.
    fn kind(&self) -> RuleKind;

    /// Returns true if the rule runs for deployments in `context`.
    fn applies_to(&self, _context: DeploymentContext) -> bool {
        true
    }

    /// Returns the rule's error messages; empty when the deployment passes.
    async fn validate(&self, args: &ValidationArgs<'_>) -> RuleResult;
}

/// Rules for V2 and V3 deployments, in evaluation order.
pub static V3_RULES: &[&dyn Validation] = &[
    &EntityStructure,
    &Recent,
    &LegacyEntity,
    &ContentV3,
    &Signature,
    &Access,
    &NoNewerEntities,
    &RequestSizeV3,
    &RateLimit,
];

/// Rules for V4 deployments, in evaluation order.
pub static V4_RULES: &[&dyn Validation] = &[
    &EntityStructure,
    &Recent,
    &ContentV4,
    &Signature,
    &Access,
    &NoNewerEntities,
    &RequestSizeV4,
    &IpfsHashing,
    &MetadataSchema,
    &RateLimit,
];

/// Rule set for a protocol version.
pub fn rules_for(version: EntityVersion) -> &'static [&'static dyn Validation] {
    match version {
        EntityVersion::V2 | EntityVersion::V3 => V3_RULES,
        EntityVersion::V4 => V4_RULES,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Stub collaborators for rule unit tests.

    use super::*;
    use catalyst_protocol::{
        hashing, DeploymentWithAuditInfo, EntityType, Pointer, Timestamp,
    };
    use std::collections::{HashMap, HashSet};

    pub const NOW: Timestamp = 1_700_000_000_000;

    pub fn env() -> ServerEnvironment {
        ServerEnvironment::new().with_clock(|| NOW)
    }

    pub fn entity_id() -> String {
        hashing::ipfs_hash(b"entity")
    }

    pub fn entity() -> Entity {
        Entity::new(entity_id(), EntityType::Scene, vec!["P1".to_string()], NOW)
    }

    pub fn deployment(entity: Entity) -> DeploymentToValidate {
        DeploymentToValidate::new(entity, AuditInfo::new(EntityVersion::V4, Vec::new()))
    }

    #[derive(Default)]
    pub struct StubCalls {
        pub existing: Vec<DeploymentWithAuditInfo>,
        pub stored: HashSet<String>,
        pub sizes: HashMap<String, u64>,
        pub newer: bool,
        pub rate_limited: bool,
        pub failing: bool,
    }

    impl StubCalls {
        fn check(&self, call: &'static str) -> Result<(), ExternalCallError> {
            if self.failing {
                Err(ExternalCallError::new(call, "unavailable"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ExternalCalls for StubCalls {
        async fn fetch_deployments_by_pointers(
            &self,
            _entity_type: EntityType,
            _pointers: &[Pointer],
        ) -> Result<Vec<DeploymentWithAuditInfo>, ExternalCallError> {
            self.check("fetch_deployments_by_pointers")?;
            Ok(self.existing.clone())
        }

        async fn are_there_newer_entities(&self, _entity: &Entity) -> Result<bool, ExternalCallError> {
            self.check("are_there_newer_entities")?;
            Ok(self.newer)
        }

        async fn is_content_stored_already(
            &self,
            hashes: &[ContentHash],
        ) -> Result<HashMap<ContentHash, bool>, ExternalCallError> {
            self.check("is_content_stored_already")?;
            Ok(hashes
                .iter()
                .map(|h| (h.clone(), self.stored.contains(h)))
                .collect())
        }

        async fn is_entity_rate_limited(&self, _entity: &Entity) -> Result<bool, ExternalCallError> {
            self.check("is_entity_rate_limited")?;
            Ok(self.rate_limited)
        }

        async fn fetch_content_file_size(&self, hash: &str) -> Result<Option<u64>, ExternalCallError> {
            self.check("fetch_content_file_size")?;
            Ok(self.sizes.get(hash).copied())
        }
    }

    pub async fn run(
        rule: &dyn Validation,
        deployment: &DeploymentToValidate,
        env: &ServerEnvironment,
        calls: &StubCalls,
    ) -> Vec<String> {
        rule.validate(&ValidationArgs::new(deployment, env, calls))
            .await
            .unwrap()
    }
}
