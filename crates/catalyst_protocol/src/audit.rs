//! Provenance records attached to deployments.

use crate::entity::Timestamp;
use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deployment protocol version. Ordered: `V2 < V3 < V4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityVersion {
    /// Legacy format, only reachable through migration.
    V2,
    /// Content hashes may be uploaded without being referenced.
    V3,
    /// Every uploaded file must be referenced by the entity.
    V4,
}

impl EntityVersion {
    /// Returns the wire name of the version.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityVersion::V2 => "v2",
            EntityVersion::V3 => "v3",
            EntityVersion::V4 => "v4",
        }
    }
}

impl fmt::Display for EntityVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v2" => Ok(EntityVersion::V2),
            "v3" => Ok(EntityVersion::V3),
            "v4" => Ok(EntityVersion::V4),
            _ => Err(ProtocolError::UnknownEntityVersion(s.to_string())),
        }
    }
}

/// Original-format information carried by documents migrated from a legacy
/// protocol version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationData {
    /// Version of the document before migration.
    pub original_version: EntityVersion,
    /// Opaque migration payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl MigrationData {
    /// Creates migration data without a payload.
    pub fn new(original_version: EntityVersion) -> Self {
        Self {
            original_version,
            data: None,
        }
    }
}

/// Kind of link in an authorization chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthLinkType {
    /// Declares the owning address. Carries no signature.
    Signer,
    /// The previous key delegates to an ephemeral key until an expiration.
    EphemeralDelegation,
    /// The previous key signs the entity id.
    SignedEntity,
}

/// One signed step of an authorization chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthLink {
    /// Link kind.
    #[serde(rename = "type")]
    pub link_type: AuthLinkType,
    /// Signed payload (an address, a delegation statement or an entity id).
    pub payload: String,
    /// Hex-encoded signature over `payload`, empty for `Signer` links.
    #[serde(default)]
    pub signature: String,
}

impl AuthLink {
    /// Creates the leading link naming the owner address.
    pub fn signer(address: impl Into<String>) -> Self {
        Self {
            link_type: AuthLinkType::Signer,
            payload: address.into(),
            signature: String::new(),
        }
    }

    /// Creates a delegation link.
    pub fn ephemeral_delegation(payload: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            link_type: AuthLinkType::EphemeralDelegation,
            payload: payload.into(),
            signature: signature.into(),
        }
    }

    /// Creates the final link signing the entity id.
    pub fn signed_entity(entity_id: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            link_type: AuthLinkType::SignedEntity,
            payload: entity_id.into(),
            signature: signature.into(),
        }
    }
}

/// Ordered sequence of links proving authorship.
pub type AuthChain = Vec<AuthLink>;

/// Provenance record attached to a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditInfo {
    /// Protocol version the deployment was made with.
    pub version: EntityVersion,
    /// Authorization chain over the entity id.
    #[serde(default)]
    pub auth_chain: AuthChain,
    /// Time the reporting node accepted the deployment.
    #[serde(default)]
    pub deployed_timestamp: Timestamp,
    /// Present on documents migrated from a legacy format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_data: Option<MigrationData>,
    /// Alternative location of the original version, used by older nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_metadata: Option<MigrationData>,
}

impl AuditInfo {
    /// Creates an audit record.
    pub fn new(version: EntityVersion, auth_chain: AuthChain) -> Self {
        Self {
            version,
            auth_chain,
            deployed_timestamp: 0,
            migration_data: None,
            original_metadata: None,
        }
    }

    /// Sets the deployed timestamp.
    pub fn with_deployed_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.deployed_timestamp = timestamp;
        self
    }

    /// Sets the migration data.
    pub fn with_migration_data(mut self, migration: MigrationData) -> Self {
        self.migration_data = Some(migration);
        self
    }

    /// Sets the original metadata.
    pub fn with_original_metadata(mut self, original: MigrationData) -> Self {
        self.original_metadata = Some(original);
        self
    }

    /// Original version recorded by a migration, if any.
    ///
    /// `migration_data` takes precedence over `original_metadata`.
    pub fn original_version(&self) -> Option<EntityVersion> {
        self.migration_data
            .as_ref()
            .or(self.original_metadata.as_ref())
            .map(|m| m.original_version)
    }

    /// Version used when comparing against other deployments.
    pub fn effective_version(&self) -> EntityVersion {
        self.original_version().unwrap_or(self.version)
    }

    /// Returns true if the record carries migration information.
    pub fn is_migrated(&self) -> bool {
        self.original_version().is_some()
    }

    /// Address declared by the leading `Signer` link.
    pub fn owner_address(&self) -> Option<&str> {
        self.auth_chain
            .first()
            .filter(|link| link.link_type == AuthLinkType::Signer)
            .map(|link| link.payload.as_str())
    }
}
