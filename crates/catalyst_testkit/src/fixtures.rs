//! Signing identities and deployment builders.
//!
//! Entities built here get a well-formed content-address id computed from
//! their own fields, so they pass IPFS_HASHING unless a test overrides the
//! id on purpose.

use bytes::Bytes;
use catalyst_protocol::{
    hashing, AuditInfo, AuthChain, ContentHash, DeploymentFiles, DeploymentWithAuditInfo, Entity,
    EntityType, EntityVersion, MigrationData, Pointer, Timestamp,
};
use catalyst_validation::{system_now, ContentAuthenticator, DeploymentToValidate};
use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde_json::{json, Value};

/// A key pair that signs entities.
#[derive(Clone)]
pub struct Identity {
    key: SigningKey,
}

impl Identity {
    /// Generates a random identity.
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Derives a deterministic identity from a seed byte.
    pub fn from_seed(seed: u8) -> Self {
        Self {
            key: SigningKey::from_bytes(&[seed; 32]),
        }
    }

    /// The signing key.
    pub fn key(&self) -> &SigningKey {
        &self.key
    }

    /// The address recovered from chains this identity signs.
    pub fn address(&self) -> String {
        ContentAuthenticator::address_of(&self.key.verifying_key())
    }

    /// A chain where this identity signs `entity_id` directly.
    pub fn sign(&self, entity_id: &str) -> AuthChain {
        ContentAuthenticator::create_simple_auth_chain(entity_id, &self.key)
    }

    /// A chain where this identity delegates to `ephemeral` until
    /// `expiration`.
    pub fn sign_with_ephemeral(
        &self,
        entity_id: &str,
        ephemeral: &Identity,
        expiration: DateTime<Utc>,
    ) -> AuthChain {
        ContentAuthenticator::create_ephemeral_auth_chain(entity_id, &self.key, &ephemeral.key, expiration)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity").field("address", &self.address()).finish()
    }
}

/// Scene metadata covering `parcels`.
pub fn scene_metadata(parcels: &[&str]) -> Value {
    json!({
        "display": { "title": "test scene" },
        "main": "bin/game.js",
        "scene": { "base": parcels.first().copied().unwrap_or("0,0"), "parcels": parcels }
    })
}

/// Profile metadata with one avatar whose snapshots are `face` and `body`.
pub fn profile_metadata(address: &str, face: &str, body: &str) -> Value {
    json!({
        "avatars": [{
            "name": "tester",
            "description": "",
            "ethAddress": address,
            "avatar": {
                "bodyShape": "urn:decentraland:off-chain:base-avatars:BaseMale",
                "snapshots": { "face256": face, "body": body },
                "eyes": { "color": { "r": 0.2, "g": 0.6, "b": 0.3 } },
                "hair": { "color": { "r": 0.3, "g": 0.2, "b": 0.1 } },
                "skin": { "color": { "r": 0.9, "g": 0.7, "b": 0.6 } },
                "wearables": []
            }
        }]
    })
}

/// Wearable metadata rendered from `main_file`.
pub fn wearable_metadata(id: &str, main_file: &str) -> Value {
    json!({
        "id": id,
        "descriptions": [{ "code": "en", "text": "a test wearable" }],
        "collectionAddress": "0x0000000000000000000000000000000000000001",
        "rarity": "common",
        "names": [{ "code": "en", "text": "test" }],
        "data": {
            "replaces": [],
            "hides": [],
            "tags": [],
            "category": "hat",
            "representations": [{
                "bodyShapes": ["urn:decentraland:off-chain:base-avatars:BaseMale"],
                "mainFile": main_file,
                "contents": [main_file]
            }]
        },
        "thumbnail": "thumbnail.png"
    })
}

/// Builds entities and deployments.
#[derive(Debug, Clone)]
pub struct EntityBuilder {
    entity_type: EntityType,
    pointers: Vec<Pointer>,
    timestamp: Timestamp,
    content: Vec<(String, ContentHash)>,
    files: DeploymentFiles,
    metadata: Option<Value>,
    version: EntityVersion,
    migrated_from: Option<EntityVersion>,
    original_metadata: Option<EntityVersion>,
    deployed_timestamp: Option<Timestamp>,
    id: Option<String>,
}

impl EntityBuilder {
    /// Starts an entity of `entity_type`, timestamped now, for protocol V4.
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            pointers: Vec::new(),
            timestamp: system_now(),
            content: Vec::new(),
            files: DeploymentFiles::new(),
            metadata: None,
            version: EntityVersion::V4,
            migrated_from: None,
            original_metadata: None,
            deployed_timestamp: None,
            id: None,
        }
    }

    /// A scene on `parcels` with valid metadata.
    pub fn scene(parcels: &[&str]) -> Self {
        Self::new(EntityType::Scene)
            .pointers(parcels)
            .metadata(scene_metadata(parcels))
    }

    /// A profile of `address` with valid metadata and uploaded snapshots.
    pub fn profile(address: &str) -> Self {
        let face = b"face snapshot".as_slice();
        let body = b"body snapshot".as_slice();
        Self::new(EntityType::Profile)
            .pointers(&[address])
            .metadata(profile_metadata(
                address,
                &hashing::ipfs_hash(face),
                &hashing::ipfs_hash(body),
            ))
            .file("face256.png", face)
            .file("body.png", body)
    }

    /// A wearable with valid metadata and an uploaded model.
    pub fn wearable(urn: &str) -> Self {
        Self::new(EntityType::Wearable)
            .pointers(&[urn])
            .metadata(wearable_metadata(urn, "model.glb"))
            .file("model.glb", b"glTF".as_slice())
    }

    /// Sets the pointers.
    pub fn pointers(mut self, pointers: &[&str]) -> Self {
        self.pointers = pointers.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Sets the entity timestamp.
    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets the protocol version.
    pub fn version(mut self, version: EntityVersion) -> Self {
        self.version = version;
        self
    }

    /// Uploads `bytes` and references them as `name`.
    pub fn file(mut self, name: &str, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let hash = hashing::ipfs_hash(&bytes);
        self.content.push((name.to_string(), hash.clone()));
        self.files.insert(hash, bytes);
        self
    }

    /// References `hash` as `name` without uploading it.
    pub fn reference(mut self, name: &str, hash: impl Into<ContentHash>) -> Self {
        self.content.push((name.to_string(), hash.into()));
        self
    }

    /// Uploads `bytes` without referencing them.
    pub fn upload(mut self, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        self.files.insert(hashing::ipfs_hash(&bytes), bytes);
        self
    }

    /// Sets the metadata.
    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Removes the metadata.
    pub fn without_metadata(mut self) -> Self {
        self.metadata = None;
        self
    }

    /// Marks the entity as migrated from `version` (`migrationData`).
    pub fn migrated_from(mut self, version: EntityVersion) -> Self {
        self.migrated_from = Some(version);
        self
    }

    /// Marks the entity as migrated from `version` (`originalMetadata`).
    pub fn original_metadata(mut self, version: EntityVersion) -> Self {
        self.original_metadata = Some(version);
        self
    }

    /// Sets the deployed timestamp reported by peers.
    pub fn deployed_at(mut self, timestamp: Timestamp) -> Self {
        self.deployed_timestamp = Some(timestamp);
        self
    }

    /// Overrides the computed id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builds the entity.
    pub fn entity(&self) -> Entity {
        let id = self.id.clone().unwrap_or_else(|| self.computed_id());
        let mut entity = Entity::new(id, self.entity_type, self.pointers.clone(), self.timestamp);
        for (name, hash) in &self.content {
            entity = entity.with_content(name.clone(), hash.clone());
        }
        entity.metadata = self.metadata.clone();
        entity
    }

    /// Builds the audit info for a given chain.
    pub fn audit_info(&self, auth_chain: AuthChain) -> AuditInfo {
        let mut audit = AuditInfo::new(self.version, auth_chain)
            .with_deployed_timestamp(self.deployed_timestamp.unwrap_or(self.timestamp));
        if let Some(version) = self.migrated_from {
            audit = audit.with_migration_data(MigrationData::new(version));
        }
        if let Some(version) = self.original_metadata {
            audit = audit.with_original_metadata(MigrationData::new(version));
        }
        audit
    }

    /// Builds a deployment signed by `signer`, with the uploaded files.
    pub fn build(self, signer: &Identity) -> DeploymentToValidate {
        let entity = self.entity();
        let audit = self.audit_info(signer.sign(&entity.id));
        DeploymentToValidate::new(entity, audit).with_files(self.files)
    }

    /// Builds a deployment with an empty auth chain.
    pub fn build_unsigned(self) -> DeploymentToValidate {
        let entity = self.entity();
        let audit = self.audit_info(AuthChain::new());
        DeploymentToValidate::new(entity, audit).with_files(self.files)
    }

    /// Builds the record a peer reports, plus the files it serves.
    pub fn build_synced(self, signer: &Identity) -> (DeploymentWithAuditInfo, DeploymentFiles) {
        let deployment = self.build(signer);
        (
            DeploymentWithAuditInfo::new(deployment.entity, deployment.audit_info),
            deployment.files,
        )
    }

    fn computed_id(&self) -> String {
        let canonical = json!({
            "type": self.entity_type.as_str(),
            "pointers": self.pointers,
            "timestamp": self.timestamp,
            "content": self.content,
            "metadata": self.metadata,
        });
        hashing::ipfs_hash(canonical.to_string().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_well_formed_and_distinct() {
        let a = EntityBuilder::scene(&["0,0"]).timestamp(1).entity();
        let b = EntityBuilder::scene(&["0,0"]).timestamp(2).entity();
        assert!(hashing::is_valid_ipfs_hash(&a.id));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn files_are_uploaded_and_referenced() {
        let deployment = EntityBuilder::scene(&["0,0"])
            .file("bin/game.js", b"code".as_slice())
            .build(&Identity::from_seed(1));
        let hash = hashing::ipfs_hash(b"code");
        assert!(deployment.entity.references(&hash));
        assert!(deployment.files.contains_key(&hash));
        assert_eq!(deployment.audit_info.auth_chain.len(), 2);
    }

    #[test]
    fn seeded_identities_are_deterministic() {
        assert_eq!(Identity::from_seed(7).address(), Identity::from_seed(7).address());
        assert_ne!(Identity::from_seed(7).address(), Identity::from_seed(8).address());
    }
}
