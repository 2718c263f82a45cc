//! Content-addressed entities.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Logical slot an entity claims (a parcel coordinate, a user address, ...).
pub type Pointer = String;

/// A content-address hash in its textual (CID) form.
pub type ContentHash = String;

/// Entity identifier: the content hash of the entity's own file.
pub type EntityId = ContentHash;

/// Kind of deployable document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A scene occupying one or more parcels.
    Scene,
    /// A user profile, pointed by the owner's address.
    Profile,
    /// A wearable item.
    Wearable,
}

impl EntityType {
    /// Every known entity type.
    pub const ALL: [EntityType; 3] = [EntityType::Scene, EntityType::Profile, EntityType::Wearable];

    /// Returns the wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Scene => "scene",
            EntityType::Profile => "profile",
            EntityType::Wearable => "wearable",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::UnknownEntityType(s.to_string()))
    }
}

/// A deployable document.
///
/// Entities are immutable once created and identified by `id`, the content
/// hash of their canonical file. `content` maps logical file names to the
/// hashes of the files the entity references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Content hash of the entity file.
    pub id: EntityId,
    /// Entity type.
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Creation time chosen by the author.
    pub timestamp: Timestamp,
    /// Slots claimed by this entity.
    pub pointers: Vec<Pointer>,
    /// Logical file name to content hash.
    #[serde(default)]
    pub content: BTreeMap<String, ContentHash>,
    /// Type-specific metadata document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Entity {
    /// Creates an entity without content or metadata.
    pub fn new(
        id: impl Into<EntityId>,
        entity_type: EntityType,
        pointers: Vec<Pointer>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type,
            timestamp,
            pointers,
            content: BTreeMap::new(),
            metadata: None,
        }
    }

    /// Adds a referenced content file.
    pub fn with_content(mut self, file: impl Into<String>, hash: impl Into<ContentHash>) -> Self {
        self.content.insert(file.into(), hash.into());
        self
    }

    /// Sets the metadata document.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Returns the distinct content hashes referenced by the entity.
    pub fn referenced_hashes(&self) -> BTreeSet<&str> {
        self.content.values().map(String::as_str).collect()
    }

    /// Returns true if the entity references the given hash.
    pub fn references(&self, hash: &str) -> bool {
        self.content.values().any(|h| h == hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_round_trips_through_str() {
        for t in EntityType::ALL {
            assert_eq!(t.as_str().parse::<EntityType>().unwrap(), t);
        }
        assert_eq!("SCENE".parse::<EntityType>().unwrap(), EntityType::Scene);
        assert!("store".parse::<EntityType>().is_err());
    }

    #[test]
    fn referenced_hashes_are_deduplicated() {
        let entity = Entity::new("id", EntityType::Scene, vec!["0,0".into()], 1)
            .with_content("a.png", "h1")
            .with_content("b.png", "h1")
            .with_content("c.glb", "h2");

        let hashes = entity.referenced_hashes();
        assert_eq!(hashes.len(), 2);
        assert!(entity.references("h2"));
        assert!(!entity.references("h3"));
    }

    #[test]
    fn entity_json_shape() {
        let entity = Entity::new("id", EntityType::Wearable, vec!["urn:w".into()], 7)
            .with_content("model.glb", "h");
        let json = serde_json::to_value(&entity).unwrap();

        assert_eq!(json["type"], "wearable");
        assert_eq!(json["content"]["model.glb"], "h");
        assert!(json.get("metadata").is_none());
    }
}
