//! Metadata schemas per entity type.
//!
//! Schemas are typed `serde` models plus the structural checks JSON types
//! cannot express (non-empty lists, required snapshot keys). Unknown fields
//! are ignored so newer clients can add optional data.

use catalyst_protocol::EntityType;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;

/// Validates the metadata of one entity type.
pub trait EntitySchema: Send + Sync {
    /// Returns true if `metadata` conforms to the schema.
    fn validate(&self, metadata: &Value) -> bool;
}

/// Metadata models that carry checks beyond their shape.
pub trait CheckedMetadata: DeserializeOwned {
    /// Returns true if the deserialized value is internally consistent.
    fn is_consistent(&self) -> bool {
        true
    }
}

/// Schema backed by a typed model.
pub struct TypedSchema<T>(PhantomData<fn() -> T>);

impl<T> TypedSchema<T> {
    /// Creates the schema.
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for TypedSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CheckedMetadata> EntitySchema for TypedSchema<T> {
    fn validate(&self, metadata: &Value) -> bool {
        T::deserialize(metadata).is_ok_and(|parsed| parsed.is_consistent())
    }
}

/// Registered schemas, keyed by entity type.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: HashMap<EntityType, Box<dyn EntitySchema>>,
}

impl SchemaRegistry {
    /// Creates an empty registry; every type is accepted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the scene, profile and wearable schemas.
    pub fn standard() -> Self {
        Self::new()
            .with_schema(EntityType::Scene, TypedSchema::<SceneMetadata>::new())
            .with_schema(EntityType::Profile, TypedSchema::<ProfileMetadata>::new())
            .with_schema(EntityType::Wearable, TypedSchema::<WearableMetadata>::new())
    }

    /// Registers the schema for an entity type, replacing any previous one.
    pub fn with_schema(mut self, entity_type: EntityType, schema: impl EntitySchema + 'static) -> Self {
        self.schemas.insert(entity_type, Box::new(schema));
        self
    }

    /// Validates metadata against the schema of its type.
    ///
    /// Types without a registered schema always pass.
    pub fn validate(&self, entity_type: EntityType, metadata: &Value) -> bool {
        self.schemas
            .get(&entity_type)
            .map_or(true, |schema| schema.validate(metadata))
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("types", &self.schemas.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Scene metadata.
#[derive(Debug, Clone, Deserialize)]
#[allow(missing_docs)]
pub struct SceneMetadata {
    pub main: String,
    pub scene: SceneParcels,
}

/// Parcels a scene occupies.
#[derive(Debug, Clone, Deserialize)]
#[allow(missing_docs)]
pub struct SceneParcels {
    pub base: String,
    pub parcels: Vec<String>,
}

impl CheckedMetadata for SceneMetadata {
    fn is_consistent(&self) -> bool {
        !self.main.is_empty() && !self.scene.parcels.is_empty()
    }
}

/// Snapshot keys every avatar must provide.
pub const REQUIRED_SNAPSHOTS: [&str; 2] = ["face256", "body"];

/// Profile metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileMetadata {
    /// Avatars of the profile.
    pub avatars: Vec<Avatar>,
}

/// One avatar in a profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Avatar {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub eth_address: Option<String>,
    pub avatar: AvatarInfo,
}

/// Visual description of an avatar.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct AvatarInfo {
    pub body_shape: String,
    /// Snapshot name to content hash.
    pub snapshots: BTreeMap<String, String>,
    pub eyes: ColorSlot,
    pub hair: ColorSlot,
    pub skin: ColorSlot,
    pub wearables: Vec<String>,
}

/// A colored body part.
#[derive(Debug, Clone, Deserialize)]
#[allow(missing_docs)]
pub struct ColorSlot {
    pub color: Color,
}

/// RGB(A) color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[allow(missing_docs)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    #[serde(default)]
    pub a: Option<f64>,
}

impl Color {
    fn in_range(&self) -> bool {
        [self.r, self.g, self.b, self.a.unwrap_or(1.0)]
            .iter()
            .all(|c| (0.0..=1.0).contains(c))
    }
}

impl CheckedMetadata for ProfileMetadata {
    fn is_consistent(&self) -> bool {
        !self.avatars.is_empty()
            && self.avatars.iter().all(|avatar| {
                let info = &avatar.avatar;
                REQUIRED_SNAPSHOTS
                    .iter()
                    .all(|key| info.snapshots.contains_key(*key))
                    && [&info.eyes, &info.hair, &info.skin]
                        .iter()
                        .all(|slot| slot.color.in_range())
            })
    }
}

/// Wearable rarity tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum Rarity {
    Unique,
    Mythic,
    Exotic,
    Legendary,
    Epic,
    Rare,
    Uncommon,
    Common,
}

/// Localized text.
#[derive(Debug, Clone, Deserialize)]
#[allow(missing_docs)]
pub struct LocalizedText {
    pub code: String,
    pub text: String,
}

/// Wearable metadata.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct WearableMetadata {
    pub id: String,
    pub descriptions: Vec<LocalizedText>,
    pub collection_address: String,
    pub rarity: Rarity,
    pub names: Vec<LocalizedText>,
    pub data: WearableData,
    pub thumbnail: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// How a wearable is rendered.
#[derive(Debug, Clone, Deserialize)]
#[allow(missing_docs)]
pub struct WearableData {
    pub replaces: Vec<String>,
    pub hides: Vec<String>,
    pub tags: Vec<String>,
    pub representations: Vec<WearableRepresentation>,
    pub category: String,
}

/// Files used to render a wearable on a set of body shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct WearableRepresentation {
    pub body_shapes: Vec<String>,
    pub main_file: String,
    pub contents: Vec<String>,
    #[serde(default)]
    pub override_hides: Vec<String>,
    #[serde(default)]
    pub override_replaces: Vec<String>,
}

impl CheckedMetadata for WearableMetadata {
    fn is_consistent(&self) -> bool {
        !self.id.is_empty()
            && !self.names.is_empty()
            && !self.data.category.is_empty()
            && !self.data.representations.is_empty()
            && self.data.representations.iter().all(|repr| {
                !repr.body_shapes.is_empty() && repr.contents.contains(&repr.main_file)
            })
    }
}
