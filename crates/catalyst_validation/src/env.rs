//! Static configuration handed to every rule.

use crate::access::{AccessChecker, ProfileOwnershipChecker};
use crate::auth::ContentAuthenticator;
use crate::schema::SchemaRegistry;
use catalyst_protocol::{EntityType, Timestamp};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const MB: u64 = 1024 * 1024;

/// Server environment for the validation pipeline.
#[derive(Clone)]
pub struct ServerEnvironment {
    /// Maximum upload size per pointer, in MB, for each entity type.
    pub max_upload_size_per_type_mb: HashMap<EntityType, u64>,
    /// How far in the past an entity timestamp may be.
    pub request_ttl_backwards: Duration,
    /// How far in the future an entity timestamp may be.
    pub request_ttl_forwards: Duration,
    /// Authorization chain verifier.
    pub authenticator: ContentAuthenticator,
    /// Pointer access control.
    pub access_checker: Arc<dyn AccessChecker>,
    /// Metadata schemas per entity type.
    pub schemas: Arc<SchemaRegistry>,
    clock: fn() -> Timestamp,
}

impl ServerEnvironment {
    /// Creates an environment with the default limits.
    pub fn new() -> Self {
        Self {
            max_upload_size_per_type_mb: HashMap::from([
                (EntityType::Scene, 15),
                (EntityType::Profile, 2),
                (EntityType::Wearable, 3),
            ]),
            request_ttl_backwards: Duration::from_secs(10 * 60),
            request_ttl_forwards: Duration::from_secs(15 * 60),
            authenticator: ContentAuthenticator::new(),
            access_checker: Arc::new(ProfileOwnershipChecker),
            schemas: Arc::new(SchemaRegistry::standard()),
            clock: system_now,
        }
    }

    /// Sets the maximum upload size per pointer for an entity type.
    pub fn with_max_upload_size(mut self, entity_type: EntityType, megabytes: u64) -> Self {
        self.max_upload_size_per_type_mb.insert(entity_type, megabytes);
        self
    }

    /// Removes every upload size limit.
    pub fn without_upload_sizes(mut self) -> Self {
        self.max_upload_size_per_type_mb.clear();
        self
    }

    /// Sets the backwards freshness window.
    pub fn with_request_ttl_backwards(mut self, ttl: Duration) -> Self {
        self.request_ttl_backwards = ttl;
        self
    }

    /// Sets the forward tolerance.
    pub fn with_request_ttl_forwards(mut self, ttl: Duration) -> Self {
        self.request_ttl_forwards = ttl;
        self
    }

    /// Sets the access checker.
    pub fn with_access_checker(mut self, checker: Arc<dyn AccessChecker>) -> Self {
        self.access_checker = checker;
        self
    }

    /// Sets the schema registry.
    pub fn with_schemas(mut self, schemas: SchemaRegistry) -> Self {
        self.schemas = Arc::new(schemas);
        self
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: fn() -> Timestamp) -> Self {
        self.clock = clock;
        self
    }

    /// Current time according to the environment clock.
    pub fn now(&self) -> Timestamp {
        (self.clock)()
    }

    /// Maximum upload size per pointer in bytes, if the type is configured.
    pub fn max_upload_size_bytes(&self, entity_type: EntityType) -> Option<u64> {
        self.max_upload_size_per_type_mb
            .get(&entity_type)
            .map(|mb| mb.saturating_mul(MB))
    }
}

impl Default for ServerEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServerEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerEnvironment")
            .field("max_upload_size_per_type_mb", &self.max_upload_size_per_type_mb)
            .field("request_ttl_backwards", &self.request_ttl_backwards)
            .field("request_ttl_forwards", &self.request_ttl_forwards)
            .finish_non_exhaustive()
    }
}

/// Milliseconds since the Unix epoch from the system clock.
pub fn system_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}
