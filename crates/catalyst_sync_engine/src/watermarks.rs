//! Watermark persistence.
//!
//! Watermarks live in a generic key/value system-properties store under
//! [`LAST_KNOWN_LOCAL_DEPLOYMENTS`]. They are read once at start and written
//! after each round.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use catalyst_protocol::{ServerAddress, Timestamp};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Key under which per-peer watermarks are stored.
pub const LAST_KNOWN_LOCAL_DEPLOYMENTS: &str = "last_known_local_deployments";

/// Highest deployed timestamp synchronized from each peer.
pub type Watermarks = BTreeMap<ServerAddress, Timestamp>;

/// A key/value store for node-wide properties.
#[async_trait]
pub trait SystemPropertiesStore: Send + Sync {
    /// Reads a property.
    async fn get(&self, key: &str) -> SyncResult<Option<Value>>;

    /// Writes a property.
    async fn set(&self, key: &str, value: Value) -> SyncResult<()>;
}

/// In-memory property store for testing.
#[derive(Debug, Default)]
pub struct MemoryPropertiesStore {
    properties: RwLock<HashMap<String, Value>>,
    failing: RwLock<bool>,
}

impl MemoryPropertiesStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.write() = failing;
    }

    fn check(&self) -> SyncResult<()> {
        if *self.failing.read() {
            return Err(SyncError::PropertyStore("store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SystemPropertiesStore for MemoryPropertiesStore {
    async fn get(&self, key: &str) -> SyncResult<Option<Value>> {
        self.check()?;
        Ok(self.properties.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> SyncResult<()> {
        self.check()?;
        self.properties.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// Property store kept in a single JSON object on disk.
///
/// Writes go to a temporary file that is synced and renamed over the
/// previous one.
#[derive(Debug)]
pub struct JsonFilePropertiesStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFilePropertiesStore {
    /// Creates a store backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> SyncResult<serde_json::Map<String, Value>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(serde_json::Map::new()),
            Err(e) => return Err(e.into()),
        };
        if data.is_empty() {
            return Ok(serde_json::Map::new());
        }
        serde_json::from_slice(&data).map_err(|e| {
            SyncError::PropertyStore(format!("{} is not a JSON object: {e}", self.path.display()))
        })
    }
}

#[async_trait]
impl SystemPropertiesStore for JsonFilePropertiesStore {
    async fn get(&self, key: &str) -> SyncResult<Option<Value>> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> SyncResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut properties = self.load().await?;
        properties.insert(key.to_string(), value);

        let data = serde_json::to_vec_pretty(&properties)
            .map_err(|e| SyncError::Codec(e.to_string()))?;
        let temp_path = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path).await?;
        debug!(path = %self.path.display(), key, "system property written");
        Ok(())
    }
}

/// Typed access to the properties the sync engine uses.
#[derive(Clone)]
pub struct SystemPropertiesManager {
    store: Arc<dyn SystemPropertiesStore>,
}

impl SystemPropertiesManager {
    /// Wraps a property store.
    pub fn new(store: Arc<dyn SystemPropertiesStore>) -> Self {
        Self { store }
    }

    /// Reads the stored watermarks; empty if none were saved yet.
    pub async fn get_last_known_local_deployments(&self) -> SyncResult<Watermarks> {
        match self.store.get(LAST_KNOWN_LOCAL_DEPLOYMENTS).await? {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                SyncError::PropertyStore(format!("invalid {LAST_KNOWN_LOCAL_DEPLOYMENTS}: {e}"))
            }),
            None => Ok(Watermarks::new()),
        }
    }

    /// Stores the watermarks.
    pub async fn set_last_known_local_deployments(&self, watermarks: &Watermarks) -> SyncResult<()> {
        let value = serde_json::to_value(watermarks).map_err(|e| SyncError::Codec(e.to_string()))?;
        self.store.set(LAST_KNOWN_LOCAL_DEPLOYMENTS, value).await
    }
}

impl std::fmt::Debug for SystemPropertiesManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemPropertiesManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_watermarks_are_empty() {
        let manager = SystemPropertiesManager::new(Arc::new(MemoryPropertiesStore::new()));
        assert!(manager.get_last_known_local_deployments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn watermarks_roundtrip_as_object() {
        let store = Arc::new(MemoryPropertiesStore::new());
        let manager = SystemPropertiesManager::new(store.clone());
        let watermarks = Watermarks::from([("https://a.example.com".to_string(), 42)]);

        manager.set_last_known_local_deployments(&watermarks).await.unwrap();

        let raw = store.get(LAST_KNOWN_LOCAL_DEPLOYMENTS).await.unwrap().unwrap();
        assert_eq!(raw, json!({ "https://a.example.com": 42 }));
        assert_eq!(manager.get_last_known_local_deployments().await.unwrap(), watermarks);
    }

    #[tokio::test]
    async fn malformed_watermarks_are_an_error() {
        let store = Arc::new(MemoryPropertiesStore::new());
        store.set(LAST_KNOWN_LOCAL_DEPLOYMENTS, json!(["nope"])).await.unwrap();

        let manager = SystemPropertiesManager::new(store);
        assert!(matches!(
            manager.get_last_known_local_deployments().await,
            Err(SyncError::PropertyStore(_))
        ));
    }

    #[tokio::test]
    async fn failing_store() {
        let store = MemoryPropertiesStore::new();
        store.set_failing(true);
        assert!(store.get("key").await.is_err());
        assert!(store.set("key", json!(1)).await.is_err());
    }
}
