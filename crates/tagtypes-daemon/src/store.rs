//! Versioned key-value storage for tag definition payloads
//!
//! The manager persists its table through a [`StorageAdapter`], a narrow
//! load/save/remove seam keyed by name. The production implementation is
//! [`JsonFileStore`], one JSON file per key under a storage directory.
//! Storage I/O failures are reported to the caller, which treats them as
//! "no data" rather than fatal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted blob shape: format version, freshness timestamp and the
/// record table keyed by stringified type ID
///
/// `last_update` stays a raw string and individual records stay raw JSON
/// so one malformed entry never rejects the whole payload; the manager
/// parses both leniently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPayload {
    pub version: u32,
    #[serde(default)]
    pub last_update: Option<String>,
    #[serde(default)]
    pub tag_types: HashMap<String, Value>,
}

/// Generic load/save of a versioned payload under a namespaced key
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Load the payload stored under `key`, `None` when absent
    async fn load(&self, key: &str) -> Result<Option<StoredPayload>, StoreError>;

    /// Save `payload` under `key`, replacing any previous value
    async fn save(&self, key: &str, payload: &StoredPayload) -> Result<(), StoreError>;

    /// Remove the payload stored under `key`, if any
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Filesystem-backed store: one pretty-printed JSON file per key
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl StorageAdapter for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<StoredPayload>, StoreError> {
        let path = self.key_path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let payload: StoredPayload = serde_json::from_str(&content)?;
        Ok(Some(payload))
    }

    async fn save(&self, key: &str, payload: &StoredPayload) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_string_pretty(payload)?;
        tokio::fs::write(self.key_path(key), content).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.key_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_payload() -> StoredPayload {
        StoredPayload {
            version: 1,
            last_update: Some("2026-01-10T12:00:00+00:00".to_string()),
            tag_types: HashMap::from([(
                "1".to_string(),
                serde_json::json!({"version": 5, "name": "M2 2.9\"", "width": 296, "height": 128}),
            )]),
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().to_path_buf());

        store.save("tagtypes", &sample_payload()).await.unwrap();
        let loaded = store.load("tagtypes").await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.tag_types.len(), 1);
        assert!(loaded.tag_types.contains_key("1"));
    }

    #[tokio::test]
    async fn test_load_absent() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().to_path_buf());
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().to_path_buf());

        store.save("tagtypes", &sample_payload()).await.unwrap();
        store.remove("tagtypes").await.unwrap();
        assert!(store.load("tagtypes").await.unwrap().is_none());

        // Removing an absent key is not an error
        store.remove("tagtypes").await.unwrap();
    }
}
