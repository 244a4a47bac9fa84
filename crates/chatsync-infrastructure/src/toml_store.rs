//! Durable store persisted as a single TOML document.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chatsync_core::error::{ChatSyncError, Result};
use chatsync_core::store::DurableStore;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::storage::{AtomicTomlError, AtomicTomlFile};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    values: BTreeMap<String, String>,
}

/// [`DurableStore`] backed by one atomically replaced TOML file.
///
/// File I/O runs on the blocking pool. Reads are served from an in-memory
/// copy filled on first access and refreshed after every write.
pub struct TomlFileStore {
    file: Arc<AtomicTomlFile<StoreDocument>>,
    cache: RwLock<Option<BTreeMap<String, String>>>,
}

impl TomlFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            file: Arc::new(AtomicTomlFile::new(path)),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }

    async fn load_values(&self) -> Result<BTreeMap<String, String>> {
        if let Some(values) = self.cache.read().await.as_ref() {
            return Ok(values.clone());
        }

        let file = self.file.clone();
        let document = tokio::task::spawn_blocking(move || file.load())
            .await
            .map_err(|e| ChatSyncError::storage(format!("store task failed: {}", e)))?
            .map_err(storage_error)?
            .unwrap_or_default();

        *self.cache.write().await = Some(document.values.clone());
        Ok(document.values)
    }

    async fn modify<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) + Send + 'static,
    {
        let mut cache = self.cache.write().await;
        let file = self.file.clone();
        let document = tokio::task::spawn_blocking(move || {
            file.update(StoreDocument::default(), |doc| f(&mut doc.values))
        })
        .await
        .map_err(|e| ChatSyncError::storage(format!("store task failed: {}", e)))?
        .map_err(storage_error)?;

        *cache = Some(document.values);
        Ok(())
    }
}

fn storage_error(err: AtomicTomlError) -> ChatSyncError {
    ChatSyncError::storage(err.to_string())
}

#[async_trait]
impl DurableStore for TomlFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load_values().await?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.modify(move |values| {
            values.insert(key, value);
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.modify(move |values| {
            values.remove(&key);
        })
        .await
    }
}
