//! Process-local durable store.

use std::collections::HashMap;

use async_trait::async_trait;
use chatsync_core::error::Result;
use chatsync_core::store::DurableStore;
use tokio::sync::RwLock;

/// [`DurableStore`] that lives only as long as the process. Used for
/// ephemeral runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}
