//! Durable key/value store trait.
//!
//! The engine never touches files or browser-style storage directly. One
//! store instance is constructed per process and injected into the
//! components that own each key.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ChatSyncError, Result};

/// Key under which the identity registry persists its records.
pub const IDENTITIES_KEY: &str = "chatsync.identities.v1";
/// Key under which the active session is persisted.
pub const SESSION_KEY: &str = "chatsync.session.v1";

/// Key/value persistence that survives process restarts.
///
/// Values are opaque strings; components store JSON documents through
/// [`load_json`] and [`save_json`].
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Loads and decodes a JSON document stored under `key`.
///
/// A value that no longer decodes is reported as a storage error rather than
/// silently replaced.
pub async fn load_json<T>(store: &dyn DurableStore, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    match store.get(key).await? {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| ChatSyncError::storage(format!("corrupt value under '{}': {}", key, e))),
        _ => Ok(None),
    }
}

/// Encodes `value` as JSON and stores it under `key`.
pub async fn save_json<T>(store: &dyn DurableStore, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value)
        .map_err(|e| ChatSyncError::storage(format!("failed to encode '{}': {}", key, e)))?;
    store.set(key, raw).await
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryStore;
    use super::*;

    #[tokio::test]
    async fn test_json_helpers_round_trip_and_report_corruption() {
        let store = MemoryStore::new();
        save_json(&store, "k", &vec!["a", "b"]).await.unwrap();
        let loaded: Option<Vec<String>> = load_json(&store, "k").await.unwrap();
        assert_eq!(loaded, Some(vec!["a".to_string(), "b".to_string()]));

        store.set("bad", "{not json".to_string()).await.unwrap();
        let err = load_json::<Vec<String>>(&store, "bad").await.unwrap_err();
        assert!(matches!(err, ChatSyncError::Storage(_)));

        let missing: Option<Vec<String>> = load_json(&store, "missing").await.unwrap();
        assert!(missing.is_none());
    }
}
