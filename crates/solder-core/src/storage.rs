//! Opaque key-value persistence boundary.
//!
//! The core persists very little: the prefix table and the joined-channel
//! list.  Both are stored as JSON values under well-known keys through the
//! [`Storage`] trait; what backs it (a flat file, a database row) is the
//! embedder's concern.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{CoreError, CoreResult};

/// Storage key for the per-channel prefix table.
pub const PREFIXES_KEY: &str = "prefixes";

/// Storage key for the joined-channel list.
pub const CHANNELS_KEY: &str = "channels";

/// Load/save of opaque JSON values.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Loads the value stored under `key`, if any.
    async fn load(&self, key: &str) -> CoreResult<Option<serde_json::Value>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn save(&self, key: &str, value: serde_json::Value) -> CoreResult<()>;
}

/// Volatile in-memory storage.
#[derive(Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load(&self, key: &str) -> CoreResult<Option<serde_json::Value>> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn save(&self, key: &str, value: serde_json::Value) -> CoreResult<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// Wraps an arbitrary error into [`CoreError::Storage`].
pub fn storage_error(err: impl std::fmt::Display) -> CoreError {
    CoreError::Storage(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trip() {
        let storage = MemoryStorage::new();
        assert!(storage.load(PREFIXES_KEY).await.unwrap().is_none());

        storage
            .save(PREFIXES_KEY, serde_json::json!({"twitch:lobby": "$"}))
            .await
            .unwrap();
        let loaded = storage.load(PREFIXES_KEY).await.unwrap().unwrap();
        assert_eq!(loaded["twitch:lobby"], "$");
    }
}
