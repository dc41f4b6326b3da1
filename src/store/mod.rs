//! Persistent key-value stores backing the throttle engine.
//!
//! Keys are opaque strings and values opaque byte blobs. A store is scoped
//! (a directory, or a Redis key namespace) and `clear_all` wipes that scope.

pub mod file;
pub mod redis;

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

pub use file::FileStore;
pub use self::redis::RedisStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored under `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove every record in this store's scope.
    async fn clear_all(&self) -> Result<()>;
}

/// Process-local store. State is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|e| Error::StoreUnavailable(format!("Lock error: {}", e)))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get("missing").await.unwrap().is_none());

        store.set("db timeout", b"2024-01-01T00:00:00Z").await.unwrap();
        assert_eq!(
            store.get("db timeout").await.unwrap().as_deref(),
            Some(&b"2024-01-01T00:00:00Z"[..])
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_clear_all() {
        let store = MemoryStore::new();
        store.set("a", b"1").await.unwrap();
        store.set("b", b"2").await.unwrap();

        store.clear_all().await.unwrap();
        assert!(store.is_empty());
    }
}
