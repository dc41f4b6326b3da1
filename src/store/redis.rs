use super::KeyValueStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tracing::debug;

const SCAN_BATCH: usize = 100;

/// Redis-backed store. The namespace plays the role of the directory scope:
/// every key is stored as `{namespace}:{key}` and `clear_all` only removes
/// keys under that prefix.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
    namespace: String,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, namespace: impl Into<String>) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| Error::StoreUnavailable(format!("Failed to create Redis client: {}", e)))?;

        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            connection,
            namespace: namespace.into(),
        })
    }

    pub async fn ping(&self) -> Result<String> {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| Error::StoreUnavailable(format!("Ping failed: {}", e)))
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn scan_pattern(&self) -> String {
        format!("{}:*", escape_glob(&self.namespace))
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        redis::cmd("GET")
            .arg(self.namespaced(key))
            .query_async::<_, Option<Vec<u8>>>(&mut conn)
            .await
            .map_err(|e| Error::StoreUnavailable(format!("GET failed: {}", e)))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("SET")
            .arg(self.namespaced(key))
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| Error::StoreUnavailable(format!("SET failed: {}", e)))
    }

    async fn clear_all(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let pattern = self.scan_pattern();
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| Error::StoreUnavailable(format!("SCAN failed: {}", e)))?;

            if !keys.is_empty() {
                removed += keys.len();
                redis::cmd("DEL")
                    .arg(&keys)
                    .query_async::<_, ()>(&mut conn)
                    .await
                    .map_err(|e| Error::StoreUnavailable(format!("DEL failed: {}", e)))?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(namespace = %self.namespace, removed, "Cleared Redis namespace");
        Ok(())
    }
}

fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
