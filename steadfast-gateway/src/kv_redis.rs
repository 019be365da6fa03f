//! Redis backend for the SDK's key-value port. Gives breaker records and
//! metrics aggregates cross-process truth; the in-memory backend remains the
//! default for single-process deployments.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use steadfast_sdk::kv::{KvError, KvStore, PutOptions};

pub struct RedisKvStore {
    conn: ConnectionManager,
}

impl RedisKvStore {
    /// Connect and build a managed connection that reconnects on failure.
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(url)
            .map_err(|e| KvError::new(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| KvError::new(format!("redis connection failed: {e}")))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| KvError::new(format!("redis GET failed: {e}")))
    }

    async fn put(&self, key: &str, value: Vec<u8>, opts: PutOptions) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        match opts.ttl {
            Some(ttl) => {
                let mut cmd = redis::cmd("SET");
                cmd.arg(key).arg(value).arg("PX").arg(ttl.as_millis() as u64);
                cmd.query_async::<_, ()>(&mut conn)
                    .await
                    .map_err(|e| KvError::new(format!("redis SET failed: {e}")))
            }
            None => conn
                .set(key, value)
                .await
                .map_err(|e| KvError::new(format!("redis SET failed: {e}"))),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        conn.del(key)
            .await
            .map_err(|e| KvError::new(format!("redis DEL failed: {e}")))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut keys = Vec::new();
        let mut iter = conn
            .scan_match::<_, String>(&pattern)
            .await
            .map_err(|e| KvError::new(format!("redis SCAN failed: {e}")))?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        keys.sort();
        Ok(keys)
    }
}
