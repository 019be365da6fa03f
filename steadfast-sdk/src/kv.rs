//! # Key-Value Store Port
//!
//! Thin port over the key-value backend that holds circuit breaker records
//! and aggregated provider metrics. The core never talks to a concrete
//! store; it goes through [`KvStore`], which the embedding host backs with
//! an in-memory map, Redis, or whatever it runs on.
//!
//! Keys in use:
//! - `circuit-breaker:<provider>` - one breaker record per provider, no TTL.
//! - `metrics:<provider>:current` - aggregated provider metrics, 7-day TTL.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Key-value backend failure.
#[derive(Debug, Error)]
#[error("kv backend error: {message}")]
pub struct KvError {
    pub message: String,
}

impl KvError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Options applied to a put.
#[derive(Debug, Clone, Copy, Default)]
pub struct PutOptions {
    /// Expire the entry after this duration; `None` keeps it forever
    pub ttl: Option<Duration>,
}

impl PutOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

/// Trait for persistent key-value access.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get the value for a key. Returns `None` if not found or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Set a value, overwriting any previous one.
    async fn put(&self, key: &str, value: Vec<u8>, opts: PutOptions) -> Result<(), KvError>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// List all keys starting with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, KvError>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<SystemTime>,
}

impl Entry {
    fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory [`KvStore`] backend.
///
/// Default backend for single-process deployments and tests. Expired entries
/// are dropped lazily on read.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, Entry>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let now = SystemTime::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(now) {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: Vec<u8>, opts: PutOptions) -> Result<(), KvError> {
        let expires_at = opts.ttl.map(|ttl| SystemTime::now() + ttl);
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let now = SystemTime::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let store = MemoryKvStore::new();
        store
            .put("a", b"one".to_vec(), PutOptions::default())
            .await
            .unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"one".to_vec()));

        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        // deleting again is fine
        store.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn expired_entries_vanish() {
        let store = MemoryKvStore::new();
        store
            .put(
                "ttl",
                b"gone".to_vec(),
                PutOptions::with_ttl(Duration::from_millis(10)),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("ttl").await.unwrap(), None);
        assert!(store.list("ttl").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = MemoryKvStore::new();
        for key in ["metrics:openai:current", "metrics:gemini:current", "other"] {
            store
                .put(key, b"x".to_vec(), PutOptions::default())
                .await
                .unwrap();
        }
        let keys = store.list("metrics:").await.unwrap();
        assert_eq!(
            keys,
            vec!["metrics:gemini:current", "metrics:openai:current"]
        );
    }
}
