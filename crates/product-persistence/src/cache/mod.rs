//! # Cache Module
//!
//! Advisory key/value cache in front of the record store.
//!
//! [`CacheBackend`] is the raw `GET` / `SET EX` / `DEL` / `PING` surface and
//! reports every failure. [`CacheClient`] layers JSON encoding on top and
//! applies the degradation policy: reads turn failures into misses, writes
//! turn them into `false`, and only invalidation hands the error back so the
//! write path can surface it.

#[cfg(feature = "redis")]
pub mod redis_client;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::Result;

#[cfg(feature = "redis")]
pub use redis_client::{CacheConfig, RedisCache};

/// Raw cache operations. Implementations report failures as
/// [`PersistenceError::Cache`](crate::PersistenceError::Cache).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// `GET key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// `SET key value EX ttl`
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// `DEL key`, returning whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// `PING`
    async fn ping(&self) -> Result<()>;
}

/// Cache client applying the degrade-don't-fail policy.
#[derive(Clone)]
pub struct CacheClient {
    backend: Arc<dyn CacheBackend>,
}

impl CacheClient {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Get a JSON value from cache. Unreachable cache and undecodable entries
    /// both read as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(%key, "Cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "Cache unavailable, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!(%key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "Undecodable cache entry, treating as miss");
                None
            }
        }
    }

    /// Set a JSON value with TTL. Returns `false` if the entry was not stored.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(%key, error = %e, "Cannot encode cache entry");
                return false;
            }
        };

        match self.backend.set_ex(key, json, ttl).await {
            Ok(()) => {
                tracing::debug!(%key, ttl_secs = ttl.as_secs(), "Cache set");
                true
            }
            Err(e) => {
                tracing::warn!(%key, error = %e, "Failed to populate cache");
                false
            }
        }
    }

    /// Delete a key, returning whether it was present.
    ///
    /// # Errors
    ///
    /// Returns the backend error. A failed invalidation can leave a wrong
    /// entry in place, so the caller decides how to report it.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let deleted = self.backend.delete(key).await?;
        tracing::debug!(%key, deleted, "Cache invalidation");
        Ok(deleted)
    }

    /// Liveness probe.
    pub async fn ping(&self) -> bool {
        match self.backend.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Cache ping failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCache;
    use product_domain::{Product, cache_key};

    fn sample() -> Product {
        Product {
            id: 1,
            name: "Desk lamp".to_string(),
            price_cents: 2_499,
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_json_roundtrip_and_ttl() {
        let backend = Arc::new(MemoryCache::new());
        let client = CacheClient::new(backend.clone());
        let key = cache_key(1);
        let product = sample();

        assert!(client.set_json(&key, &product, Duration::from_secs(60)).await);
        assert_eq!(client.get_json::<Product>(&key).await, Some(product));
        assert_eq!(backend.ttl_of(&key), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_unreachable_cache_degrades() {
        let backend = Arc::new(MemoryCache::new());
        let client = CacheClient::new(backend.clone());
        backend.set_reachable(false);

        assert_eq!(client.get_json::<Product>("product:1").await, None);
        assert!(!client.set_json("product:1", &sample(), Duration::from_secs(60)).await);
        assert!(client.delete("product:1").await.is_err());
        assert!(!client.ping().await);
    }

    #[tokio::test]
    async fn test_garbage_entry_is_a_miss() {
        let backend = Arc::new(MemoryCache::new());
        backend
            .set_ex("product:9", "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let client = CacheClient::new(backend);
        assert_eq!(client.get_json::<Product>("product:9").await, None);
    }

    #[tokio::test]
    async fn test_repeated_delete_is_idempotent() {
        let client = CacheClient::new(Arc::new(MemoryCache::new()));
        assert!(client.set_json("product:3", &sample(), Duration::from_secs(60)).await);

        assert!(client.delete("product:3").await.unwrap());
        assert!(!client.delete("product:3").await.unwrap());
        assert!(!client.delete("product:3").await.unwrap());
    }
}
