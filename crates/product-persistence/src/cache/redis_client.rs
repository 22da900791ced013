//! # Redis Cache Layer
//!
//! Redis implementation of [`CacheBackend`] with explicit timeouts.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client};
use tokio::sync::OnceCell;

use super::CacheBackend;
use crate::error::Result;

/// Redis cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    /// Reconnect attempts after a timed-out or dropped connection.
    pub retries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            connect_timeout: Duration::from_secs(2),
            response_timeout: Duration::from_secs(2),
            retries: 1,
        }
    }
}

/// Redis cache backend.
///
/// The connection is established on first use. A Redis that is down when the
/// service starts costs cache hits, not availability; later calls retry the
/// connect.
pub struct RedisCache {
    client: Client,
    conn: OnceCell<ConnectionManager>,
    config: CacheConfig,
}

impl RedisCache {
    /// Create a new cache backend. Only parses the URL; no I/O.
    pub fn new(config: CacheConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            config,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let manager_config = ConnectionManagerConfig::new()
                    .set_connection_timeout(self.config.connect_timeout)
                    .set_response_timeout(self.config.response_timeout)
                    .set_number_of_retries(self.config.retries);
                let conn =
                    ConnectionManager::new_with_config(self.client.clone(), manager_config).await?;
                tracing::info!(url = %self.config.url, "Redis connected");
                Ok::<_, redis::RedisError>(conn)
            })
            .await?;

        Ok(conn.clone())
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let deleted: i64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
