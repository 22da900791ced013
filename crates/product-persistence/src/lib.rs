//! # Product Persistence Library
//!
//! Cache-aside persistence layer for the product catalog.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Application Layer                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │   ProductRepository · ConsistencyProbe · HealthMonitor       │
//! │        (replica fallback, invalidate-after-commit)           │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                   │
//!                    ▼                   ▼
//! ┌─────────────────────────┐   ┌──────────────────────────────┐
//! │     Redis Cache         │   │   PgRouter                   │
//! │  (advisory, TTL 60s)    │   │   primary pool · replica pool│
//! └─────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - `postgres`: Enable the PostgreSQL router (default)
//! - `redis`: Enable the Redis cache backend (default)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use product_persistence::{
//!     CacheClient, CacheConfig, PgRouter, ProductRepository, ReadSettings, RedisCache,
//!     StoreConfig,
//! };
//!
//! let store = Arc::new(PgRouter::new(&StoreConfig::default())?);
//! let cache = CacheClient::new(Arc::new(RedisCache::new(CacheConfig::default())?));
//! let repo = ProductRepository::new(store, cache, ReadSettings::default());
//!
//! let (product, source) = repo.get(1).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod error;
pub mod health;
pub mod memory;
pub mod probe;
pub mod repository;
pub mod store;
pub mod strategy;

// Re-export commonly used types
pub use cache::{CacheBackend, CacheClient};
#[cfg(feature = "redis")]
pub use cache::{CacheConfig, RedisCache};
pub use error::{PersistenceError, Result};
pub use health::HealthMonitor;
pub use probe::ConsistencyProbe;
pub use repository::{ProductRepository, ReadSettings};
pub use store::{ProductStore, SharedStore};
#[cfg(feature = "postgres")]
pub use store::{PgMemberConfig, PgRouter, StoreConfig};
pub use strategy::ReplicaFallback;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
