//! # API Context
//!
//! Application state shared across all HTTP handlers.

use std::sync::Arc;

use product_persistence::{
    CacheClient, ConsistencyProbe, HealthMonitor, PgRouter, ProductRepository, ReadSettings,
    SharedStore,
};

use crate::config::Config;

/// Application context shared across all handlers
#[derive(Clone)]
pub struct ApiContext {
    /// Cache-aside product repository
    pub repo: ProductRepository,

    /// Replication lag probe
    pub probe: ConsistencyProbe,

    /// Cache and store health monitor
    pub health: HealthMonitor,

    /// PostgreSQL router, kept for explicit shutdown
    router: Option<Arc<PgRouter>>,
}

impl ApiContext {
    /// Create a context over the PostgreSQL router and a cache client
    pub fn new(router: Arc<PgRouter>, cache: CacheClient, config: &Config) -> Self {
        let mut ctx = Self::with_store(router.clone(), cache, config);
        ctx.router = Some(router);
        ctx
    }

    /// Create a context over any store implementation
    pub fn with_store(store: SharedStore, cache: CacheClient, config: &Config) -> Self {
        let settings = ReadSettings {
            ttl: config.cache_ttl,
            fallback: config.replica_fallback,
        };

        let repo = ProductRepository::new(store.clone(), cache.clone(), settings);
        let probe = ConsistencyProbe::with_window(repo.clone(), config.probe_window);
        let health = HealthMonitor::new(store, cache);

        Self {
            repo,
            probe,
            health,
            router: None,
        }
    }

    /// Close both connection pools. Idle connections are dropped and
    /// further acquisitions fail as unavailable.
    pub fn close(&self) {
        if let Some(router) = &self.router {
            router.close();
        }
    }
}
