//! # Product Repository
//!
//! Cache-aside reads and invalidate-on-write updates over a
//! [`ProductStore`](crate::store::ProductStore).

use std::time::Duration;

use product_domain::{
    DEFAULT_CACHE_TTL, Member, Product, ProductDraft, ReadSource, WriteOutcome, cache_key,
};

use crate::cache::CacheClient;
use crate::error::{PersistenceError, Result};
use crate::store::SharedStore;
use crate::strategy::{ReplicaFallback, commit_then_invalidate};

/// Read-path settings.
#[derive(Debug, Clone, Copy)]
pub struct ReadSettings {
    /// TTL of entries populated on a miss.
    pub ttl: Duration,
    pub fallback: ReplicaFallback,
}

impl Default for ReadSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            fallback: ReplicaFallback::Primary,
        }
    }
}

/// Product repository with cache-aside reads.
///
/// There is no request coalescing: concurrent misses on the same key each
/// read the store and each repopulate the cache.
#[derive(Clone)]
pub struct ProductRepository {
    store: SharedStore,
    cache: CacheClient,
    settings: ReadSettings,
}

impl ProductRepository {
    pub fn new(store: SharedStore, cache: CacheClient, settings: ReadSettings) -> Self {
        Self {
            store,
            cache,
            settings,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn cache(&self) -> &CacheClient {
        &self.cache
    }

    pub const fn settings(&self) -> ReadSettings {
        self.settings
    }

    /// Get a product, from cache if present, otherwise from the store.
    ///
    /// # Errors
    ///
    /// `NotFound` if no member has the row, `StoreUnavailable` if the store
    /// could not be asked. Cache failures are never returned.
    pub async fn get(&self, id: i64) -> Result<(Product, ReadSource)> {
        let key = cache_key(id);

        if let Some(product) = self.cache.get_json::<Product>(&key).await {
            return Ok((product, ReadSource::Cache));
        }

        let store = &self.store;
        let (product, source) = self
            .settings
            .fallback
            .read(
                || store.fetch(Member::Replica, id),
                || store.fetch(Member::Primary, id),
                || PersistenceError::product_not_found(id),
            )
            .await?;

        // Best-effort: a failed populate only costs the next read a miss.
        self.cache.set_json(&key, &product, self.settings.ttl).await;

        tracing::debug!(product_id = id, %source, "Product read");
        Ok((product, source))
    }

    /// Update a product on the primary, then invalidate its cache entry.
    ///
    /// The new value is not written into the cache. Reads that miss afterwards
    /// go to the replica and may still see the old row until replication
    /// catches up.
    ///
    /// # Errors
    ///
    /// `Validation` for bad input, `NotFound` if the id does not exist,
    /// `StoreUnavailable` if the primary is unreachable. Not retried.
    pub async fn update(&self, id: i64, draft: &ProductDraft) -> Result<WriteOutcome> {
        draft.validate()?;
        let key = cache_key(id);

        let (product, invalidation) = commit_then_invalidate(
            &key,
            || async {
                self.store
                    .update(id, draft)
                    .await?
                    .ok_or_else(|| PersistenceError::product_not_found(id))
            },
            || {
                let cache = self.cache.clone();
                let key = key.clone();
                async move { cache.delete(&key).await }
            },
        )
        .await?;

        tracing::info!(product_id = id, ?invalidation, "Product updated");
        Ok(WriteOutcome {
            product,
            invalidation,
        })
    }

    /// Create a product on the primary. The cache is not touched; the first
    /// read populates it.
    ///
    /// # Errors
    ///
    /// `Validation` for bad input, `StoreUnavailable` if the primary is
    /// unreachable.
    pub async fn create(&self, draft: &ProductDraft) -> Result<Product> {
        draft.validate()?;
        let product = self.store.insert(draft).await?;
        tracing::info!(product_id = product.id, "Product created");
        Ok(product)
    }

    /// List every product from the replica, bypassing the cache.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` if the replica is unreachable.
    pub async fn list(&self) -> Result<Vec<Product>> {
        self.store.list(Member::Replica).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheBackend;
    use crate::memory::{MemoryCache, MemoryStore};
    use crate::store::ProductStore;
    use async_trait::async_trait;
    use fake::Fake;
    use fake::faker::company::en::CompanyName;
    use product_domain::Invalidation;
    use std::sync::Arc;

    struct Fixture {
        store: Arc<MemoryStore>,
        cache: Arc<MemoryCache>,
        repo: ProductRepository,
    }

    fn fixture(settings: ReadSettings) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let repo = ProductRepository::new(
            store.clone(),
            CacheClient::new(cache.clone()),
            settings,
        );
        Fixture { store, cache, repo }
    }

    #[tokio::test]
    async fn test_second_read_served_from_cache() {
        let f = fixture(ReadSettings::default());
        let seeded = f.store.seed("Desk lamp", 2_499);

        let (first, source) = f.repo.get(seeded.id).await.unwrap();
        assert_eq!(source, ReadSource::Replica);
        assert_eq!(first, seeded);
        assert_eq!(f.cache.ttl_of(&cache_key(seeded.id)), Some(DEFAULT_CACHE_TTL));

        let (second, source) = f.repo.get(seeded.id).await.unwrap();
        assert_eq!(source, ReadSource::Cache);
        assert_eq!(second, first);
        assert_eq!(f.store.reads(Member::Replica), 1); // Store NOT touched
        assert_eq!(f.store.reads(Member::Primary), 0);
    }

    #[tokio::test]
    async fn test_missing_id_is_not_found() {
        let f = fixture(ReadSettings::default());
        let err = f.repo.get(404).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!f.cache.contains(&cache_key(404)));
    }

    #[tokio::test]
    async fn test_replica_down_falls_back_to_primary() {
        let f = fixture(ReadSettings::default());
        let seeded = f.store.seed("Desk lamp", 2_499);
        f.store.set_reachable(Member::Replica, false);

        let (product, source) = f.repo.get(seeded.id).await.unwrap();
        assert_eq!(source, ReadSource::PrimaryFallback);
        assert_eq!(product, seeded);
        assert!(f.cache.contains(&cache_key(seeded.id)));
    }

    #[tokio::test]
    async fn test_replica_down_fail_fast_policy() {
        let f = fixture(ReadSettings {
            fallback: ReplicaFallback::FailFast,
            ..Default::default()
        });
        let seeded = f.store.seed("Desk lamp", 2_499);
        f.store.set_reachable(Member::Replica, false);

        let err = f.repo.get(seeded.id).await.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(f.store.reads(Member::Primary), 0);
    }

    #[tokio::test]
    async fn test_both_members_down_is_store_unavailable() {
        let f = fixture(ReadSettings::default());
        let seeded = f.store.seed("Desk lamp", 2_499);
        f.store.set_reachable(Member::Replica, false);
        f.store.set_reachable(Member::Primary, false);

        let err = f.repo.get(seeded.id).await.unwrap_err();
        assert!(matches!(err, PersistenceError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_cache_down_still_serves_reads() {
        let f = fixture(ReadSettings::default());
        let seeded = f.store.seed("Desk lamp", 2_499);
        f.cache.set_reachable(false);

        let (product, source) = f.repo.get(seeded.id).await.unwrap();
        assert_eq!(source, ReadSource::Replica);
        assert_eq!(product, seeded);
    }

    #[tokio::test]
    async fn test_write_invalidates_cached_key() {
        let f = fixture(ReadSettings::default());
        let seeded = f.store.seed("Desk lamp", 2_499);
        let key = cache_key(seeded.id);

        f.repo.get(seeded.id).await.unwrap();
        assert!(f.cache.contains(&key));

        let draft = ProductDraft::new("Desk lamp", 1_999).unwrap();
        let outcome = f.repo.update(seeded.id, &draft).await.unwrap();
        assert_eq!(outcome.invalidation, Invalidation::Removed);
        assert!(!f.cache.contains(&key));

        // Key absent before the write: still absent after, reported as such.
        let outcome = f.repo.update(seeded.id, &draft).await.unwrap();
        assert_eq!(outcome.invalidation, Invalidation::NotCached);
        assert!(!f.cache.contains(&key));
    }

    #[tokio::test]
    async fn test_write_roundtrip_on_primary() {
        let f = fixture(ReadSettings::default());
        let seeded = f.store.seed("Desk lamp", 2_499);

        let draft = ProductDraft::new("Floor lamp", 5_000).unwrap();
        f.repo.update(seeded.id, &draft).await.unwrap();

        let primary = f
            .store
            .fetch(Member::Primary, seeded.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(primary.name, "Floor lamp");
        assert_eq!(primary.price_cents, 5_000);
        assert!(primary.updated_at > seeded.updated_at);
    }

    #[tokio::test]
    async fn test_write_missing_id_leaves_cache_alone() {
        let f = fixture(ReadSettings::default());
        let draft = ProductDraft::new("Ghost", 1).unwrap();

        let key = cache_key(99);
        f.cache
            .set_ex(&key, "{}".to_string(), DEFAULT_CACHE_TTL)
            .await
            .unwrap();

        let err = f.repo.update(99, &draft).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(f.cache.contains(&key)); // Cache NOT touched
    }

    #[tokio::test]
    async fn test_write_with_primary_down_is_not_retried() {
        let f = fixture(ReadSettings::default());
        let seeded = f.store.seed("Desk lamp", 2_499);
        f.store.set_reachable(Member::Primary, false);

        let draft = ProductDraft::new("Desk lamp", 1).unwrap();
        let err = f.repo.update(seeded.id, &draft).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_write_reports_failed_invalidation() {
        let f = fixture(ReadSettings::default());
        let seeded = f.store.seed("Desk lamp", 2_499);
        f.cache.set_reachable(false);

        let draft = ProductDraft::new("Desk lamp", 1_000).unwrap();
        let outcome = f.repo.update(seeded.id, &draft).await.unwrap();
        assert_eq!(outcome.invalidation, Invalidation::Failed);
        assert_eq!(outcome.product.price_cents, 1_000);
    }

    #[tokio::test]
    async fn test_write_rejects_invalid_draft() {
        let f = fixture(ReadSettings::default());
        let seeded = f.store.seed("Desk lamp", 2_499);
        let draft = ProductDraft {
            name: String::new(),
            price_cents: 10,
        };

        let err = f.repo.update(seeded.id, &draft).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let f = fixture(ReadSettings::default());
        let a = f.repo.create(&ProductDraft::new("Chair", 4_500).unwrap()).await.unwrap();
        let b = f.repo.create(&ProductDraft::new("Table", 12_000).unwrap()).await.unwrap();
        assert!(b.id > a.id);
        assert!(!f.cache.contains(&cache_key(a.id)));

        let listed = f.repo.list().await.unwrap();
        assert_eq!(listed, vec![a, b]);
    }

    /// Cache whose `DEL` takes longer than the caller is willing to wait.
    struct SlowDeleteCache {
        inner: Arc<MemoryCache>,
        delay: Duration,
    }

    #[async_trait]
    impl CacheBackend for SlowDeleteCache {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
            self.inner.set_ex(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<bool> {
            tokio::time::sleep(self.delay).await;
            self.inner.delete(key).await
        }

        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_write_still_invalidates() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let slow = Arc::new(SlowDeleteCache {
            inner: cache.clone(),
            delay: Duration::from_millis(50),
        });
        let repo = ProductRepository::new(
            store.clone(),
            CacheClient::new(slow),
            ReadSettings::default(),
        );
        let seeded = store.seed("Desk lamp", 100);
        repo.get(seeded.id).await.unwrap();
        assert!(cache.contains(&cache_key(seeded.id)));

        // The caller gives up after the commit, while DEL is in flight.
        let draft = ProductDraft::new("Desk lamp", 500).unwrap();
        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), repo.update(seeded.id, &draft)).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!cache.contains(&cache_key(seeded.id)));

        let (served, source) = repo.get(seeded.id).await.unwrap();
        assert_eq!(source, ReadSource::Replica);
        assert_eq!(served.price_cents, 500);
    }

    #[tokio::test]
    async fn test_cache_serves_exact_store_copy() {
        let f = fixture(ReadSettings::default());
        let seeded: Vec<Product> = (0..10)
            .map(|_| {
                let name: String = CompanyName().fake();
                let price: i64 = (0_i64..100_000).fake();
                f.store.seed(&name, price)
            })
            .collect();

        for product in &seeded {
            f.repo.get(product.id).await.unwrap();
            let (cached, source) = f.repo.get(product.id).await.unwrap();
            assert_eq!(source, ReadSource::Cache);
            assert_eq!(&cached, product);
        }
    }
}
