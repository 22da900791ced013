//! # In-Memory Backends
//!
//! Process-local implementations of [`CacheBackend`] and [`ProductStore`] for
//! tests and local runs without Redis or PostgreSQL. Both can be made
//! unreachable on demand; the store also simulates replication lag and
//! externally performed failover (role changes).
//!
//! Time is read from `tokio::time`, so tests running with a paused clock
//! control TTL expiry and replication delay exactly.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use product_domain::{Member, Product, ProductDraft, Role};
use tokio::time::Instant;

use crate::cache::CacheBackend;
use crate::error::{PersistenceError, Result};
use crate::store::ProductStore;

// =============================================================================
// CACHE
// =============================================================================

struct CacheEntry {
    value: String,
    ttl: Duration,
    expires_at: Instant,
}

/// In-memory cache with per-key expiry.
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    reachable: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate the cache going down or coming back.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Whether an unexpired entry exists, bypassing reachability.
    pub fn contains(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    /// The unexpired raw value, bypassing reachability.
    pub fn raw(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone())
    }

    /// TTL the entry was stored with.
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.ttl)
    }

    fn check(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PersistenceError::Cache("connection refused".to_string()))
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.raw(key))
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                ttl,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.remove(key).is_some_and(|e| e.expires_at > now))
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}

// =============================================================================
// STORE
// =============================================================================

struct StoreState {
    primary: BTreeMap<i64, Product>,
    replica: BTreeMap<i64, Product>,
    /// Rows committed on the primary, waiting to become visible on the replica.
    replication_log: VecDeque<(Instant, Product)>,
    next_id: i64,
    last_stamp: DateTime<Utc>,
    primary_up: bool,
    replica_up: bool,
    primary_role: Role,
    replica_role: Role,
}

impl StoreState {
    fn is_up(&self, member: Member) -> bool {
        match member {
            Member::Primary => self.primary_up,
            Member::Replica => self.replica_up,
        }
    }

    fn rows(&self, member: Member) -> &BTreeMap<i64, Product> {
        match member {
            Member::Primary => &self.primary,
            Member::Replica => &self.replica,
        }
    }

    fn replay_due(&mut self) {
        let now = Instant::now();
        while self
            .replication_log
            .front()
            .is_some_and(|(visible_at, _)| *visible_at <= now)
        {
            if let Some((_, row)) = self.replication_log.pop_front() {
                self.replica.insert(row.id, row);
            }
        }
    }

    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = if now > self.last_stamp {
            now
        } else {
            self.last_stamp + chrono::Duration::microseconds(1)
        };
        self.last_stamp = stamp;
        stamp
    }
}

/// In-memory primary/replica pair.
pub struct MemoryStore {
    state: Mutex<StoreState>,
    replication_lag: Duration,
    primary_reads: AtomicUsize,
    replica_reads: AtomicUsize,
}

impl MemoryStore {
    /// A pair whose replica applies writes immediately.
    pub fn new() -> Self {
        Self::with_replication_lag(Duration::ZERO)
    }

    /// A pair whose replica sees each write `lag` after it commits.
    pub fn with_replication_lag(lag: Duration) -> Self {
        Self {
            state: Mutex::new(StoreState {
                primary: BTreeMap::new(),
                replica: BTreeMap::new(),
                replication_log: VecDeque::new(),
                next_id: 1,
                last_stamp: DateTime::<Utc>::MIN_UTC,
                primary_up: true,
                replica_up: true,
                primary_role: Role::Writable,
                replica_role: Role::ReadOnly,
            }),
            replication_lag: lag,
            primary_reads: AtomicUsize::new(0),
            replica_reads: AtomicUsize::new(0),
        }
    }

    /// Insert a row that is already replicated.
    pub fn seed(&self, name: &str, price_cents: i64) -> Product {
        let mut state = self.lock();
        let product = Product {
            id: state.next_id,
            name: name.to_string(),
            price_cents,
            updated_at: state.next_stamp(),
        };
        state.next_id += 1;
        state.primary.insert(product.id, product.clone());
        state.replica.insert(product.id, product.clone());
        product
    }

    /// Simulate a member going down or coming back.
    pub fn set_reachable(&self, member: Member, reachable: bool) {
        let mut state = self.lock();
        match member {
            Member::Primary => state.primary_up = reachable,
            Member::Replica => state.replica_up = reachable,
        }
    }

    /// Simulate an external failover changing what `member` reports.
    pub fn set_role(&self, member: Member, role: Role) {
        let mut state = self.lock();
        match member {
            Member::Primary => state.primary_role = role,
            Member::Replica => state.replica_role = role,
        }
    }

    /// Number of `fetch` calls that reached `member`.
    pub fn reads(&self, member: Member) -> usize {
        match member {
            Member::Primary => self.primary_reads.load(Ordering::SeqCst),
            Member::Replica => self.replica_reads.load(Ordering::SeqCst),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_up(state: &StoreState, member: Member) -> Result<()> {
        if state.is_up(member) {
            Ok(())
        } else {
            Err(PersistenceError::unavailable(member, "connection refused"))
        }
    }

    fn replicate(&self, state: &mut StoreState, row: Product) {
        state
            .replication_log
            .push_back((Instant::now() + self.replication_lag, row));
        if self.replication_lag.is_zero() {
            state.replay_due();
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn fetch(&self, member: Member, id: i64) -> Result<Option<Product>> {
        let mut state = self.lock();
        Self::ensure_up(&state, member)?;
        match member {
            Member::Primary => self.primary_reads.fetch_add(1, Ordering::SeqCst),
            Member::Replica => self.replica_reads.fetch_add(1, Ordering::SeqCst),
        };
        state.replay_due();
        Ok(state.rows(member).get(&id).cloned())
    }

    async fn list(&self, member: Member) -> Result<Vec<Product>> {
        let mut state = self.lock();
        Self::ensure_up(&state, member)?;
        state.replay_due();
        Ok(state.rows(member).values().cloned().collect())
    }

    async fn update(&self, id: i64, draft: &ProductDraft) -> Result<Option<Product>> {
        let mut state = self.lock();
        Self::ensure_up(&state, Member::Primary)?;
        if !state.primary.contains_key(&id) {
            return Ok(None);
        }

        let product = Product {
            id,
            name: draft.name.clone(),
            price_cents: draft.price_cents,
            updated_at: state.next_stamp(),
        };
        state.primary.insert(id, product.clone());
        self.replicate(&mut state, product.clone());
        Ok(Some(product))
    }

    async fn insert(&self, draft: &ProductDraft) -> Result<Product> {
        let mut state = self.lock();
        Self::ensure_up(&state, Member::Primary)?;

        let product = Product {
            id: state.next_id,
            name: draft.name.clone(),
            price_cents: draft.price_cents,
            updated_at: state.next_stamp(),
        };
        state.next_id += 1;
        state.primary.insert(product.id, product.clone());
        self.replicate(&mut state, product.clone());
        Ok(product)
    }

    async fn role(&self, member: Member) -> Result<Role> {
        let state = self.lock();
        Self::ensure_up(&state, member)?;
        Ok(match member {
            Member::Primary => state.primary_role,
            Member::Replica => state.replica_role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_replica_lags_primary() {
        let store = MemoryStore::with_replication_lag(Duration::from_millis(100));
        let seeded = store.seed("Kettle", 1_000);

        let draft = ProductDraft::new("Kettle", 1_200).unwrap();
        store.update(seeded.id, &draft).await.unwrap();

        let replica = store.fetch(Member::Replica, seeded.id).await.unwrap().unwrap();
        assert_eq!(replica.price_cents, 1_000);

        tokio::time::advance(Duration::from_millis(100)).await;
        let replica = store.fetch(Member::Replica, seeded.id).await.unwrap().unwrap();
        assert_eq!(replica.price_cents, 1_200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_entry_expires() {
        let cache = MemoryCache::new();
        cache
            .set_ex("product:1", "{}".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.contains("product:1"));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!cache.contains("product:1"));
        assert!(!cache.delete("product:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let store = MemoryStore::new();
        let seeded = store.seed("Mug", 500);
        let draft = ProductDraft::new("Mug", 600).unwrap();

        let first = store.update(seeded.id, &draft).await.unwrap().unwrap();
        let second = store.update(seeded.id, &draft).await.unwrap().unwrap();
        assert!(first.updated_at > seeded.updated_at);
        assert!(second.updated_at > first.updated_at);
    }
}
