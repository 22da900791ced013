//! # Record Store Module
//!
//! Access to the replicated record store, addressed per member.
//!
//! Every method acquires a connection scope from the named member's pool and
//! releases it before returning, on every exit path. Transport failures come
//! back as [`PersistenceError::StoreUnavailable`](crate::PersistenceError),
//! never as `Ok(None)`: "no such row" and "could not ask" stay distinct.

#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use product_domain::{Member, Product, ProductDraft, Role};

use crate::error::Result;

#[cfg(feature = "postgres")]
pub use postgres::{PgMemberConfig, PgRouter, StoreConfig};

/// Member-addressed product store.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Read one product by id from `member`. No transaction control.
    async fn fetch(&self, member: Member, id: i64) -> Result<Option<Product>>;

    /// Read all products from `member`, ordered by id.
    async fn list(&self, member: Member) -> Result<Vec<Product>>;

    /// Update name, price and `updated_at` on the primary in one statement,
    /// returning the updated row. Runs in a transaction that is committed on
    /// success and rolled back otherwise.
    async fn update(&self, id: i64, draft: &ProductDraft) -> Result<Option<Product>>;

    /// Insert on the primary, returning the created row.
    async fn insert(&self, draft: &ProductDraft) -> Result<Product>;

    /// Ask `member` which replication role it believes it has.
    async fn role(&self, member: Member) -> Result<Role>;
}

/// Shared store handle
pub type SharedStore = Arc<dyn ProductStore>;
