//! # Strategy Module
//!
//! Ordering and fallback rules between cache and store.
//!
//! ## Read
//! - [`ReplicaFallback::Primary`] - Replica first, one retry on the primary if the replica is unreachable (default)
//! - [`ReplicaFallback::FailFast`] - Replica only, report the outage
//!
//! ## Write
//! - [`commit_then_invalidate`] - Commit on the primary, then delete the cache key. The new value is never written into the cache.
//!
//! ## Example
//!
//! ```rust,ignore
//! use product_persistence::strategy::ReplicaFallback;
//!
//! let (product, source) = ReplicaFallback::Primary
//!     .read(
//!         || store.fetch(Member::Replica, id),
//!         || store.fetch(Member::Primary, id),
//!         || PersistenceError::product_not_found(id),
//!     )
//!     .await?;
//! ```

pub mod read_strategy;
pub mod write_strategy;

pub use read_strategy::ReplicaFallback;
pub use write_strategy::commit_then_invalidate;
