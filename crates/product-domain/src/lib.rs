//! # Product Catalog - Domain Model
//!
//! Records, cache entry keys, read-source labels and the report types shared
//! by the persistence layer, the HTTP API and the tooling. These types are the
//! single source of truth across all layers.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Entity prefix used to derive cache keys (`product:<id>`).
pub const CACHE_KEY_PREFIX: &str = "product";

/// Fixed time-to-live of a cache entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Delay between the immediate and the delayed replica read of a probe.
pub const DEFAULT_PROBE_WINDOW: Duration = Duration::from_millis(200);

/// Upper bound on product name length, in characters.
pub const MAX_NAME_LEN: usize = 255;

/// Attached to every write result: the replica may not have the write yet.
pub const STALE_READ_NOTE: &str = "Next GET may show stale data due to replication lag";

/// Derive the cache key for a product id.
#[must_use]
pub fn cache_key(id: i64) -> String {
    format!("{CACHE_KEY_PREFIX}:{id}")
}

// =============================================================================
// ENTITIES
// =============================================================================

/// Product record, owned by the record store. Everything else holds copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price_cents: i64,
    /// Set by the store on every mutating write.
    pub updated_at: DateTime<Utc>,
}

/// Client-supplied fields for create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub price_cents: i64,
}

impl ProductDraft {
    /// Build a draft, rejecting invalid input.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] if the name is empty or too long, or the
    /// price is negative.
    pub fn new(name: impl Into<String>, price_cents: i64) -> Result<Self, DomainError> {
        let draft = Self {
            name: name.into(),
            price_cents,
        };
        draft.validate()?;
        Ok(draft)
    }

    /// Check name and price bounds.
    ///
    /// # Errors
    ///
    /// See [`ProductDraft::new`].
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.is_empty() {
            return Err(DomainError::EmptyName);
        }
        let len = self.name.chars().count();
        if len > MAX_NAME_LEN {
            return Err(DomainError::NameTooLong {
                len,
                max: MAX_NAME_LEN,
            });
        }
        if self.price_cents < 0 {
            return Err(DomainError::NegativePrice(self.price_cents));
        }
        Ok(())
    }
}

// =============================================================================
// ENUMS
// =============================================================================

/// Where a read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadSource {
    #[serde(rename = "cache")]
    Cache,
    #[serde(rename = "replica")]
    Replica,
    #[serde(rename = "primary (replica down)")]
    PrimaryFallback,
}

impl ReadSource {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Replica => "replica",
            Self::PrimaryFallback => "primary (replica down)",
        }
    }
}

impl fmt::Display for ReadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record store member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Member {
    Primary,
    Replica,
}

impl Member {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Replica => "replica",
        }
    }

    /// The role this member is expected to report.
    pub const fn expected_role(&self) -> Role {
        match self {
            Self::Primary => Role::Writable,
            Self::Replica => Role::ReadOnly,
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replication role a member reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Writable,
    ReadOnly,
}

impl Role {
    /// Map `pg_is_in_recovery()` to a role.
    pub const fn from_in_recovery(in_recovery: bool) -> Self {
        if in_recovery { Self::ReadOnly } else { Self::Writable }
    }
}

/// Outcome of the cache invalidation that follows a committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Invalidation {
    /// The key was present and has been deleted.
    Removed,
    /// The key was already absent.
    NotCached,
    /// The delete did not reach the cache. A stale entry may survive until TTL.
    Failed,
}

impl Invalidation {
    pub const fn from_was_present(was_present: bool) -> Self {
        if was_present { Self::Removed } else { Self::NotCached }
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

// =============================================================================
// REPORTS
// =============================================================================

/// Result of a committed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub product: Product,
    pub invalidation: Invalidation,
}

/// Result of a consistency probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub updated_value: Product,
    pub immediate_replica_value: Option<Product>,
    pub delayed_replica_value: Option<Product>,
    pub cached_value: Option<Product>,
    pub lag_detected: bool,
    /// Set when a replica read failed, so absence says nothing about lag.
    pub inconclusive: bool,
    pub explanation: String,
}

/// Cache reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStatus {
    Ok,
    Down,
}

/// Health of a record store member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    Ok,
    /// Reachable, but reporting the other member's role: an external failover
    /// happened that the configuration does not know about.
    RoleMismatch { expected: Role, reported: Role },
    Down { reason: String },
}

impl MemberStatus {
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Composite health snapshot, recomputed on every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub cache: CacheStatus,
    pub primary: MemberStatus,
    pub replica: MemberStatus,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.cache == CacheStatus::Ok && self.primary.is_ok() && self.replica.is_ok()
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Domain-level validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Product name must not be empty")]
    EmptyName,

    #[error("Product name is {len} characters, maximum is {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("Price must be non-negative, got {0}")]
    NegativePrice(i64),
}
