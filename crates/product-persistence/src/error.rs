//! Persistence layer error types

use product_domain::{DomainError, Member};
use thiserror::Error;

/// Persistence layer errors
///
/// `NotFound` and `StoreUnavailable` are the two terminal outcomes callers
/// pattern-match on: the first is a fact about the data, the second a fact
/// about the infrastructure. `Cache` never reaches a caller of the read or
/// write path; the cache client degrades it to a miss or a no-op.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Entity not found: {entity_type} with key {key}")]
    NotFound { entity_type: String, key: String },

    #[error("Store member {member} unavailable: {reason}")]
    StoreUnavailable { member: Member, reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    Validation(#[from] DomainError),
}

impl PersistenceError {
    pub fn product_not_found(id: i64) -> Self {
        Self::NotFound {
            entity_type: "product".to_string(),
            key: id.to_string(),
        }
    }

    pub fn unavailable(member: Member, reason: impl ToString) -> Self {
        Self::StoreUnavailable {
            member,
            reason: reason.to_string(),
        }
    }

    /// Transport-level failure that justifies trying the other member.
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for PersistenceError {
    fn from(err: redis::RedisError) -> Self {
        Self::Cache(err.to_string())
    }
}

/// Classify a client error from `member`.
///
/// Transport failures are a closed connection, an I/O cause (socket or
/// connect), or a server SQLSTATE of class `08` (connection exception) or
/// `57P01`..`57P03` (shutdown, "cannot connect now" on a replica still
/// starting up). Client-side errors without SQLSTATE, such as type
/// conversion or row-count failures, are not.
#[cfg(feature = "postgres")]
pub(crate) fn classify_pg(member: Member, err: &tokio_postgres::Error) -> PersistenceError {
    let io_cause = std::error::Error::source(err).is_some_and(|cause| cause.is::<std::io::Error>());
    let code = err.code().map(tokio_postgres::error::SqlState::code);

    if is_transport(code, io_cause, err.is_closed()) {
        PersistenceError::unavailable(member, err)
    } else {
        PersistenceError::Database(err.to_string())
    }
}

const fn is_transport_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    matches!(bytes, [b'0', b'8', ..] | b"57P01" | b"57P02" | b"57P03")
}

fn is_transport(code: Option<&str>, io_cause: bool, closed: bool) -> bool {
    closed || io_cause || code.is_some_and(is_transport_code)
}

#[cfg(feature = "postgres")]
impl PersistenceError {
    /// Every pool failure (wait timeout, closed pool, connect error) means the
    /// member cannot serve this request.
    pub(crate) fn from_pool(member: Member, err: &deadpool_postgres::PoolError) -> Self {
        Self::unavailable(member, err)
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
