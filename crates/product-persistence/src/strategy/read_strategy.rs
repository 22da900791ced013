//! Replica-first store read with a single fallback, using enum dispatch.

use std::fmt::Debug;
use std::future::Future;
use std::str::FromStr;

use product_domain::{Member, ReadSource};

use crate::error::{PersistenceError, Result};

/// What to do when the replica cannot be reached on a cache miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicaFallback {
    /// Repeat the read once against the primary.
    #[default]
    Primary,
    /// Report the replica outage to the caller without touching the primary.
    FailFast,
}

impl ReplicaFallback {
    /// Read from the replica and, if it is unreachable and the policy allows
    /// it, exactly once from the primary.
    ///
    /// - `replica_fn`: read against the replica scope
    /// - `primary_fn`: the same read against the primary scope
    ///
    /// `Ok(None)` from either member is a terminal `NotFound`; only
    /// `StoreUnavailable` from the replica triggers the fallback.
    pub async fn read<T, ReplicaFut, PrimaryFut>(
        &self,
        replica_fn: impl FnOnce() -> ReplicaFut,
        primary_fn: impl FnOnce() -> PrimaryFut,
        not_found: impl FnOnce() -> PersistenceError,
    ) -> Result<(T, ReadSource)>
    where
        T: Debug,
        ReplicaFut: Future<Output = Result<Option<T>>>,
        PrimaryFut: Future<Output = Result<Option<T>>>,
    {
        let replica_err = match replica_fn().await {
            Ok(Some(value)) => return Ok((value, ReadSource::Replica)),
            Ok(None) => return Err(not_found()),
            Err(e) if e.is_unavailable() => e,
            Err(e) => return Err(e),
        };

        match self {
            Self::FailFast => {
                tracing::error!(error = %replica_err, "Replica down, fallback disabled");
                Err(replica_err)
            }
            Self::Primary => {
                tracing::warn!(error = %replica_err, "Replica down, falling back to primary");

                match primary_fn().await {
                    Ok(Some(value)) => Ok((value, ReadSource::PrimaryFallback)),
                    Ok(None) => Err(not_found()),
                    Err(e) => {
                        if e.is_unavailable() {
                            tracing::error!(error = %e, member = %Member::Primary, "Primary down too");
                        }
                        Err(e)
                    }
                }
            }
        }
    }
}

impl FromStr for ReplicaFallback {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "fail-fast" | "fail_fast" | "failfast" => Ok(Self::FailFast),
            other => Err(format!(
                "unknown replica fallback '{other}', expected 'primary' or 'fail-fast'"
            )),
        }
    }
}
