//! # Health Monitor
//!
//! Cache reachability plus the self-reported replication role of each store
//! member.

use product_domain::{CacheStatus, HealthReport, Member, MemberStatus};

use crate::cache::CacheClient;
use crate::store::SharedStore;

/// Composite health monitor.
#[derive(Clone)]
pub struct HealthMonitor {
    store: SharedStore,
    cache: CacheClient,
}

impl HealthMonitor {
    pub fn new(store: SharedStore, cache: CacheClient) -> Self {
        Self { store, cache }
    }

    /// Probe all three components concurrently.
    pub async fn check(&self) -> HealthReport {
        let (cache_up, primary, replica) = tokio::join!(
            self.cache.ping(),
            self.member_status(Member::Primary),
            self.member_status(Member::Replica),
        );

        let report = HealthReport {
            cache: if cache_up { CacheStatus::Ok } else { CacheStatus::Down },
            primary,
            replica,
        };

        if !report.is_healthy() {
            tracing::warn!(?report, "Health check degraded");
        }
        report
    }

    async fn member_status(&self, member: Member) -> MemberStatus {
        match self.store.role(member).await {
            Ok(reported) if reported == member.expected_role() => MemberStatus::Ok,
            Ok(reported) => MemberStatus::RoleMismatch {
                expected: member.expected_role(),
                reported,
            },
            Err(e) => MemberStatus::Down {
                reason: e.to_string(),
            },
        }
    }
}
