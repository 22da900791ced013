//! Invalidate-after-commit write ordering.

use std::fmt::Debug;
use std::future::Future;

use product_domain::Invalidation;

use crate::error::Result;

/// Run `db_fn` to completion, then `invalidate_fn`.
///
/// The invalidation starts only after the store call has returned a committed
/// result. A read that misses after the delete may still repopulate the key
/// from a lagging replica; that entry lives until TTL. A failed store call
/// skips invalidation entirely.
///
/// Once the commit is in, the delete runs on its own task: dropping the
/// caller's future does not cancel it, and its failure is still logged. A
/// failed invalidation does not fail the write; it is logged at error level
/// and returned as [`Invalidation::Failed`].
pub async fn commit_then_invalidate<T, DbFut, InvalidateFut>(
    key: &str,
    db_fn: impl FnOnce() -> DbFut,
    invalidate_fn: impl FnOnce() -> InvalidateFut,
) -> Result<(T, Invalidation)>
where
    T: Debug,
    DbFut: Future<Output = Result<T>>,
    InvalidateFut: Future<Output = Result<bool>> + Send + 'static,
{
    let committed = db_fn().await?;

    let pending = invalidate_fn();
    let task_key = key.to_string();
    let task = tokio::spawn(async move {
        match pending.await {
            Ok(was_present) => Invalidation::from_was_present(was_present),
            Err(e) => {
                tracing::error!(
                    key = %task_key,
                    error = %e,
                    "Cache invalidation failed after commit, stale entry may be served until TTL"
                );
                Invalidation::Failed
            }
        }
    });

    let invalidation = match task.await {
        Ok(invalidation) => invalidation,
        Err(e) => {
            tracing::error!(%key, error = %e, "Cache invalidation task aborted after commit");
            Invalidation::Failed
        }
    };

    Ok((committed, invalidation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn test_invalidates_after_commit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let db_log = log.clone();
        let cache_log = log.clone();

        let (value, invalidation) = commit_then_invalidate(
            "product:1",
            || async move {
                db_log.lock().unwrap().push("commit");
                Ok(42)
            },
            || async move {
                cache_log.lock().unwrap().push("invalidate");
                Ok(true)
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(invalidation, Invalidation::Removed);
        assert_eq!(*log.lock().unwrap(), vec!["commit", "invalidate"]);
    }

    #[tokio::test]
    async fn test_failed_write_skips_invalidation() {
        let invalidated = Arc::new(Mutex::new(false));
        let flag = invalidated.clone();

        let result = commit_then_invalidate::<i32, _, _>(
            "product:1",
            || async { Err(PersistenceError::product_not_found(1)) },
            || async move {
                *flag.lock().unwrap() = true;
                Ok(true)
            },
        )
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert!(!*invalidated.lock().unwrap()); // Cache NOT touched
    }

    #[tokio::test]
    async fn test_failed_invalidation_is_reported_not_raised() {
        let (_, invalidation) = commit_then_invalidate(
            "product:1",
            || async { Ok(()) },
            || async { Err(PersistenceError::Cache("connection refused".into())) },
        )
        .await
        .unwrap();

        assert!(invalidation.is_failed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_does_not_cancel_invalidation() {
        let invalidated = Arc::new(Mutex::new(false));
        let flag = invalidated.clone();

        let write = commit_then_invalidate(
            "product:1",
            || async { Ok(()) },
            || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                *flag.lock().unwrap() = true;
                Ok(true)
            },
        );
        assert!(tokio::time::timeout(Duration::from_millis(10), write).await.is_err());
        assert!(!*invalidated.lock().unwrap());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(*invalidated.lock().unwrap()); // Delete still ran
    }
}
