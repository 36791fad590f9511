//! Distributed lock service
//!
//! Grants group-wide exclusive locks for arbitrary string keys, used to
//! serialize conflicting operations on the same resource (`userId:fileName`).
//! At most one holder exists across all members at any time: the lock table
//! is owned by the group, not by any single member. Acquisition is bounded;
//! release is tied to guard drop so the lock is freed on every exit path,
//! including early returns and panics mid-operation.

use crate::common::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

#[derive(Default)]
pub struct LockService {
    // Keyed table of group-wide mutexes. Entries persist once created;
    // the table is bounded by the number of distinct resource keys.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusive lock for `key`, waiting at most `timeout`.
    /// Times out with `Error::LockTimeout`, in which case nothing was
    /// acquired and the caller must abort before mutating anything.
    pub async fn acquire(&self, key: &str, timeout: Duration) -> Result<LockGuard> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap();
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => {
                tracing::debug!("Lock acquired: {}", key);
                Ok(LockGuard {
                    key: key.to_string(),
                    _guard: guard,
                })
            }
            Err(_) => Err(Error::LockTimeout(key.to_string())),
        }
    }
}

/// Scoped lock hold; dropping it releases the lock.
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        tracing::debug!("Lock released: {}", self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let service = LockService::new();
        let guard = service
            .acquire("u1:a.txt", Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(guard.key(), "u1:a.txt");
        drop(guard);

        // Re-acquirable after release
        let _guard = service
            .acquire("u1:a.txt", Duration::from_millis(100))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_contended_acquire_times_out() {
        let service = LockService::new();
        let _held = service
            .acquire("u1:a.txt", Duration::from_millis(100))
            .await
            .unwrap();

        let err = service
            .acquire("u1:a.txt", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LockTimeout(_)));
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_contend() {
        let service = LockService::new();
        let _a = service
            .acquire("u1:a.txt", Duration::from_millis(50))
            .await
            .unwrap();
        let _b = service
            .acquire("u1:b.txt", Duration::from_millis(50))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_release_on_early_exit() {
        let service = Arc::new(LockService::new());

        async fn failing_op(locks: &LockService) -> Result<()> {
            let _guard = locks.acquire("u1:a.txt", Duration::from_millis(50)).await?;
            Err(Error::Internal("simulated failure".into()))
        }

        assert!(failing_op(&service).await.is_err());
        // Guard dropped on the error path, lock must be free again
        let _guard = service
            .acquire("u1:a.txt", Duration::from_millis(50))
            .await
            .unwrap();
    }
}
