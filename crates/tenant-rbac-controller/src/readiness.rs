use crate::config::ControllerConfig;
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info, warn};

/// A watch cache that can report when its initial list has been loaded
#[async_trait]
pub trait CacheStatus: Send + Sync {
    /// Name used in log lines and errors
    fn name(&self) -> &str;

    /// Resolve once the cache holds a full initial listing
    async fn wait_synced(&self);
}

/// Startup barrier that holds back event dispatch until every watch cache is
/// synced, retrying a bounded number of times
#[derive(Debug, Clone)]
pub struct CacheReadinessGate {
    attempts: u32,
    backoff: Duration,
    attempt_timeout: Duration,
}

impl CacheReadinessGate {
    pub fn new(attempts: u32, backoff: Duration, attempt_timeout: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
            attempt_timeout,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.cache_sync_attempts,
            config.cache_sync_backoff,
            config.cache_sync_timeout,
        )
    }

    /// Wait for all caches to sync.
    ///
    /// Returns `CacheSyncFailed` naming the caches that never synced once
    /// every attempt is used up; callers treat that as fatal.
    pub async fn wait(&self, caches: &[&dyn CacheStatus]) -> Result<()> {
        let mut pending: Vec<&dyn CacheStatus> = caches.to_vec();

        for attempt in 1..=self.attempts {
            info!(
                "Waiting for watch caches to sync (attempt {}/{})",
                attempt, self.attempts
            );

            let mut still_pending = Vec::new();
            for cache in pending {
                if tokio::time::timeout(self.attempt_timeout, cache.wait_synced())
                    .await
                    .is_err()
                {
                    warn!("Watch cache for {} failed to sync", cache.name());
                    still_pending.push(cache);
                }
            }
            pending = still_pending;

            if pending.is_empty() {
                info!("All watch caches synced successfully");
                return Ok(());
            }

            if attempt < self.attempts {
                warn!("Some watch caches failed to sync, retrying...");
                tokio::time::sleep(self.backoff).await;
            }
        }

        let names: Vec<&str> = pending.iter().map(|c| c.name()).collect();
        error!("Watch caches failed to sync after {} attempts", self.attempts);
        Err(ReconcileError::cache_sync_failed(
            self.attempts,
            names.join(", "),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Syncs on the given attempt number; 0 never syncs
    struct FakeCache {
        name: String,
        synced_on_attempt: u32,
        calls: AtomicU32,
    }

    impl FakeCache {
        fn new(name: &str, synced_on_attempt: u32) -> Self {
            Self {
                name: name.to_string(),
                synced_on_attempt,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CacheStatus for FakeCache {
        fn name(&self) -> &str {
            &self.name
        }

        async fn wait_synced(&self) {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.synced_on_attempt == 0 || call < self.synced_on_attempt {
                std::future::pending::<()>().await;
            }
        }
    }

    fn make_gate() -> CacheReadinessGate {
        CacheReadinessGate::new(3, Duration::from_secs(2), Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_synced_on_first_attempt() {
        let tenants = FakeCache::new("tenants", 1);
        let bindings = FakeCache::new("rolebindings", 1);

        make_gate().wait(&[&tenants, &bindings]).await.unwrap();
        assert_eq!(tenants.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_only_pending_caches() {
        let tenants = FakeCache::new("tenants", 1);
        let bindings = FakeCache::new("rolebindings", 3);

        make_gate().wait(&[&tenants, &bindings]).await.unwrap();

        assert_eq!(tenants.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bindings.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_bounded_attempts() {
        let tenants = FakeCache::new("tenants", 1);
        let bindings = FakeCache::new("rolebindings", 0);

        let err = make_gate().wait(&[&tenants, &bindings]).await.unwrap_err();

        match err {
            ReconcileError::CacheSyncFailed { attempts, pending } => {
                assert_eq!(attempts, 3);
                assert_eq!(pending, "rolebindings");
            }
            other => panic!("expected cache sync failure, got {:?}", other),
        }
        assert_eq!(bindings.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_checks_once() {
        let gate = CacheReadinessGate::new(0, Duration::from_secs(1), Duration::from_secs(1));
        let cache = FakeCache::new("tenants", 1);
        gate.wait(&[&cache]).await.unwrap();
    }
}
