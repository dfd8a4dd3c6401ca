use std::time::Duration;

/// Configuration for the controllers and their startup barrier
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of times to wait for watch caches before giving up
    pub cache_sync_attempts: u32,
    /// Pause between cache sync attempts
    pub cache_sync_backoff: Duration,
    /// How long a single cache sync attempt may take
    pub cache_sync_timeout: Duration,
    /// Delay before a failed Tenant notification is redelivered
    pub requeue_after: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cache_sync_attempts: 3,
            cache_sync_backoff: Duration::from_secs(2),
            cache_sync_timeout: Duration::from_secs(30),
            requeue_after: Duration::from_secs(10),
        }
    }
}
