use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes reconciliation passes.
///
/// Every pass (primary or owner-trace) holds the guard for its full duration,
/// so writes from two passes never interleave. Clones share the same gate;
/// separate `ConvergenceLock::new()` instances are independent. Waiters are
/// served in FIFO order.
#[derive(Clone, Debug, Default)]
pub struct ConvergenceLock {
    inner: Arc<Mutex<()>>,
}

/// Held for the duration of one pass; released on drop, including on error paths
#[derive(Debug)]
pub struct ConvergenceGuard {
    _guard: OwnedMutexGuard<()>,
}

impl ConvergenceLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other pass is running
    pub async fn acquire(&self) -> ConvergenceGuard {
        ConvergenceGuard {
            _guard: self.inner.clone().lock_owned().await,
        }
    }
}
