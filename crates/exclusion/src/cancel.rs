//! Cancellation tokens for reconciliation runs.
//!
//! Runs are numbered. Starting a new run bumps the active version, which
//! cancels every token issued for an older version. Tokens are checked
//! cooperatively at the top of every unit of work, and can also be awaited so
//! timers tied to a run can be torn down promptly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct VersionState {
    active_version: AtomicU64,
    changed: Notify,
}

/// Tracks the active run version.
///
/// Cloning shares the same underlying counter.
#[derive(Debug, Clone, Default)]
pub struct RunVersionTracker {
    state: Arc<VersionState>,
}

impl RunVersionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the active version and returns the new version number.
    ///
    /// This cancels every in-flight run holding an older token.
    pub fn next_version(&self) -> u64 {
        let version = self.state.active_version.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.changed.notify_waiters();
        version
    }

    /// Returns the current active version without incrementing.
    pub fn current_version(&self) -> u64 {
        self.state.active_version.load(Ordering::SeqCst)
    }

    /// Creates a token that reports cancelled once the active version moves
    /// past `version`.
    pub fn token_for_version(&self, version: u64) -> CancellationToken {
        CancellationToken {
            state: Some(self.state.clone()),
            version,
        }
    }

    /// Bumps the version and returns a token for it.
    pub fn start_run(&self) -> CancellationToken {
        let version = self.next_version();
        self.token_for_version(version)
    }

    /// Cancels every outstanding token without starting a new run.
    pub fn cancel_all(&self) {
        self.next_version();
    }
}

/// A cancellation token for terminating a run early.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    /// `None` for tokens that can never be cancelled.
    state: Option<Arc<VersionState>>,
    version: u64,
}

impl CancellationToken {
    /// Creates a cancellation token that is never cancelled.
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Checks if this token is still active.
    ///
    /// Returns `Some(())` if still active, `None` if cancelled, so callers can
    /// bail out with `?`.
    #[inline]
    pub fn is_cancelled(&self) -> Option<()> {
        match &self.state {
            Some(state) if state.active_version.load(Ordering::SeqCst) != self.version => None,
            _ => Some(()),
        }
    }

    #[inline]
    pub fn cancelled_now(&self) -> bool {
        self.is_cancelled().is_none()
    }

    /// Resolves once the token is cancelled. Never resolves for noop tokens.
    pub async fn cancelled(&self) {
        let Some(state) = &self.state else {
            std::future::pending::<()>().await;
            return;
        };
        loop {
            let changed = state.changed.notified();
            if self.cancelled_now() {
                return;
            }
            changed.await;
        }
    }
}
