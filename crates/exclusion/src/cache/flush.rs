//! Write-coalescing queue for persisted decisions.
//!
//! Decisions are produced one path at a time, often in bursts of thousands
//! during a reconciliation. Each one is queued as a [`StoreAction`]; a worker
//! waits for the first action, lets the flush interval elapse, then applies
//! everything queued so far to an in-memory mirror and saves it once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::persist::{CacheFingerprint, DecisionStore, PersistedDecisions};
use crate::error::Result;

/// A pending change to the persisted cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    Put(String, bool),
    Delete(String),
    /// Drop every entry and adopt a new fingerprint.
    Reset(CacheFingerprint),
}

pub struct FlushQueue {
    store: Arc<dyn DecisionStore>,
    interval: Duration,
    pending: Mutex<Vec<StoreAction>>,
    mirror: tokio::sync::Mutex<PersistedDecisions>,
    signal: Notify,
    shutdown: Notify,
    stopped: AtomicBool,
}

impl std::fmt::Debug for FlushQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushQueue")
            .field("interval", &self.interval)
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl FlushQueue {
    pub fn new(store: Arc<dyn DecisionStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            pending: Mutex::new(Vec::new()),
            mirror: tokio::sync::Mutex::new(PersistedDecisions::default()),
            signal: Notify::new(),
            shutdown: Notify::new(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn DecisionStore> {
        &self.store
    }

    /// Seeds the mirror with what was loaded from the store.
    pub async fn adopt(&self, decisions: PersistedDecisions) {
        *self.mirror.lock().await = decisions;
    }

    pub fn push(&self, action: StoreAction) {
        self.pending.lock().push(action);
        self.signal.notify_one();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Applies every queued action and saves the result. Does nothing when the
    /// queue is empty.
    pub async fn flush(&self) -> Result<()> {
        let mut mirror = self.mirror.lock().await;
        let actions = std::mem::take(&mut *self.pending.lock());
        if actions.is_empty() {
            return Ok(());
        }
        for action in actions {
            match action {
                StoreAction::Put(path, is_ignored) => {
                    mirror.entries.insert(path, is_ignored);
                }
                StoreAction::Delete(path) => {
                    mirror.entries.remove(&path);
                }
                StoreAction::Reset(fingerprint) => {
                    *mirror = PersistedDecisions::new(fingerprint);
                }
            }
        }
        self.store.save(&mirror).await
    }

    /// Starts the background worker. It exits after a final flush once
    /// [`FlushQueue::stop`] is called.
    pub fn spawn_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = queue.signal.notified() => {}
                    _ = queue.shutdown.notified() => break,
                }
                if queue.stopped.load(Ordering::Acquire) {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(queue.interval) => {}
                    _ = queue.shutdown.notified() => break,
                }
                if let Err(error) = queue.flush().await {
                    tracing::warn!("decision cache flush failed: {}", error);
                }
            }
            if let Err(error) = queue.flush().await {
                tracing::warn!("final decision cache flush failed: {}", error);
            }
        })
    }

    /// Asks the worker to flush and exit.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.shutdown.notify_one();
    }
}
