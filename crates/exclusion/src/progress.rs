//! Reconciliation progress tracking.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic `completed / total` counters for one run.
///
/// The total grows as folders are listed, so it is not known upfront.
#[derive(Debug, Default)]
pub struct ReconcileProgress {
    completed: AtomicUsize,
    total: AtomicUsize,
    errors: AtomicUsize,
    started_at: AtomicU64,
    finished_at: AtomicU64,
}

impl ReconcileProgress {
    pub fn new() -> Self {
        let progress = Self::default();
        progress.started_at.store(unix_now_millis(), Ordering::Relaxed);
        progress
    }

    pub fn add_total(&self, count: usize) {
        self.total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn complete_one(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.finished_at.store(unix_now_millis(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            started_at: zero_to_none(self.started_at.load(Ordering::Relaxed)),
            finished_at: zero_to_none(self.finished_at.load(Ordering::Relaxed)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub errors: usize,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
}

impl ProgressSnapshot {
    /// Completed fraction in `0.0..=1.0`; 0 before anything is discovered.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.completed.min(self.total) as f64) / (self.total as f64)
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

fn unix_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis() as u64)
        .unwrap_or(0)
}

fn zero_to_none(value: u64) -> Option<u64> {
    if value == 0 {
        None
    } else {
        Some(value)
    }
}
