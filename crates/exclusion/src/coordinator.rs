//! Run coordination.
//!
//! At most one reconciliation is active at a time. Requesting a run cancels
//! the current one, waits for it to observe the cancellation, then spawns the
//! replacement. Each run owns a progress indicator that stays up for at least
//! the configured minimum duration unless the run is superseded.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::cancel::{CancellationToken, RunVersionTracker};
use crate::path::ROOT_PATH;
use crate::progress::{ProgressSnapshot, ReconcileProgress};
use crate::reconcile::{RunOutcome, TreeReconciler};

/// The host's "reconciliation in progress" indicator.
pub trait ProgressIndicator: Send + Sync {
    fn show(&self, run: u64);
    fn hide(&self, run: u64);
}

#[derive(Debug, Default)]
pub struct NoopIndicator;

impl ProgressIndicator for NoopIndicator {
    fn show(&self, _run: u64) {}

    fn hide(&self, _run: u64) {}
}

struct ActiveRun {
    version: u64,
    handle: JoinHandle<RunOutcome>,
}

pub struct RunCoordinator {
    reconciler: Arc<TreeReconciler>,
    indicator: Arc<dyn ProgressIndicator>,
    tracker: RunVersionTracker,
    min_indicator_duration: Duration,
    root: String,
    active: tokio::sync::Mutex<Option<ActiveRun>>,
    progress: Mutex<Option<Arc<ReconcileProgress>>>,
}

impl RunCoordinator {
    pub fn new(
        reconciler: Arc<TreeReconciler>,
        indicator: Arc<dyn ProgressIndicator>,
        min_indicator_duration: Duration,
    ) -> Self {
        Self {
            reconciler,
            indicator,
            tracker: RunVersionTracker::new(),
            min_indicator_duration,
            root: ROOT_PATH.to_string(),
            active: tokio::sync::Mutex::new(None),
            progress: Mutex::new(None),
        }
    }

    /// Cancels the active run, if any, and starts a new one. Returns the new
    /// run's version.
    pub async fn request_run(&self) -> u64 {
        let mut active = self.active.lock().await;
        let token = self.tracker.start_run();

        if let Some(previous) = active.take() {
            tracing::debug!(
                "cancelling reconciliation run {} for run {}",
                previous.version,
                token.version()
            );
            log_run_end(previous.version, &previous.handle.await);
        }

        let progress = Arc::new(ReconcileProgress::new());
        *self.progress.lock() = Some(progress.clone());

        let version = token.version();
        let handle = tokio::spawn(execute_run(
            self.reconciler.clone(),
            self.indicator.clone(),
            self.root.clone(),
            token,
            progress,
            self.min_indicator_duration,
        ));
        *active = Some(ActiveRun { version, handle });
        version
    }

    /// Waits for the active run, if any, and returns how it ended.
    pub async fn wait_idle(&self) -> Option<RunOutcome> {
        let mut active = self.active.lock().await;
        let run = active.take()?;
        let result = run.handle.await;
        log_run_end(run.version, &result);
        result.ok()
    }

    /// Cancels the active run and waits for it to stop.
    pub async fn shutdown(&self) {
        self.tracker.cancel_all();
        self.wait_idle().await;
    }

    pub fn current_version(&self) -> u64 {
        self.tracker.current_version()
    }

    /// Progress of the most recent run.
    pub fn progress(&self) -> Option<ProgressSnapshot> {
        self.progress.lock().as_ref().map(|progress| progress.snapshot())
    }
}

async fn execute_run(
    reconciler: Arc<TreeReconciler>,
    indicator: Arc<dyn ProgressIndicator>,
    root: String,
    token: CancellationToken,
    progress: Arc<ReconcileProgress>,
    min_indicator_duration: Duration,
) -> RunOutcome {
    let run = token.version();
    indicator.show(run);

    let (outcome, ()) = tokio::join!(reconciler.reconcile(&root, &token, &progress), async {
        tokio::select! {
            _ = tokio::time::sleep(min_indicator_duration) => {}
            _ = token.cancelled() => {}
        }
    });

    indicator.hide(run);
    let snapshot = progress.snapshot();
    tracing::info!(
        "reconciliation run {} {:?}: {}/{} entries, {} errors",
        run,
        outcome,
        snapshot.completed,
        snapshot.total,
        snapshot.errors
    );
    outcome
}

fn log_run_end(version: u64, result: &Result<RunOutcome, tokio::task::JoinError>) {
    match result {
        Ok(outcome) => tracing::debug!("reconciliation run {} ended: {:?}", version, outcome),
        Err(error) => tracing::error!("reconciliation run {} panicked: {}", version, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryPresentation};
    use crate::config::ExclusionConfig;
    use crate::engine::ExclusionEngine;

    #[derive(Default)]
    struct RecordingIndicator {
        events: Mutex<Vec<(&'static str, u64)>>,
    }

    impl ProgressIndicator for RecordingIndicator {
        fn show(&self, run: u64) {
            self.events.lock().push(("show", run));
        }

        fn hide(&self, run: u64) {
            self.events.lock().push(("hide", run));
        }
    }

    async fn coordinator(
        backend: Arc<MemoryBackend>,
        indicator: Arc<RecordingIndicator>,
        min: Duration,
    ) -> RunCoordinator {
        let (engine, _rx) = ExclusionEngine::new(backend.clone(), ExclusionConfig::default(), None);
        engine.activate().await;
        let reconciler = Arc::new(TreeReconciler::new(
            engine,
            backend.clone(),
            backend,
            Arc::new(MemoryPresentation::new()),
        ));
        RunCoordinator::new(reconciler, indicator, min)
    }

    #[tokio::test(start_paused = true)]
    async fn indicator_stays_up_for_minimum_duration() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file("a.md", "");
        let indicator = Arc::new(RecordingIndicator::default());
        let coordinator =
            coordinator(backend.clone(), indicator.clone(), Duration::from_secs(2)).await;

        let started = tokio::time::Instant::now();
        let run = coordinator.request_run().await;
        assert_eq!(coordinator.wait_idle().await, Some(RunOutcome::Completed));

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(*indicator.events.lock(), vec![("show", run), ("hide", run)]);
        assert!(backend.is_known("a.md"));
        assert!(coordinator.progress().expect("progress").is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn new_request_supersedes_active_run_promptly() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file("a.md", "");
        let indicator = Arc::new(RecordingIndicator::default());
        let coordinator =
            coordinator(backend.clone(), indicator.clone(), Duration::from_secs(60)).await;

        let started = tokio::time::Instant::now();
        let first = coordinator.request_run().await;
        let second = coordinator.request_run().await;
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(coordinator.current_version(), second);

        coordinator.shutdown().await;
        let events = indicator.events.lock().clone();
        assert_eq!(
            events,
            vec![("show", first), ("hide", first), ("show", second), ("hide", second)]
        );
    }

    #[tokio::test]
    async fn wait_idle_without_run_returns_none() {
        let backend = Arc::new(MemoryBackend::new());
        let coordinator =
            coordinator(backend, Arc::new(RecordingIndicator::default()), Duration::ZERO).await;
        assert_eq!(coordinator.wait_idle().await, None);
    }
}
