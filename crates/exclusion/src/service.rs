//! Top-level service wiring the engine, decorators and run coordinator.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::backend::{SharedBackend, SharedPresentation, SharedSnapshot};
use crate::cache::DecisionStore;
use crate::config::{ExclusionConfig, ExclusionSettings};
use crate::coordinator::{NoopIndicator, ProgressIndicator, RunCoordinator};
use crate::engine::{ExclusionEngine, RefreshReceiver};
use crate::error::Result;
use crate::guard::{ExcludingBackend, FilteringPresentation};
use crate::progress::ProgressSnapshot;
use crate::reconcile::{RunOutcome, TreeReconciler};
use crate::types::{PathDecision, RefreshReason};
use crate::watcher::RuleFileWatcher;

/// Optional collaborators for [`ExclusionService::start`].
pub struct ServiceOptions {
    pub indicator: Arc<dyn ProgressIndicator>,
    /// Overrides the persisted cache location from the config.
    pub store: Option<Arc<dyn DecisionStore>>,
    /// The host's exclude-filter list at startup.
    pub exclude_filters: Vec<String>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            indicator: Arc::new(NoopIndicator),
            store: None,
            exclude_filters: Vec::new(),
        }
    }
}

pub struct ExclusionService {
    engine: Arc<ExclusionEngine>,
    guarded_backend: Arc<ExcludingBackend>,
    presentation: Arc<FilteringPresentation>,
    coordinator: Arc<RunCoordinator>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    watcher: Mutex<Option<RuleFileWatcher>>,
    config_dirty: AtomicBool,
}

impl ExclusionService {
    /// Probes the backend, activates the engine and, unless disabled in the
    /// config, starts the first reconciliation.
    ///
    /// A failed probe is the only fatal error.
    pub async fn start(
        backend: SharedBackend,
        snapshot: SharedSnapshot,
        presentation: SharedPresentation,
        config: ExclusionConfig,
        options: ServiceOptions,
    ) -> Result<Arc<Self>> {
        if let Err(error) = backend.probe().await {
            tracing::error!("storage backend probe failed: {}", error);
            return Err(error);
        }

        let reconcile_on_start = config.reconcile_on_start;
        let min_indicator_duration = config.min_indicator_duration();
        let (engine, mut refresh_rx) =
            ExclusionEngine::new(backend.clone(), config, options.store);
        engine.set_exclude_filters(options.exclude_filters).await;
        engine.activate().await;
        while refresh_rx.try_recv().is_ok() {}

        let reconciler = Arc::new(TreeReconciler::new(
            engine.clone(),
            backend.clone(),
            snapshot,
            presentation.clone(),
        ));
        let coordinator = Arc::new(RunCoordinator::new(
            reconciler,
            options.indicator,
            min_indicator_duration,
        ));

        let service = Arc::new(Self {
            guarded_backend: Arc::new(ExcludingBackend::new(
                backend,
                engine.clone(),
                presentation.clone(),
            )),
            presentation: Arc::new(FilteringPresentation::new(presentation, engine.clone())),
            engine,
            refresh_task: Mutex::new(Some(spawn_refresh_loop(
                coordinator.clone(),
                refresh_rx,
            ))),
            coordinator,
            watcher: Mutex::new(None),
            config_dirty: AtomicBool::new(false),
        });

        if reconcile_on_start {
            service.coordinator.request_run().await;
        }
        Ok(service)
    }

    pub fn engine(&self) -> &Arc<ExclusionEngine> {
        &self.engine
    }

    /// The host's backend with the exclusion policy applied to every
    /// creation and deletion.
    pub fn guarded_backend(&self) -> SharedBackend {
        self.guarded_backend.clone()
    }

    /// The host's presentation layer with ignored insertions filtered out.
    pub fn presentation(&self) -> SharedPresentation {
        self.presentation.clone()
    }

    pub async fn is_ignored(&self, path: &str, is_folder: bool) -> bool {
        self.engine.is_ignored(path, is_folder).await
    }

    pub async fn decision(&self, path: &str, is_folder: bool) -> PathDecision {
        self.engine.decision(path, is_folder).await
    }

    /// Saves new settings. The tree is only rebuilt by the next
    /// [`ExclusionService::process_config_changes`].
    pub async fn update_settings(&self, settings: ExclusionSettings) -> bool {
        let changed = self.engine.update_settings(settings).await;
        if changed {
            self.config_dirty.store(true, Ordering::Release);
        }
        changed
    }

    /// Applies settings saved since the last call: resets the persisted cache
    /// and rebuilds the tree. Returns false when nothing was pending.
    pub async fn process_config_changes(&self) -> bool {
        if !self.config_dirty.swap(false, Ordering::AcqRel) {
            return false;
        }
        tracing::info!("exclusion settings changed, rebuilding tree");
        self.engine.reset_persisted().await;
        self.coordinator.request_run().await;
        true
    }

    /// Writes the primary rule file. A change schedules a rebuild.
    pub async fn save_primary_rules(&self, content: &str) -> Result<bool> {
        self.engine.write_primary_rules(content).await
    }

    pub fn primary_rules(&self) -> String {
        self.engine.primary_rules()
    }

    pub async fn set_exclude_filters(&self, filters: Vec<String>) {
        self.engine.set_exclude_filters(filters).await;
    }

    /// Starts a rebuild now, superseding any run in progress.
    pub async fn request_run(&self) -> u64 {
        self.coordinator.request_run().await
    }

    /// Routes a rebuild request through the same path as internal triggers.
    pub fn refresh(&self, reason: RefreshReason) {
        self.engine.notify(reason);
    }

    pub async fn wait_idle(&self) -> Option<RunOutcome> {
        self.coordinator.wait_idle().await
    }

    pub fn progress(&self) -> Option<ProgressSnapshot> {
        self.coordinator.progress()
    }

    /// Watches the rule files under a local root.
    pub fn watch_rule_files(&self, root: PathBuf) -> Result<()> {
        let config = self.engine.config();
        let watcher = RuleFileWatcher::start(
            root,
            vec![config.primary_rule_file, config.secondary_rule_file],
            self.engine.clone(),
        )?;
        if let Some(previous) = self.watcher.lock().replace(watcher) {
            previous.stop();
        }
        Ok(())
    }

    /// Cancels the active run, stops background tasks and flushes the
    /// decision cache, then puts every excluded path back into the tree.
    pub async fn shutdown(&self) {
        if let Some(task) = self.refresh_task.lock().take() {
            task.abort();
        }
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
        self.coordinator.shutdown().await;
        self.engine.deactivate().await;

        // The engine ignores nothing once inactive.
        self.coordinator.request_run().await;
        if self.coordinator.wait_idle().await != Some(RunOutcome::Completed) {
            tracing::warn!("failed to restore excluded paths on shutdown");
        }
        tracing::info!("exclusion service stopped");
    }
}

fn spawn_refresh_loop(
    coordinator: Arc<RunCoordinator>,
    mut refresh_rx: RefreshReceiver,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(reason) = refresh_rx.recv().await {
            let mut coalesced = 0usize;
            while refresh_rx.try_recv().is_ok() {
                coalesced += 1;
            }
            tracing::info!(
                "refresh requested: {:?} (+{} coalesced)",
                reason,
                coalesced
            );
            coordinator.request_run().await;
        }
    })
}
