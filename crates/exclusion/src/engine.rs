//! The long-lived exclusion component.
//!
//! `ExclusionEngine` owns the rule sources, the compiled rule set, the
//! exclude filters and the decision cache for one session. It is constructed
//! once, activated, and torn down with [`ExclusionEngine::deactivate`]; tests
//! build as many independent instances as they need.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::SharedBackend;
use crate::cache::{
    CacheFingerprint, DecisionCache, DecisionStore, FileDecisionStore, FlushQueue,
    PersistedDecisions, StoreAction,
};
use crate::config::{ExclusionConfig, ExclusionSettings};
use crate::error::Result;
use crate::matcher::{self, CompiledRuleSet, ExcludeFilters};
use crate::path::{cache_key, is_root, normalize_path};
use crate::source::{RuleSource, SourceReader};
use crate::types::{ExcludeMode, PathDecision, RefreshReason};

pub type RefreshReceiver = mpsc::UnboundedReceiver<RefreshReason>;

pub struct ExclusionEngine {
    config: RwLock<ExclusionConfig>,
    sources: SourceReader,
    rules: RwLock<Option<Arc<CompiledRuleSet>>>,
    /// Held while building or dropping the rule set.
    rules_build: Mutex<()>,
    filter_config: RwLock<Vec<String>>,
    filters: RwLock<Option<Arc<ExcludeFilters>>>,
    decisions: DecisionCache,
    flush: Option<Arc<FlushQueue>>,
    flush_worker: Mutex<Option<JoinHandle<()>>>,
    loaded: AtomicBool,
    refresh_tx: mpsc::UnboundedSender<RefreshReason>,
}

impl std::fmt::Debug for ExclusionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusionEngine")
            .field("config", &*self.config.read())
            .field("cached_decisions", &self.decisions.len())
            .field("loaded", &self.loaded.load(Ordering::Relaxed))
            .finish()
    }
}

impl ExclusionEngine {
    /// Creates an inactive engine.
    ///
    /// `store` overrides the persisted cache location; without it a
    /// [`FileDecisionStore`] is used when `config.cache_path` is set, and
    /// persistence is off otherwise. The returned receiver yields a reason
    /// every time the engine decides the tree needs reconciling.
    pub fn new(
        backend: SharedBackend,
        config: ExclusionConfig,
        store: Option<Arc<dyn DecisionStore>>,
    ) -> (Arc<Self>, RefreshReceiver) {
        let store = store.or_else(|| {
            config
                .cache_path
                .clone()
                .map(|path| Arc::new(FileDecisionStore::new(path)) as Arc<dyn DecisionStore>)
        });
        let flush = store.map(|store| Arc::new(FlushQueue::new(store, config.flush_interval())));
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

        let engine = Arc::new(Self {
            config: RwLock::new(config),
            sources: SourceReader::new(backend),
            rules: RwLock::new(None),
            rules_build: Mutex::new(()),
            filter_config: RwLock::new(Vec::new()),
            filters: RwLock::new(None),
            decisions: DecisionCache::new(),
            flush,
            flush_worker: Mutex::new(None),
            loaded: AtomicBool::new(false),
            refresh_tx,
        });
        (engine, refresh_rx)
    }

    /// Reads the rule sources, restores or resets the persisted cache, and
    /// starts answering queries.
    pub async fn activate(&self) {
        self.reload(None).await;
        let primary = self.config.read().primary_rule_file.clone();
        self.sources.has_changed(&primary).await;

        if let Some(queue) = &self.flush {
            let fingerprint = self.fingerprint().await;
            match queue.store().load().await {
                Ok(Some(stored)) if stored.is_valid_for(&fingerprint) => {
                    tracing::debug!(
                        "restored {} persisted exclusion decisions",
                        stored.entries.len()
                    );
                    self.decisions.restore(&stored.entries);
                    queue.adopt(stored).await;
                }
                Ok(stored) => {
                    if stored.is_some() {
                        tracing::debug!("persisted exclusion decisions are stale, discarding");
                    }
                    self.reset_store(queue, fingerprint).await;
                }
                Err(error) => {
                    tracing::warn!("failed to load persisted exclusion decisions: {}", error);
                    self.reset_store(queue, fingerprint).await;
                }
            }
            *self.flush_worker.lock() = Some(queue.spawn_worker());
        }

        self.loaded.store(true, Ordering::Release);
        tracing::info!(
            "exclusion engine active mode={} cached_decisions={}",
            self.exclude_mode().as_str(),
            self.decisions.len()
        );
    }

    /// Stops answering queries and flushes pending cache writes.
    pub async fn deactivate(&self) {
        self.loaded.store(false, Ordering::Release);
        if let Some(queue) = &self.flush {
            queue.stop();
        }
        let worker = self.flush_worker.lock().take();
        if let Some(worker) = worker {
            if let Err(error) = worker.await {
                tracing::warn!("decision cache worker ended abnormally: {}", error);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Whether `path` should be excluded, memoized per normalized path.
    ///
    /// Always false before activation and for the root.
    pub async fn is_ignored(&self, path: &str, is_folder: bool) -> bool {
        if !self.is_active() {
            return false;
        }
        let normalized = normalize_path(path);
        if is_root(&normalized) {
            return false;
        }

        let key = cache_key(&normalized);
        if let Some(is_ignored) = self.decisions.get(&key) {
            return is_ignored;
        }

        let generation = self.decisions.generation();
        let rules = self.rule_set();
        let filters = self.exclude_filters();
        let is_ignored = matcher::is_excluded(&rules, &filters, &normalized, is_folder);

        if self.decisions.insert(key.clone(), is_ignored, generation) {
            if let Some(queue) = &self.flush {
                queue.push(StoreAction::Put(key, is_ignored));
            }
        }
        is_ignored
    }

    pub async fn decision(&self, path: &str, is_folder: bool) -> PathDecision {
        PathDecision {
            path: normalize_path(path),
            is_folder,
            is_ignored: self.is_ignored(path, is_folder).await,
        }
    }

    /// The current rule set, compiled on first use after an invalidation.
    pub fn rule_set(&self) -> Arc<CompiledRuleSet> {
        if let Some(rules) = self.rules.read().as_ref() {
            return rules.clone();
        }

        let _build = self.rules_build.lock();
        if let Some(rules) = self.rules.read().as_ref() {
            return rules.clone();
        }

        let (primary, secondary) = {
            let config = self.config.read();
            let primary = self.sources.content(&config.primary_rule_file);
            let secondary = config
                .settings
                .should_include_git_ignore_patterns
                .then(|| self.sources.content(&config.secondary_rule_file));
            (primary, secondary)
        };
        let rules = Arc::new(CompiledRuleSet::from_sources(&primary, secondary.as_deref()));
        tracing::debug!(
            "compiled {} exclusion rules ({} skipped)",
            rules.len(),
            rules.skipped_lines()
        );
        *self.rules.write() = Some(rules.clone());
        rules
    }

    /// The host exclude filters, or an empty list when they are disabled.
    pub fn exclude_filters(&self) -> Arc<ExcludeFilters> {
        if !self.config.read().settings.should_ignore_excluded_files {
            return Arc::default();
        }
        if let Some(filters) = self.filters.read().as_ref() {
            return filters.clone();
        }
        let configured = self.filter_config.read().clone();
        let filters = Arc::new(ExcludeFilters::compile(&configured));
        *self.filters.write() = Some(filters.clone());
        filters
    }

    /// Drops the compiled rule set, the compiled filters and every cached
    /// decision.
    pub fn invalidate(&self) {
        {
            let _build = self.rules_build.lock();
            *self.rules.write() = None;
        }
        *self.filters.write() = None;
        self.decisions.clear();
        tracing::debug!("exclusion decisions invalidated");
    }

    /// Clears the decision cache and the persisted cache, re-keying the latter
    /// to the current fingerprint.
    pub async fn reset_persisted(&self) {
        self.decisions.clear();
        if let Some(queue) = &self.flush {
            let fingerprint = self.fingerprint().await;
            self.reset_store(queue, fingerprint).await;
        }
    }

    /// Drops every in-memory decision and, once active, re-keys the persisted
    /// cache so entries computed under the old rules are never restored.
    async fn invalidate_and_rekey(&self) {
        self.invalidate();
        if !self.is_active() {
            return;
        }
        if let Some(queue) = &self.flush {
            let fingerprint = self.fingerprint().await;
            self.reset_store(queue, fingerprint).await;
        }
    }

    async fn reset_store(&self, queue: &FlushQueue, fingerprint: CacheFingerprint) {
        queue.adopt(PersistedDecisions::new(fingerprint.clone())).await;
        queue.push(StoreAction::Reset(fingerprint));
        if let Err(error) = queue.flush().await {
            tracing::warn!("failed to reset persisted exclusion decisions: {}", error);
        }
    }

    /// Writes any queued decisions to the store now.
    pub async fn flush_cache(&self) -> Result<()> {
        match &self.flush {
            Some(queue) => queue.flush().await,
            None => Ok(()),
        }
    }

    /// Combined state of everything the decisions depend on.
    pub async fn fingerprint(&self) -> CacheFingerprint {
        let (primary, secondary, include_secondary, filters_enabled) = {
            let config = self.config.read();
            (
                config.primary_rule_file.clone(),
                config.secondary_rule_file.clone(),
                config.settings.should_include_git_ignore_patterns,
                config.settings.should_ignore_excluded_files,
            )
        };
        let primary_mtime = self.sources.current_mtime(&primary).await;
        let secondary_mtime = if include_secondary {
            self.sources.current_mtime(&secondary).await
        } else {
            0
        };
        let exclude_filters = if filters_enabled {
            self.filter_config.read().join("\n")
        } else {
            String::new()
        };
        CacheFingerprint {
            primary_mtime,
            secondary_mtime,
            exclude_filters,
        }
    }

    /// Re-reads the rule sources. With `primary_content`, the primary rule
    /// file is written instead of read. Returns true if any content changed.
    pub async fn reload(&self, primary_content: Option<&str>) -> bool {
        let changed = self.read_sources(primary_content).await;
        if changed {
            self.invalidate_and_rekey().await;
        }
        changed
    }

    async fn read_sources(&self, primary_content: Option<&str>) -> bool {
        let (primary, secondary, include_secondary) = self.rule_file_names();

        let primary_changed = match primary_content {
            Some(content) => match self.sources.write(&primary, content).await {
                Ok(changed) => changed,
                Err(error) => {
                    tracing::warn!("failed to write rule file {}: {}", primary, error);
                    false
                }
            },
            None => self.sources.refresh(&primary).await,
        };
        let secondary_changed = if include_secondary {
            self.sources.refresh(&secondary).await
        } else {
            self.sources.clear(&secondary).await
        };

        primary_changed || secondary_changed
    }

    /// Replaces the primary rule file verbatim. Returns false without writing
    /// when the content is unchanged.
    pub async fn write_primary_rules(&self, content: &str) -> Result<bool> {
        let (primary, _, _) = self.rule_file_names();
        let changed = self.sources.write(&primary, content).await?;
        if changed {
            // Absorb the mtime bump caused by our own write.
            self.sources.has_changed(&primary).await;
            self.invalidate_and_rekey().await;
            self.notify(RefreshReason::RuleSourceChanged(primary));
        }
        Ok(changed)
    }

    /// Called when the host reports a path as deleted, or reports a change to
    /// a hidden file it does not track. Drops the cached decision and, for
    /// rule files, re-reads them. Returns true if the rules changed.
    pub async fn handle_deleted_or_dot_file(&self, path: &str) -> bool {
        let normalized = normalize_path(path);
        let key = cache_key(&normalized);
        if self.decisions.remove(&key).is_some() {
            if let Some(queue) = &self.flush {
                queue.push(StoreAction::Delete(key));
            }
        }

        let (primary, secondary, include_secondary) = self.rule_file_names();
        let mut changed = false;
        if normalized == normalize_path(&primary) {
            self.sources.has_changed(&primary).await;
            changed |= self.sources.refresh(&primary).await;
        }
        if include_secondary && normalized == normalize_path(&secondary) {
            changed |= self.sources.refresh(&secondary).await;
        }

        if changed {
            tracing::info!("rule file {} changed", normalized);
            self.invalidate_and_rekey().await;
            self.notify(RefreshReason::RuleSourceChanged(normalized));
        }
        changed
    }

    /// True once per modification of the primary rule file.
    pub async fn primary_rules_modified(&self) -> bool {
        let (primary, _, _) = self.rule_file_names();
        self.sources.has_changed(&primary).await
    }

    /// Replaces the host's exclude-filter list.
    pub async fn set_exclude_filters(&self, filters: Vec<String>) {
        let changed = {
            let mut configured = self.filter_config.write();
            if *configured == filters {
                false
            } else {
                *configured = filters;
                true
            }
        };
        *self.filters.write() = None;

        let enabled = self.config.read().settings.should_ignore_excluded_files;
        if changed && enabled {
            self.invalidate_and_rekey().await;
            self.notify(RefreshReason::ExcludeFiltersChanged);
        }
    }

    pub fn exclude_filter_config(&self) -> Vec<String> {
        self.filter_config.read().clone()
    }

    /// Applies new settings. Returns true if anything changed; decisions are
    /// only invalidated when the change affects which paths are ignored.
    pub async fn update_settings(&self, settings: ExclusionSettings) -> bool {
        let previous = {
            let mut config = self.config.write();
            std::mem::replace(&mut config.settings, settings.clone())
        };
        if previous == settings {
            return false;
        }
        if previous.affects_decisions(&settings) {
            self.read_sources(None).await;
            self.invalidate_and_rekey().await;
        }
        true
    }

    pub fn settings(&self) -> ExclusionSettings {
        self.config.read().settings.clone()
    }

    pub fn config(&self) -> ExclusionConfig {
        self.config.read().clone()
    }

    pub fn exclude_mode(&self) -> ExcludeMode {
        self.config.read().settings.exclude_mode
    }

    pub fn rule_source(&self, name: &str) -> Option<RuleSource> {
        self.sources.source(name)
    }

    /// Cached content of the primary rule file.
    pub fn primary_rules(&self) -> String {
        let (primary, _, _) = self.rule_file_names();
        self.sources.content(&primary)
    }

    pub fn cached_decisions(&self) -> usize {
        self.decisions.len()
    }

    /// Asks whoever drives reconciliation to start a new run.
    pub fn notify(&self, reason: RefreshReason) {
        if self.refresh_tx.send(reason).is_err() {
            tracing::debug!("no refresh listener attached, dropping refresh request");
        }
    }

    fn rule_file_names(&self) -> (String, String, bool) {
        let config = self.config.read();
        (
            config.primary_rule_file.clone(),
            config.secondary_rule_file.clone(),
            config.settings.should_include_git_ignore_patterns,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::cache::MemoryDecisionStore;
    use crate::config::{PRIMARY_RULE_FILE, SECONDARY_RULE_FILE};

    async fn active_engine(
        backend: &Arc<MemoryBackend>,
        config: ExclusionConfig,
    ) -> (Arc<ExclusionEngine>, RefreshReceiver) {
        let (engine, rx) = ExclusionEngine::new(backend.clone(), config, None);
        engine.activate().await;
        (engine, rx)
    }

    #[tokio::test]
    async fn inactive_engine_ignores_nothing() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file(PRIMARY_RULE_FILE, "*");
        let (engine, _rx) = ExclusionEngine::new(backend.clone(), ExclusionConfig::default(), None);

        assert!(!engine.is_ignored("notes/a.md", false).await);
        engine.activate().await;
        assert!(engine.is_ignored("notes/a.md", false).await);
        engine.deactivate().await;
        assert!(!engine.is_ignored("notes/a.md", false).await);
    }

    #[tokio::test]
    async fn root_is_never_ignored() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file(PRIMARY_RULE_FILE, "*\n**\n/");
        let (engine, _rx) = active_engine(&backend, ExclusionConfig::default()).await;
        assert!(!engine.is_ignored("/", true).await);
        assert!(!engine.is_ignored("", true).await);
    }

    #[tokio::test]
    async fn decisions_are_memoized_until_invalidated() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file(PRIMARY_RULE_FILE, "drafts/");
        let (engine, _rx) = active_engine(&backend, ExclusionConfig::default()).await;

        assert!(engine.is_ignored("drafts", true).await);
        assert!(engine.is_ignored("Drafts", true).await);
        assert_eq!(engine.cached_decisions(), 1);

        backend.add_file(PRIMARY_RULE_FILE, "");
        assert!(engine.is_ignored("drafts", true).await, "memoized answer");

        assert!(engine.reload(None).await);
        assert!(!engine.is_ignored("drafts", true).await);
    }

    #[tokio::test]
    async fn secondary_rules_follow_the_include_setting() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file(SECONDARY_RULE_FILE, "build/");
        let (engine, _rx) = active_engine(&backend, ExclusionConfig::default()).await;
        assert!(engine.is_ignored("build", true).await);

        let changed = engine
            .update_settings(ExclusionSettings {
                should_include_git_ignore_patterns: false,
                ..engine.settings()
            })
            .await;
        assert!(changed);
        assert!(!engine.is_ignored("build", true).await);
    }

    #[tokio::test]
    async fn exclude_filters_apply_only_when_enabled() {
        let backend = Arc::new(MemoryBackend::new());
        let (engine, mut rx) = active_engine(&backend, ExclusionConfig::default()).await;
        engine
            .set_exclude_filters(vec!["/^temp/i/".to_string()])
            .await;
        assert!(!engine.is_ignored("temp123.md", false).await);

        engine
            .update_settings(ExclusionSettings {
                should_ignore_excluded_files: true,
                ..engine.settings()
            })
            .await;
        assert!(engine.is_ignored("temp123.md", false).await);
        assert!(!engine.is_ignored("notes/temp.md", false).await);

        engine
            .set_exclude_filters(vec!["notes/".to_string()])
            .await;
        assert_eq!(rx.try_recv().ok(), Some(RefreshReason::ExcludeFiltersChanged));
        assert!(!engine.is_ignored("temp123.md", false).await);
        assert!(engine.is_ignored("notes/temp.md", false).await);
    }

    #[tokio::test]
    async fn mode_change_keeps_decisions() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file(PRIMARY_RULE_FILE, "*.tmp");
        let (engine, _rx) = active_engine(&backend, ExclusionConfig::default()).await;
        assert!(engine.is_ignored("a.tmp", false).await);

        let changed = engine
            .update_settings(ExclusionSettings {
                exclude_mode: ExcludeMode::FilesPaneOnly,
                ..engine.settings()
            })
            .await;
        assert!(changed);
        assert_eq!(engine.cached_decisions(), 1);
        assert_eq!(engine.exclude_mode(), ExcludeMode::FilesPaneOnly);
    }

    #[tokio::test]
    async fn rule_file_deletion_triggers_refresh() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file(PRIMARY_RULE_FILE, "drafts/");
        let (engine, mut rx) = active_engine(&backend, ExclusionConfig::default()).await;
        assert!(engine.is_ignored("drafts", true).await);

        backend.remove_live(PRIMARY_RULE_FILE);
        assert!(engine.handle_deleted_or_dot_file(PRIMARY_RULE_FILE).await);
        assert_eq!(
            rx.try_recv().ok(),
            Some(RefreshReason::RuleSourceChanged(PRIMARY_RULE_FILE.to_string()))
        );
        assert!(!engine.is_ignored("drafts", true).await);

        assert!(!engine.handle_deleted_or_dot_file("notes/a.md").await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn write_primary_rules_is_verbatim_and_idempotent() {
        let backend = Arc::new(MemoryBackend::new());
        let (engine, mut rx) = active_engine(&backend, ExclusionConfig::default()).await;

        let rules = "# private\nprivate/\n!private/readme.md\n";
        assert!(engine.write_primary_rules(rules).await.expect("write"));
        assert!(!engine.write_primary_rules(rules).await.expect("write"));
        assert_eq!(engine.primary_rules(), rules);
        assert_eq!(
            rx.try_recv().ok(),
            Some(RefreshReason::RuleSourceChanged(PRIMARY_RULE_FILE.to_string()))
        );
        assert!(rx.try_recv().is_err());
        assert!(!engine.primary_rules_modified().await);
        assert!(engine.is_ignored("private", true).await);
    }

    #[tokio::test]
    async fn persisted_decisions_survive_restart_with_same_fingerprint() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file(PRIMARY_RULE_FILE, "drafts/");
        let store = Arc::new(MemoryDecisionStore::new());

        let (engine, _rx) =
            ExclusionEngine::new(backend.clone(), ExclusionConfig::default(), Some(store.clone()));
        engine.activate().await;
        assert!(engine.is_ignored("drafts", true).await);
        assert!(!engine.is_ignored("notes", true).await);
        engine.deactivate().await;

        let saved = store.contents().expect("saved");
        assert_eq!(saved.entries.len(), 2);

        let (restarted, _rx) =
            ExclusionEngine::new(backend.clone(), ExclusionConfig::default(), Some(store.clone()));
        restarted.activate().await;
        assert_eq!(restarted.cached_decisions(), 2);
        restarted.deactivate().await;
    }

    #[tokio::test]
    async fn persisted_decisions_are_discarded_on_fingerprint_mismatch() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file(PRIMARY_RULE_FILE, "drafts/");
        let mut stale = PersistedDecisions::new(CacheFingerprint {
            primary_mtime: 999,
            ..CacheFingerprint::default()
        });
        stale.entries.insert("drafts".to_string(), false);
        let store = Arc::new(MemoryDecisionStore::with_contents(stale));

        let (engine, _rx) =
            ExclusionEngine::new(backend.clone(), ExclusionConfig::default(), Some(store.clone()));
        engine.activate().await;

        assert_eq!(engine.cached_decisions(), 0);
        assert!(engine.is_ignored("drafts", true).await);
        let reset = store.contents().expect("reset written");
        assert!(reset.entries.is_empty());
        assert_eq!(reset.fingerprint, engine.fingerprint().await);
        engine.deactivate().await;
    }

    fn filters_enabled() -> ExclusionConfig {
        let mut config = ExclusionConfig::default();
        config.settings.should_ignore_excluded_files = true;
        config
    }

    #[tokio::test]
    async fn filter_change_rekeys_persisted_decisions() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(MemoryDecisionStore::new());

        let (engine, _rx) =
            ExclusionEngine::new(backend.clone(), filters_enabled(), Some(store.clone()));
        engine.set_exclude_filters(vec!["temp".to_string()]).await;
        engine.activate().await;
        assert!(engine.is_ignored("temp.md", false).await);

        engine.set_exclude_filters(Vec::new()).await;
        assert!(!engine.is_ignored("temp.md", false).await);
        engine.deactivate().await;

        let saved = store.contents().expect("saved");
        assert_eq!(saved.fingerprint.exclude_filters, "");
        assert_eq!(saved.entries.get("temp.md"), Some(&false));

        let (restarted, _rx) =
            ExclusionEngine::new(backend.clone(), filters_enabled(), Some(store.clone()));
        restarted.set_exclude_filters(vec!["temp".to_string()]).await;
        restarted.activate().await;
        assert_eq!(restarted.cached_decisions(), 0);
        assert!(restarted.is_ignored("temp.md", false).await);
        restarted.deactivate().await;
    }

    #[tokio::test]
    async fn rule_change_rekeys_persisted_decisions() {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file(PRIMARY_RULE_FILE, "drafts/");
        let store = Arc::new(MemoryDecisionStore::new());

        let (engine, _rx) =
            ExclusionEngine::new(backend.clone(), ExclusionConfig::default(), Some(store.clone()));
        engine.activate().await;
        assert!(engine.is_ignored("drafts", true).await);
        let before = store.contents().expect("saved").fingerprint;

        assert!(engine.write_primary_rules("").await.expect("write"));
        assert!(!engine.is_ignored("drafts", true).await);
        engine.deactivate().await;

        let saved = store.contents().expect("saved");
        assert_ne!(saved.fingerprint, before);
        assert_eq!(saved.fingerprint, engine.fingerprint().await);
        assert_eq!(saved.entries.get("drafts"), Some(&false));
    }
}
