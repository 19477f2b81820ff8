//! Decorators that apply the exclusion policy at every host mutation point.
//!
//! The host keeps calling its storage backend and presentation layer as
//! usual; wrapping them in [`ExcludingBackend`] and [`FilteringPresentation`]
//! makes ignored paths disappear from the tree (or only from the file list in
//! `FilesPaneOnly` mode) without the host knowing about the rules.

use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::{Presentation, SharedBackend, SharedPresentation, StorageBackend};
use crate::engine::ExclusionEngine;
use crate::error::Result;
use crate::path::is_hidden;
use crate::types::{ExcludeMode, FileStat, ListedChildren};

pub struct ExcludingBackend {
    inner: SharedBackend,
    engine: Arc<ExclusionEngine>,
    presentation: SharedPresentation,
}

impl ExcludingBackend {
    pub fn new(
        inner: SharedBackend,
        engine: Arc<ExclusionEngine>,
        presentation: SharedPresentation,
    ) -> Self {
        Self {
            inner,
            engine,
            presentation,
        }
    }

    pub fn inner(&self) -> &SharedBackend {
        &self.inner
    }

    async fn reconcile_creation(&self, path: &str, is_folder: bool) -> Result<()> {
        if is_hidden(path) {
            self.engine.handle_deleted_or_dot_file(path).await;
        }

        let is_ignored = self.engine.is_ignored(path, is_folder).await;
        if is_ignored && self.engine.exclude_mode() == ExcludeMode::Full {
            tracing::debug!("skipping creation of excluded path {}", path);
            return Ok(());
        }

        if is_folder {
            self.inner.reconcile_folder_creation(path).await?;
        } else {
            self.inner.reconcile_file_creation(path).await?;
        }

        if is_ignored {
            self.presentation.remove(path).await;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for ExcludingBackend {
    async fn probe(&self) -> Result<()> {
        self.inner.probe().await
    }

    async fn list(&self, folder: &str) -> Result<ListedChildren> {
        self.inner.list(folder).await
    }

    async fn reconcile_file_creation(&self, path: &str) -> Result<()> {
        self.reconcile_creation(path, false).await
    }

    async fn reconcile_folder_creation(&self, path: &str) -> Result<()> {
        self.reconcile_creation(path, true).await
    }

    async fn reconcile_deletion(&self, path: &str) -> Result<()> {
        let result = self.inner.reconcile_deletion(path).await;
        self.engine.handle_deleted_or_dot_file(path).await;
        result
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        self.inner.write(path, content).await
    }

    async fn stat(&self, path: &str) -> Result<Option<FileStat>> {
        self.inner.stat(path).await
    }
}

/// Drops presentation insertions of ignored paths in `FilesPaneOnly` mode.
pub struct FilteringPresentation {
    inner: SharedPresentation,
    engine: Arc<ExclusionEngine>,
}

impl FilteringPresentation {
    pub fn new(inner: SharedPresentation, engine: Arc<ExclusionEngine>) -> Self {
        Self { inner, engine }
    }
}

#[async_trait]
impl Presentation for FilteringPresentation {
    async fn insert(&self, path: &str, is_folder: bool) {
        if self.engine.exclude_mode() == ExcludeMode::FilesPaneOnly
            && self.engine.is_ignored(path, is_folder).await
        {
            tracing::debug!("hiding excluded path {} from presentation", path);
            return;
        }
        self.inner.insert(path, is_folder).await;
    }

    async fn remove(&self, path: &str) {
        self.inner.remove(path).await;
    }

    fn contains(&self, path: &str) -> bool {
        self.inner.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendOp, MemoryBackend, MemoryPresentation};
    use crate::config::{ExclusionConfig, ExclusionSettings, PRIMARY_RULE_FILE};
    use crate::engine::RefreshReceiver;
    use crate::types::RefreshReason;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        presentation: Arc<MemoryPresentation>,
        engine: Arc<ExclusionEngine>,
        guarded: ExcludingBackend,
        rx: RefreshReceiver,
    }

    async fn fixture(rules: &str, mode: ExcludeMode) -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        backend.add_file(PRIMARY_RULE_FILE, rules);
        let config = ExclusionConfig {
            settings: ExclusionSettings {
                exclude_mode: mode,
                ..ExclusionSettings::default()
            },
            ..ExclusionConfig::default()
        };
        let (engine, rx) = ExclusionEngine::new(backend.clone(), config, None);
        engine.activate().await;
        let presentation = Arc::new(MemoryPresentation::new());
        let guarded = ExcludingBackend::new(backend.clone(), engine.clone(), presentation.clone());
        backend.clear_ops();
        Fixture {
            backend,
            presentation,
            engine,
            guarded,
            rx,
        }
    }

    #[tokio::test]
    async fn full_mode_skips_excluded_creations() {
        let fx = fixture("drafts/\n*.tmp", ExcludeMode::Full).await;

        fx.guarded.reconcile_folder_creation("drafts").await.expect("create");
        fx.guarded.reconcile_file_creation("a.tmp").await.expect("create");
        fx.guarded.reconcile_file_creation("a.md").await.expect("create");

        assert_eq!(fx.backend.mutations(), vec![BackendOp::CreateFile("a.md".into())]);
        assert!(!fx.backend.is_known("drafts"));
    }

    #[tokio::test]
    async fn files_pane_mode_registers_but_hides() {
        let fx = fixture("drafts/", ExcludeMode::FilesPaneOnly).await;
        fx.presentation.insert("drafts", true).await;

        fx.guarded.reconcile_folder_creation("drafts").await.expect("create");

        assert!(fx.backend.is_known("drafts"));
        assert!(!fx.presentation.contains("drafts"));
    }

    #[tokio::test]
    async fn deleting_a_rule_file_requests_refresh() {
        let mut fx = fixture("drafts/", ExcludeMode::Full).await;
        fx.backend.register(PRIMARY_RULE_FILE, false);
        fx.backend.remove_live(PRIMARY_RULE_FILE);

        fx.guarded.reconcile_deletion(PRIMARY_RULE_FILE).await.expect("delete");

        assert_eq!(
            fx.rx.try_recv().ok(),
            Some(RefreshReason::RuleSourceChanged(PRIMARY_RULE_FILE.to_string()))
        );
        assert!(!fx.engine.is_ignored("drafts", true).await);
    }

    #[tokio::test]
    async fn failed_deletion_still_drops_cached_decision() {
        let fx = fixture("*.tmp", ExcludeMode::Full).await;
        assert!(fx.engine.is_ignored("a.tmp", false).await);
        fx.backend.fail_path("a.tmp");

        assert!(fx.guarded.reconcile_deletion("a.tmp").await.is_err());
        assert_eq!(fx.engine.cached_decisions(), 0);
    }

    #[tokio::test]
    async fn filtering_presentation_only_filters_in_files_pane_mode() {
        let fx = fixture("*.tmp", ExcludeMode::FilesPaneOnly).await;
        let inner = Arc::new(MemoryPresentation::new());
        let filtering = FilteringPresentation::new(inner.clone(), fx.engine.clone());

        filtering.insert("a.tmp", false).await;
        filtering.insert("a.md", false).await;
        assert_eq!(inner.visible(), vec!["a.md".to_string()]);

        fx.engine
            .update_settings(ExclusionSettings {
                exclude_mode: ExcludeMode::Full,
                ..fx.engine.settings()
            })
            .await;
        filtering.insert("a.tmp", false).await;
        assert!(filtering.contains("a.tmp"));
    }
}
