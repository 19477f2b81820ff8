//! Tree reconciliation.
//!
//! Walks the live listing depth-first and brings the host's registered tree in
//! line with the current exclusion decisions. Every unit of work (a child, an
//! orphan, a subfolder) starts with a cancellation check, so a superseded run
//! stops after at most one more backend call.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::backend::{SharedBackend, SharedPresentation, SharedSnapshot};
use crate::cancel::CancellationToken;
use crate::engine::ExclusionEngine;
use crate::path::{is_hidden, is_root, normalize_path};
use crate::progress::ReconcileProgress;
use crate::types::ExcludeMode;

type WalkFuture<'a> = Pin<Box<dyn Future<Output = Option<()>> + Send + 'a>>;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// Relationship between a live entry and the host's snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    /// Live but not yet registered.
    New,
    /// Live and already registered.
    Kept,
}

/// Per-run state threaded through the walk.
struct WalkContext<'a> {
    token: &'a CancellationToken,
    progress: &'a ReconcileProgress,
    mode: ExcludeMode,
}

pub struct TreeReconciler {
    engine: Arc<ExclusionEngine>,
    backend: SharedBackend,
    snapshot: SharedSnapshot,
    presentation: SharedPresentation,
}

impl TreeReconciler {
    pub fn new(
        engine: Arc<ExclusionEngine>,
        backend: SharedBackend,
        snapshot: SharedSnapshot,
        presentation: SharedPresentation,
    ) -> Self {
        Self {
            engine,
            backend,
            snapshot,
            presentation,
        }
    }

    /// Reconciles the subtree at `root`. Returns early, without undoing
    /// anything, once `token` is cancelled.
    pub async fn reconcile(
        &self,
        root: &str,
        token: &CancellationToken,
        progress: &ReconcileProgress,
    ) -> RunOutcome {
        let root = normalize_path(root);
        let ctx = WalkContext {
            token,
            progress,
            mode: self.engine.exclude_mode(),
        };
        tracing::debug!(
            "reconciling {} (run {}, mode {})",
            root,
            token.version(),
            ctx.mode.as_str()
        );

        let outcome = match self.reconcile_root(root, &ctx).await {
            Some(()) => RunOutcome::Completed,
            None => RunOutcome::Cancelled,
        };
        progress.finish();
        outcome
    }

    async fn reconcile_root(&self, root: String, ctx: &WalkContext<'_>) -> Option<()> {
        ctx.token.is_cancelled()?;
        if self.snapshot.children(&root).is_none() {
            if let Err(error) = self.backend.reconcile_folder_creation(&root).await {
                tracing::warn!("failed to register root folder {}: {}", root, error);
                ctx.progress.record_error();
            }
        }
        if !is_root(&root) && self.engine.is_ignored(&root, true).await {
            tracing::debug!("reconcile root {} is excluded, nothing to do", root);
            return Some(());
        }
        self.walk(root, ctx).await
    }

    fn walk<'a>(&'a self, folder: String, ctx: &'a WalkContext<'a>) -> WalkFuture<'a> {
        Box::pin(async move {
            ctx.token.is_cancelled()?;
            ctx.progress.add_total(1);

            let listed = match self.backend.list(&folder).await {
                Ok(listed) => listed,
                Err(error) => {
                    tracing::warn!("failed to list {}: {}", folder, error);
                    ctx.progress.record_error();
                    ctx.progress.complete_one();
                    return Some(());
                }
            };
            ctx.progress.add_total(listed.len());

            let known: HashSet<String> = self
                .snapshot
                .children(&folder)
                .unwrap_or_default()
                .into_iter()
                .collect();
            let mut orphans: BTreeSet<String> = known.iter().cloned().collect();

            let entries = listed
                .folders
                .into_iter()
                .map(|path| (path, true))
                .chain(listed.files.into_iter().map(|path| (path, false)));

            let mut included_folders = Vec::new();
            for (path, is_folder) in entries {
                ctx.token.is_cancelled()?;
                if is_hidden(&path) {
                    ctx.progress.complete_one();
                    continue;
                }
                orphans.remove(&path);

                let state = if known.contains(&path) {
                    EntryState::Kept
                } else {
                    EntryState::New
                };
                if self.reconcile_entry(&path, is_folder, state, ctx).await && is_folder {
                    included_folders.push(path);
                }
                ctx.progress.complete_one();
            }

            ctx.progress.add_total(orphans.len());
            for orphan in orphans {
                ctx.token.is_cancelled()?;
                tracing::debug!("removing orphan {}", orphan);
                self.delete(&orphan, ctx).await;
                ctx.progress.complete_one();
            }

            for subfolder in included_folders {
                ctx.token.is_cancelled()?;
                self.walk(subfolder, ctx).await?;
            }

            ctx.progress.complete_one();
            Some(())
        })
    }

    /// Applies the current decision to one live entry. Returns true if the
    /// entry ends up registered.
    async fn reconcile_entry(
        &self,
        path: &str,
        is_folder: bool,
        state: EntryState,
        ctx: &WalkContext<'_>,
    ) -> bool {
        let is_ignored = self.engine.is_ignored(path, is_folder).await;

        if is_ignored && ctx.mode == ExcludeMode::Full {
            if state == EntryState::Kept {
                tracing::debug!("unregistering excluded {}", path);
                self.delete(path, ctx).await;
            }
            return false;
        }

        if state == EntryState::New {
            let created = if is_folder {
                self.backend.reconcile_folder_creation(path).await
            } else {
                self.backend.reconcile_file_creation(path).await
            };
            if let Err(error) = created {
                tracing::warn!("failed to register {}: {}", path, error);
                ctx.progress.record_error();
                return false;
            }
        }

        if ctx.mode == ExcludeMode::FilesPaneOnly {
            if is_ignored {
                self.presentation.remove(path).await;
            } else {
                self.presentation.insert(path, is_folder).await;
            }
        }
        true
    }

    async fn delete(&self, path: &str, ctx: &WalkContext<'_>) {
        if let Err(error) = self.backend.reconcile_deletion(path).await {
            tracing::warn!("failed to unregister {}: {}", path, error);
            ctx.progress.record_error();
        }
    }
}
