//! Rule-file change notifications for backends rooted on the local disk.
//!
//! Hosts that already report file events through the storage backend do not
//! need this. For [`crate::backend::LocalFsBackend`] it watches the folders
//! holding the rule files and routes matching events to
//! [`ExclusionEngine::handle_deleted_or_dot_file`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::ExclusionEngine;
use crate::error::{ExclusionError, Result};
use crate::path::{normalize_path, parent, ROOT_PATH};

pub struct RuleFileWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for RuleFileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleFileWatcher")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

impl RuleFileWatcher {
    /// Starts watching. Must be called from within a tokio runtime.
    pub fn start(
        root: PathBuf,
        rule_files: Vec<String>,
        engine: Arc<ExclusionEngine>,
    ) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = recommended_watcher(move |event_result: notify::Result<Event>| {
            let _ = tx.send(event_result);
        })
        .map_err(|error| {
            ExclusionError::Internal(format!(
                "failed to create rule file watcher for {}: {error}",
                root.display()
            ))
        })?;

        for folder in watched_folders(&rule_files) {
            let target = if folder == ROOT_PATH {
                root.clone()
            } else {
                root.join(&folder)
            };
            if let Err(error) = watcher.watch(&target, RecursiveMode::NonRecursive) {
                tracing::warn!("failed to watch {}: {}", target.display(), error);
            }
        }

        let task = tokio::spawn(async move {
            while let Some(event_result) = rx.recv().await {
                match event_result {
                    Ok(event) => {
                        for path in rule_paths_in_event(&root, &rule_files, &event) {
                            engine.handle_deleted_or_dot_file(&path).await;
                        }
                    }
                    Err(error) => tracing::warn!("rule file watcher error: {}", error),
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

fn watched_folders(rule_files: &[String]) -> BTreeSet<String> {
    rule_files
        .iter()
        .map(|file| parent(&normalize_path(file)))
        .collect()
}

/// Rule files touched by `event`, as normalized root-relative paths.
pub fn rule_paths_in_event(root: &Path, rule_files: &[String], event: &Event) -> Vec<String> {
    if matches!(event.kind, EventKind::Access(_)) {
        return Vec::new();
    }
    let wanted: BTreeSet<String> = rule_files.iter().map(|file| normalize_path(file)).collect();

    let mut touched = BTreeSet::new();
    for path in &event.paths {
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative = normalize_path(&relative.to_string_lossy());
        if wanted.contains(&relative) {
            touched.insert(relative);
        }
    }
    touched.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};

    fn rule_files() -> Vec<String> {
        vec![".obsidianignore".to_string(), ".gitignore".to_string()]
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn picks_rule_files_out_of_events() {
        let root = Path::new("/vault");
        let modified = event(
            EventKind::Modify(ModifyKind::Any),
            &["/vault/.obsidianignore", "/vault/notes/a.md", "/vault/.gitignore"],
        );
        assert_eq!(
            rule_paths_in_event(root, &rule_files(), &modified),
            vec![".gitignore".to_string(), ".obsidianignore".to_string()]
        );

        let removed = event(EventKind::Remove(RemoveKind::File), &["/vault/.gitignore"]);
        assert_eq!(
            rule_paths_in_event(root, &rule_files(), &removed),
            vec![".gitignore".to_string()]
        );
    }

    #[test]
    fn ignores_access_and_foreign_paths() {
        let root = Path::new("/vault");
        let accessed = event(
            EventKind::Access(AccessKind::Any),
            &["/vault/.obsidianignore"],
        );
        assert!(rule_paths_in_event(root, &rule_files(), &accessed).is_empty());

        let elsewhere = event(
            EventKind::Create(CreateKind::File),
            &["/other/.obsidianignore", "/vault/sub/.gitignore"],
        );
        assert!(rule_paths_in_event(root, &rule_files(), &elsewhere).is_empty());
    }

    #[test]
    fn watches_each_rule_folder_once() {
        let folders = watched_folders(&[
            ".obsidianignore".to_string(),
            ".gitignore".to_string(),
            "config/.ignore".to_string(),
        ]);
        assert_eq!(
            folders.into_iter().collect::<Vec<_>>(),
            vec![ROOT_PATH.to_string(), "config".to_string()]
        );
    }
}
