//! In-memory backend and presentation layer.
//!
//! `MemoryBackend` keeps two views: the live tree (what a listing returns) and
//! the known tree (what has been registered through reconciliation). Every
//! trait call is recorded so callers can assert on the exact side effects.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::{KnownTree, Presentation, StorageBackend, TreeSnapshot};
use crate::error::{ExclusionError, Result};
use crate::path::{is_root, normalize_path, parent};
use crate::types::{FileStat, ListedChildren};

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOp {
    List(String),
    CreateFile(String),
    CreateFolder(String),
    Delete(String),
    Read(String),
    Write(String),
    Stat(String),
}

impl BackendOp {
    /// True for calls that change the known tree.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreateFile(_) | Self::CreateFolder(_) | Self::Delete(_)
        )
    }

    pub fn path(&self) -> &str {
        match self {
            Self::List(path)
            | Self::CreateFile(path)
            | Self::CreateFolder(path)
            | Self::Delete(path)
            | Self::Read(path)
            | Self::Write(path)
            | Self::Stat(path) => path,
        }
    }
}

#[derive(Debug, Clone)]
struct LiveEntry {
    is_folder: bool,
    content: Vec<u8>,
    mtime: u64,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    live: RwLock<BTreeMap<String, LiveEntry>>,
    known: KnownTree,
    ops: Mutex<Vec<BackendOp>>,
    failing: RwLock<HashSet<String>>,
    clock: AtomicU64,
    unavailable: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose probe fails.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Adds a file to the live tree, creating parent folders as needed.
    pub fn add_file(&self, path: &str, content: &str) {
        let path = normalize_path(path);
        self.add_parents(&path);
        let mtime = self.tick();
        self.live.write().insert(
            path,
            LiveEntry {
                is_folder: false,
                content: content.as_bytes().to_vec(),
                mtime,
            },
        );
    }

    pub fn add_folder(&self, path: &str) {
        let path = normalize_path(path);
        self.add_parents(&path);
        let mtime = self.tick();
        self.live.write().entry(path).or_insert(LiveEntry {
            is_folder: true,
            content: Vec::new(),
            mtime,
        });
    }

    /// Removes a path and its descendants from the live tree only.
    pub fn remove_live(&self, path: &str) {
        let path = normalize_path(path);
        let prefix = format!("{path}/");
        self.live
            .write()
            .retain(|candidate, _| candidate != &path && !candidate.starts_with(&prefix));
    }

    /// Marks a path as already registered, as if the host loaded it earlier.
    pub fn register(&self, path: &str, is_folder: bool) {
        self.known.insert(path, is_folder);
    }

    /// Registers every live entry.
    pub fn register_all_live(&self) {
        for (path, entry) in self.live.read().iter() {
            self.known.insert(path, entry.is_folder);
        }
    }

    /// Makes every subsequent mutation on `path` fail.
    pub fn fail_path(&self, path: &str) {
        self.failing.write().insert(normalize_path(path));
    }

    pub fn known(&self) -> &KnownTree {
        &self.known
    }

    pub fn is_known(&self, path: &str) -> bool {
        self.known.contains(path)
    }

    pub fn ops(&self) -> Vec<BackendOp> {
        self.ops.lock().clone()
    }

    pub fn mutations(&self) -> Vec<BackendOp> {
        self.ops
            .lock()
            .iter()
            .filter(|op| op.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().clear();
    }

    fn add_parents(&self, path: &str) {
        let mut folder = parent(path);
        let mut missing = Vec::new();
        while !is_root(&folder) {
            missing.push(folder.clone());
            folder = parent(&folder);
        }
        let mut live = self.live.write();
        for folder in missing {
            live.entry(folder).or_insert(LiveEntry {
                is_folder: true,
                content: Vec::new(),
                mtime: 0,
            });
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn record(&self, op: BackendOp) -> Result<()> {
        let failing = self.failing.read().contains(op.path());
        self.ops.lock().push(op.clone());
        if failing && op.is_mutation() {
            return Err(ExclusionError::backend(op.path(), "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn probe(&self) -> Result<()> {
        if self.unavailable {
            return Err(ExclusionError::BackendUnavailable(
                "memory backend marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn list(&self, folder: &str) -> Result<ListedChildren> {
        let folder = normalize_path(folder);
        self.record(BackendOp::List(folder.clone()))?;
        let live = self.live.read();
        let mut listed = ListedChildren::default();
        for (path, entry) in live.iter() {
            if parent(path) != folder {
                continue;
            }
            if entry.is_folder {
                listed.folders.push(path.clone());
            } else {
                listed.files.push(path.clone());
            }
        }
        Ok(listed)
    }

    async fn reconcile_file_creation(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        self.record(BackendOp::CreateFile(path.clone()))?;
        self.known.insert(&path, false);
        Ok(())
    }

    async fn reconcile_folder_creation(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        self.record(BackendOp::CreateFolder(path.clone()))?;
        self.known.insert(&path, true);
        Ok(())
    }

    async fn reconcile_deletion(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);
        self.record(BackendOp::Delete(path.clone()))?;
        self.known.remove(&path);
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = normalize_path(path);
        self.record(BackendOp::Read(path.clone()))?;
        Ok(self
            .live
            .read()
            .get(&path)
            .filter(|entry| !entry.is_folder)
            .map(|entry| entry.content.clone()))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let path = normalize_path(path);
        self.record(BackendOp::Write(path.clone()))?;
        self.add_parents(&path);
        let mtime = self.tick();
        self.live.write().insert(
            path,
            LiveEntry {
                is_folder: false,
                content: content.to_vec(),
                mtime,
            },
        );
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Option<FileStat>> {
        let path = normalize_path(path);
        self.record(BackendOp::Stat(path.clone()))?;
        Ok(self.live.read().get(&path).map(|entry| FileStat {
            mtime: entry.mtime,
            is_folder: entry.is_folder,
        }))
    }
}

impl TreeSnapshot for MemoryBackend {
    fn children(&self, folder: &str) -> Option<Vec<String>> {
        self.known.children(folder)
    }
}

/// Presentation layer backed by a set of visible paths.
#[derive(Debug, Default)]
pub struct MemoryPresentation {
    visible: RwLock<BTreeSet<String>>,
}

impl MemoryPresentation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(&self) -> Vec<String> {
        self.visible.read().iter().cloned().collect()
    }
}

#[async_trait]
impl Presentation for MemoryPresentation {
    async fn insert(&self, path: &str, _is_folder: bool) {
        self.visible.write().insert(normalize_path(path));
    }

    async fn remove(&self, path: &str) {
        self.visible.write().remove(&normalize_path(path));
    }

    fn contains(&self, path: &str) -> bool {
        self.visible.read().contains(&normalize_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_direct_children_split_by_kind() {
        let backend = MemoryBackend::new();
        backend.add_file("notes/a.md", "a");
        backend.add_file("top.md", "top");
        backend.add_folder("empty");

        let root = backend.list("/").await.expect("list root");
        assert_eq!(root.files, vec!["top.md"]);
        assert_eq!(root.folders, vec!["empty", "notes"]);

        let notes = backend.list("notes").await.expect("list notes");
        assert_eq!(notes.files, vec!["notes/a.md"]);
        assert!(notes.folders.is_empty());
    }

    #[tokio::test]
    async fn write_bumps_mtime_and_read_returns_content() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.read(".obsidianignore").await.expect("read"), None);
        assert_eq!(backend.stat(".obsidianignore").await.expect("stat"), None);

        backend
            .write(".obsidianignore", b"drafts/")
            .await
            .expect("write");
        let first = backend.stat(".obsidianignore").await.expect("stat").expect("exists");
        backend
            .write(".obsidianignore", b"drafts/\n*.tmp")
            .await
            .expect("write");
        let second = backend.stat(".obsidianignore").await.expect("stat").expect("exists");

        assert!(second.mtime > first.mtime);
        assert_eq!(
            backend.read(".obsidianignore").await.expect("read"),
            Some(b"drafts/\n*.tmp".to_vec())
        );
    }

    #[tokio::test]
    async fn injected_failures_are_recorded_and_returned() {
        let backend = MemoryBackend::new();
        backend.fail_path("bad.md");

        let err = backend
            .reconcile_file_creation("bad.md")
            .await
            .expect_err("injected failure");
        assert!(matches!(err, ExclusionError::Backend(_)));
        assert_eq!(backend.mutations(), vec![BackendOp::CreateFile("bad.md".into())]);
        assert!(!backend.is_known("bad.md"));
    }

    #[tokio::test]
    async fn unavailable_backend_fails_probe() {
        let err = MemoryBackend::unavailable()
            .probe()
            .await
            .expect_err("probe should fail");
        assert!(err.is_fatal());
    }
}
