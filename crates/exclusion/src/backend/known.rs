//! In-memory record of registered paths, shared by the bundled backends.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::TreeSnapshot;
use crate::path::{is_root, normalize_path, parent, ROOT_PATH};

/// Registered paths keyed by normalized path, valued by `is_folder`.
///
/// The root is always present.
#[derive(Debug)]
pub struct KnownTree {
    entries: RwLock<BTreeMap<String, bool>>,
}

impl Default for KnownTree {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(ROOT_PATH.to_string(), true);
        Self {
            entries: RwLock::new(entries),
        }
    }
}

impl KnownTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a path. Returns false if it was already registered with the
    /// same kind.
    pub fn insert(&self, path: &str, is_folder: bool) -> bool {
        let path = normalize_path(path);
        let mut entries = self.entries.write();
        entries.insert(path, is_folder) != Some(is_folder)
    }

    /// Unregisters a path and everything below it. Returns the number of
    /// entries removed. The root cannot be removed.
    pub fn remove(&self, path: &str) -> usize {
        let path = normalize_path(path);
        if is_root(&path) {
            return 0;
        }
        let prefix = format!("{path}/");
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|candidate, _| candidate != &path && !candidate.starts_with(&prefix));
        before - entries.len()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.read().contains_key(&normalize_path(path))
    }

    pub fn is_folder(&self, path: &str) -> Option<bool> {
        self.entries.read().get(&normalize_path(path)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// All registered paths except the root, in sorted order.
    pub fn paths(&self) -> Vec<String> {
        self.entries
            .read()
            .keys()
            .filter(|path| !is_root(path))
            .cloned()
            .collect()
    }
}

impl TreeSnapshot for KnownTree {
    fn children(&self, folder: &str) -> Option<Vec<String>> {
        let folder = normalize_path(folder);
        let entries = self.entries.read();
        if entries.get(&folder) != Some(&true) {
            return None;
        }
        Some(
            entries
                .keys()
                .filter(|path| !is_root(path) && parent(path) == folder)
                .cloned()
                .collect(),
        )
    }
}
