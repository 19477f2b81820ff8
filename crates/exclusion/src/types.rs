//! Shared value types for exclusion decisions and reconciliation.

use serde::{Deserialize, Serialize};

/// How excluded paths are applied to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExcludeMode {
    /// Excluded paths are removed from the storage backend's visible tree.
    #[default]
    Full,
    /// Excluded paths stay registered but are hidden from the presentation layer.
    #[serde(alias = "FilesPane")]
    FilesPaneOnly,
}

impl ExcludeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::FilesPaneOnly => "files-pane-only",
        }
    }
}

/// The outcome of evaluating one path against the current rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDecision {
    pub path: String,
    pub is_folder: bool,
    pub is_ignored: bool,
}

/// Children of a folder as reported by a live listing.
///
/// Entries are full normalized paths, not bare names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListedChildren {
    pub files: Vec<String>,
    pub folders: Vec<String>,
}

impl ListedChildren {
    pub fn len(&self) -> usize {
        self.files.len() + self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty()
    }
}

/// Minimal stat information needed for change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Modification time in milliseconds since the Unix epoch.
    pub mtime: u64,
    pub is_folder: bool,
}

/// Why the service was asked to rebuild the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshReason {
    /// A rule file was created, modified or deleted.
    RuleSourceChanged(String),
    /// The host's exclude-filter list changed.
    ExcludeFiltersChanged,
    /// One of the exclusion settings was toggled.
    SettingsChanged,
    /// Explicit request from the host.
    Manual,
}
