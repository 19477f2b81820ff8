//! Interfaces to the host's storage, tree snapshot and presentation layer.
//!
//! The exclusion core never touches files directly. It is handed a
//! [`StorageBackend`] at construction time and issues every read, listing and
//! reconciliation through it.

mod known;
mod local;
mod memory;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{FileStat, ListedChildren};

pub use known::KnownTree;
pub use local::LocalFsBackend;
pub use memory::{BackendOp, MemoryBackend, MemoryPresentation};

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Setup-time check that the backend supports the full read/write/list/stat
    /// surface. A failure here is fatal to the subsystem.
    async fn probe(&self) -> Result<()>;

    /// Live children of `folder`, as full normalized paths.
    async fn list(&self, folder: &str) -> Result<ListedChildren>;

    /// Registers a file with the host tree.
    async fn reconcile_file_creation(&self, path: &str) -> Result<()>;

    /// Registers a folder with the host tree.
    async fn reconcile_folder_creation(&self, path: &str) -> Result<()>;

    /// Unregisters a path (and, for folders, its descendants) from the host tree.
    async fn reconcile_deletion(&self, path: &str) -> Result<()>;

    /// Raw bytes of a file, `None` when it does not exist.
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;

    /// `None` when the path does not exist.
    async fn stat(&self, path: &str) -> Result<Option<FileStat>>;
}

pub type SharedBackend = Arc<dyn StorageBackend>;

/// The host's current knowledge of the tree. Read-only from the core's side.
pub trait TreeSnapshot: Send + Sync {
    /// Known children of `folder`, or `None` if the folder itself is unknown.
    fn children(&self, folder: &str) -> Option<Vec<String>>;
}

pub type SharedSnapshot = Arc<dyn TreeSnapshot>;

/// The host's file list view.
#[async_trait]
pub trait Presentation: Send + Sync {
    async fn insert(&self, path: &str, is_folder: bool);
    async fn remove(&self, path: &str);
    fn contains(&self, path: &str) -> bool;
}

pub type SharedPresentation = Arc<dyn Presentation>;

/// Presentation layer for hosts without a file list view.
#[derive(Debug, Default)]
pub struct NoopPresentation;

#[async_trait]
impl Presentation for NoopPresentation {
    async fn insert(&self, _path: &str, _is_folder: bool) {}

    async fn remove(&self, _path: &str) {}

    fn contains(&self, _path: &str) -> bool {
        false
    }
}
