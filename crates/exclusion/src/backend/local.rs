use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use super::{KnownTree, StorageBackend, TreeSnapshot};
use crate::error::{ExclusionError, Result};
use crate::path::{is_root, join, normalize_path};
use crate::types::{FileStat, ListedChildren};

/// Backend over a directory on the local filesystem.
///
/// Reads, writes, stats and listings hit the disk. Reconciliation calls only
/// update the in-memory [`KnownTree`], which serves as the tree snapshot.
#[derive(Debug)]
pub struct LocalFsBackend {
    root: PathBuf,
    known: KnownTree,
}

impl LocalFsBackend {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            known: KnownTree::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn known(&self) -> &KnownTree {
        &self.known
    }

    fn full_path(&self, path: &str) -> Result<PathBuf> {
        let normalized = normalize_path(path);
        if is_root(&normalized) {
            return Ok(self.root.clone());
        }
        let mut full = self.root.clone();
        for segment in normalized.split('/') {
            if segment == ".." {
                return Err(ExclusionError::InvalidInput(format!(
                    "path escapes storage root: {path}"
                )));
            }
            full.push(segment);
        }
        Ok(full)
    }
}

#[async_trait]
impl StorageBackend for LocalFsBackend {
    async fn probe(&self) -> Result<()> {
        match tokio::fs::metadata(&self.root).await {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(ExclusionError::BackendUnavailable(format!(
                "storage root {} is not a directory",
                self.root.display()
            ))),
            Err(error) => Err(ExclusionError::BackendUnavailable(format!(
                "unable to access storage root {}: {error}",
                self.root.display()
            ))),
        }
    }

    async fn list(&self, folder: &str) -> Result<ListedChildren> {
        let full = self.full_path(folder)?;
        let mut read_dir = tokio::fs::read_dir(&full)
            .await
            .map_err(|error| ExclusionError::backend(folder, error))?;
        let mut listed = ListedChildren::default();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|error| ExclusionError::backend(folder, error))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let child = join(folder, &name);
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_dir() {
                listed.folders.push(child);
            } else {
                listed.files.push(child);
            }
        }
        listed.files.sort();
        listed.folders.sort();
        Ok(listed)
    }

    async fn reconcile_file_creation(&self, path: &str) -> Result<()> {
        self.known.insert(path, false);
        Ok(())
    }

    async fn reconcile_folder_creation(&self, path: &str) -> Result<()> {
        self.known.insert(path, true);
        Ok(())
    }

    async fn reconcile_deletion(&self, path: &str) -> Result<()> {
        self.known.remove(path);
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full = self.full_path(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(ExclusionError::backend(path, error)),
        }
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let full = self.full_path(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                ExclusionError::Internal(format!(
                    "failed to create directory {}: {error}",
                    parent.display()
                ))
            })?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|error| ExclusionError::backend(path, error))
    }

    async fn stat(&self, path: &str) -> Result<Option<FileStat>> {
        let full = self.full_path(path)?;
        let metadata = match tokio::fs::metadata(&full).await {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(ExclusionError::backend(path, error)),
        };
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|value| value.as_millis() as u64)
            .unwrap_or(0);
        Ok(Some(FileStat {
            mtime,
            is_folder: metadata.is_dir(),
        }))
    }
}

impl TreeSnapshot for LocalFsBackend {
    fn children(&self, folder: &str) -> Option<Vec<String>> {
        self.known.children(folder)
    }
}
