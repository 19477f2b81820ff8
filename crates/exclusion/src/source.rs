//! Rule source reader.
//!
//! Fetches raw rule text for named rule files through the storage backend and
//! tracks two kinds of change: content changes (via [`SourceReader::refresh`])
//! and modification-time changes (via [`SourceReader::has_changed`]).

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::backend::SharedBackend;

/// Last known state of one rule file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSource {
    pub name: String,
    /// Bytes from the last successful read, empty when missing or unreadable.
    pub content: String,
    /// Last observed modification time in milliseconds, 0 when missing.
    pub last_modified: u64,
}

pub struct SourceReader {
    backend: SharedBackend,
    sources: RwLock<HashMap<String, RuleSource>>,
    /// Serializes the read-compare-update sequences so concurrent callers see
    /// each change exactly once.
    io_lock: Mutex<()>,
}

impl std::fmt::Debug for SourceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceReader")
            .field("sources", &self.sources)
            .finish()
    }
}

impl SourceReader {
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            sources: RwLock::new(HashMap::new()),
            io_lock: Mutex::new(()),
        }
    }

    /// Reads the current content of a rule file. Missing files and read
    /// failures both yield an empty string.
    pub async fn read_source(&self, name: &str) -> String {
        match self.backend.read(name).await {
            Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(None) => String::new(),
            Err(error) => {
                tracing::warn!("failed to read rule file {}: {}", name, error);
                String::new()
            }
        }
    }

    /// Current modification time of a rule file, 0 when missing.
    pub async fn current_mtime(&self, name: &str) -> u64 {
        match self.backend.stat(name).await {
            Ok(stat) => stat.map(|stat| stat.mtime).unwrap_or(0),
            Err(error) => {
                tracing::warn!("failed to stat rule file {}: {}", name, error);
                0
            }
        }
    }

    /// Returns true exactly once per modification-time change.
    pub async fn has_changed(&self, name: &str) -> bool {
        let _guard = self.io_lock.lock().await;
        let mtime = self.current_mtime(name).await;
        let mut sources = self.sources.write();
        let source = sources
            .entry(name.to_string())
            .or_insert_with(|| RuleSource {
                name: name.to_string(),
                ..RuleSource::default()
            });
        if source.last_modified == mtime {
            return false;
        }
        source.last_modified = mtime;
        true
    }

    /// Re-reads a rule file and caches its content. Returns true if the
    /// content differs from what was cached.
    pub async fn refresh(&self, name: &str) -> bool {
        let _guard = self.io_lock.lock().await;
        let content = self.read_source(name).await;
        self.store_content(name, content)
    }

    /// Forces a source to empty content. Returns true if that is a change.
    pub async fn clear(&self, name: &str) -> bool {
        let _guard = self.io_lock.lock().await;
        self.store_content(name, String::new())
    }

    /// Writes new content through the backend. Returns false without writing
    /// when the content is already current.
    pub async fn write(&self, name: &str, content: &str) -> crate::error::Result<bool> {
        let _guard = self.io_lock.lock().await;
        if self.content(name) == content && self.sources.read().contains_key(name) {
            return Ok(false);
        }
        self.backend.write(name, content.as_bytes()).await?;
        self.store_content(name, content.to_string());
        Ok(true)
    }

    /// Cached content of a source, empty if never read.
    pub fn content(&self, name: &str) -> String {
        self.sources
            .read()
            .get(name)
            .map(|source| source.content.clone())
            .unwrap_or_default()
    }

    pub fn source(&self, name: &str) -> Option<RuleSource> {
        self.sources.read().get(name).cloned()
    }

    fn store_content(&self, name: &str, content: String) -> bool {
        let mut sources = self.sources.write();
        let source = sources
            .entry(name.to_string())
            .or_insert_with(|| RuleSource {
                name: name.to_string(),
                ..RuleSource::default()
            });
        if source.content == content {
            return false;
        }
        source.content = content;
        true
    }
}
