//! Persisted decision cache.
//!
//! The on-disk form is a postcard-encoded, zstd-compressed
//! [`PersistedDecisions`] written atomically (temp file + rename). The stored
//! fingerprint ties the entries to the rule sources and filter list that
//! produced them; a mismatch on startup discards the whole file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{ExclusionError, Result};

/// Format version - increment when changing [`PersistedDecisions`].
pub const DECISION_CACHE_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;

/// State of everything that feeds the decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFingerprint {
    /// Primary rule file mtime, 0 when missing.
    pub primary_mtime: u64,
    /// Secondary rule file mtime, 0 when missing or not included.
    pub secondary_mtime: u64,
    /// Active exclude filters joined by newlines, empty when disabled.
    pub exclude_filters: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedDecisions {
    pub version: u32,
    pub fingerprint: CacheFingerprint,
    pub entries: BTreeMap<String, bool>,
    pub saved_at: u64,
}

impl PersistedDecisions {
    pub fn new(fingerprint: CacheFingerprint) -> Self {
        Self {
            version: DECISION_CACHE_VERSION,
            fingerprint,
            entries: BTreeMap::new(),
            saved_at: 0,
        }
    }

    /// True when these entries were produced under `fingerprint` by the
    /// current format version.
    pub fn is_valid_for(&self, fingerprint: &CacheFingerprint) -> bool {
        self.version == DECISION_CACHE_VERSION && &self.fingerprint == fingerprint
    }
}

/// Durable home for persisted decisions.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Returns `None` when nothing usable is stored.
    async fn load(&self) -> Result<Option<PersistedDecisions>>;
    async fn save(&self, decisions: &PersistedDecisions) -> Result<()>;
}

/// Stores decisions in a single compressed file.
#[derive(Debug, Clone)]
pub struct FileDecisionStore {
    path: PathBuf,
}

impl FileDecisionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DecisionStore for FileDecisionStore {
    async fn load(&self) -> Result<Option<PersistedDecisions>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_decisions(&path))
            .await
            .map_err(|error| ExclusionError::Internal(format!("cache load task failed: {error}")))?
    }

    async fn save(&self, decisions: &PersistedDecisions) -> Result<()> {
        let path = self.path.clone();
        let mut decisions = decisions.clone();
        decisions.saved_at = unix_now_secs();
        tokio::task::spawn_blocking(move || write_decisions(&path, &decisions))
            .await
            .map_err(|error| ExclusionError::Internal(format!("cache save task failed: {error}")))?
    }
}

fn read_decisions(path: &Path) -> Result<Option<PersistedDecisions>> {
    let compressed = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(ExclusionError::Internal(format!(
                "failed to read decision cache {}: {error}",
                path.display()
            )))
        }
    };

    let _span = tracing::info_span!("cache_decode", path = %path.display()).entered();
    let bytes = match zstd::decode_all(compressed.as_slice()) {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(
                "decision cache decompress failed for {}: {}",
                path.display(),
                error
            );
            return Ok(None);
        }
    };
    match postcard::from_bytes::<PersistedDecisions>(&bytes) {
        Ok(decisions) if decisions.version == DECISION_CACHE_VERSION => Ok(Some(decisions)),
        Ok(decisions) => {
            tracing::debug!(
                "decision cache version mismatch: {} != {}",
                decisions.version,
                DECISION_CACHE_VERSION
            );
            Ok(None)
        }
        Err(error) => {
            tracing::warn!(
                "decision cache decode failed for {}: {}",
                path.display(),
                error
            );
            Ok(None)
        }
    }
}

fn write_decisions(path: &Path, decisions: &PersistedDecisions) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|error| {
            ExclusionError::Internal(format!(
                "failed to create cache directory {}: {error}",
                parent.display()
            ))
        })?;
    }

    let encoded = postcard::to_stdvec(decisions).map_err(|error| {
        ExclusionError::Serialization(format!("failed to encode decision cache: {error}"))
    })?;
    let compressed = zstd::encode_all(encoded.as_slice(), ZSTD_LEVEL).map_err(|error| {
        ExclusionError::Internal(format!("failed to compress decision cache: {error}"))
    })?;

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, compressed).map_err(|error| {
        ExclusionError::Internal(format!(
            "failed to write cache file {}: {error}",
            tmp_path.display()
        ))
    })?;
    std::fs::rename(&tmp_path, path).map_err(|error| {
        ExclusionError::Internal(format!(
            "failed to finalize cache file {}: {error}",
            path.display()
        ))
    })?;

    tracing::debug!(
        "wrote decision cache to {} ({} entries)",
        path.display(),
        decisions.entries.len()
    );
    Ok(())
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_secs())
        .unwrap_or(0)
}

/// Keeps decisions in memory. Counts saves so callers can observe coalescing.
#[derive(Debug, Default)]
pub struct MemoryDecisionStore {
    stored: Mutex<Option<PersistedDecisions>>,
    saves: AtomicUsize,
}

impl MemoryDecisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(decisions: PersistedDecisions) -> Self {
        Self {
            stored: Mutex::new(Some(decisions)),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn contents(&self) -> Option<PersistedDecisions> {
        self.stored.lock().clone()
    }
}

#[async_trait]
impl DecisionStore for MemoryDecisionStore {
    async fn load(&self) -> Result<Option<PersistedDecisions>> {
        Ok(self.stored.lock().clone())
    }

    async fn save(&self, decisions: &PersistedDecisions) -> Result<()> {
        *self.stored.lock() = Some(decisions.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
