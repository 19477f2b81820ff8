//! Decision cache.
//!
//! Memoizes `path -> is_ignored` answers keyed by [`cache_key`]. Entries are
//! never updated in place: the whole map is dropped whenever the rules that
//! produced it change. A generation counter guards against a decision
//! computed under old rules landing in the cache after an invalidation.
//!
//! Persistence across restarts lives in [`persist`] (the on-disk format and
//! fingerprint) and [`flush`] (the write-coalescing queue).
//!
//! [`cache_key`]: crate::path::cache_key

mod flush;
mod persist;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use fnv::FnvHashMap;
use parking_lot::RwLock;

pub use flush::{FlushQueue, StoreAction};
pub use persist::{
    CacheFingerprint, DecisionStore, FileDecisionStore, MemoryDecisionStore, PersistedDecisions,
    DECISION_CACHE_VERSION,
};

#[derive(Debug, Default)]
pub struct DecisionCache {
    entries: RwLock<FnvHashMap<String, bool>>,
    generation: AtomicU64,
}

impl DecisionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        self.entries.read().get(key).copied()
    }

    /// Current generation. Pass it back to [`DecisionCache::insert`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Stores a decision computed during `generation`. Returns false and
    /// drops the value if the cache was cleared in the meantime.
    pub fn insert(&self, key: String, is_ignored: bool, generation: u64) -> bool {
        let mut entries = self.entries.write();
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        entries.insert(key, is_ignored);
        true
    }

    pub fn remove(&self, key: &str) -> Option<bool> {
        self.entries.write().remove(key)
    }

    /// Drops every entry and starts a new generation.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
    }

    /// Replaces the contents with previously persisted entries.
    pub fn restore(&self, persisted: &BTreeMap<String, bool>) {
        let mut entries = self.entries.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
        entries.extend(persisted.iter().map(|(key, value)| (key.clone(), *value)));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
