//! Gitignore-style path exclusion for a host-managed file tree.
//!
//! This crate decides which paths of a host's storage tree are excluded and
//! keeps the host's registered tree in line with those decisions:
//! - Rule sources read through the host's storage backend
//! - Case-insensitive gitignore matching plus host exclude filters
//! - Memoized decisions with an optional persisted cache
//! - Cancellable depth-first reconciliation, one run at a time

pub mod backend;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod guard;
pub mod matcher;
pub mod path;
pub mod progress;
pub mod reconcile;
pub mod service;
pub mod source;
pub mod types;
pub mod watcher;

// Re-export main types
pub use backend::{
    LocalFsBackend, MemoryBackend, MemoryPresentation, Presentation, StorageBackend,
    TreeSnapshot,
};
pub use cancel::{CancellationToken, RunVersionTracker};
pub use config::{load_or_create_config, ExclusionConfig, ExclusionSettings};
pub use coordinator::{ProgressIndicator, RunCoordinator};
pub use engine::ExclusionEngine;
pub use error::{ExclusionError, Result};
pub use guard::{ExcludingBackend, FilteringPresentation};
pub use matcher::{CompiledRuleSet, ExcludeFilters};
pub use reconcile::{RunOutcome, TreeReconciler};
pub use service::{ExclusionService, ServiceOptions};
pub use types::{ExcludeMode, PathDecision, RefreshReason};
