#[derive(Debug, thiserror::Error)]
pub enum ExclusionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ExclusionError>;

impl ExclusionError {
    /// Wraps a backend failure for the given path.
    pub fn backend(path: &str, error: impl std::fmt::Display) -> Self {
        Self::Backend(format!("{path}: {error}"))
    }

    /// Returns true for errors that make the whole subsystem unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}
