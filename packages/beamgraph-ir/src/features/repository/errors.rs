//! Repository errors

use thiserror::Error;

/// Repository operation failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RepositoryError {
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("memory limit exceeded: {limit_mb} MB")]
    MemoryLimitExceeded { limit_mb: usize },

    #[error("repository unavailable")]
    Unavailable,
}

impl RepositoryError {
    pub fn not_found(what: impl Into<String>) -> Self {
        RepositoryError::NotFound { what: what.into() }
    }
}

/// Result type for repository operations
pub type RepoResult<T> = Result<T, RepositoryError>;
