//! Query errors
//!
//! Both kinds surface before any execution side-effect; query evaluation is
//! read-only.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error("invalid query spec: {reason}")]
    InvalidSpec { reason: String },

    #[error("unsupported query: {reason}")]
    UnsupportedQuery { reason: String },
}

impl QueryError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        QueryError::InvalidSpec {
            reason: reason.into(),
        }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        QueryError::UnsupportedQuery {
            reason: reason.into(),
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
