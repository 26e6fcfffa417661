//! DFG construction errors

use thiserror::Error;

/// DFG build failure; always function-local
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DfgError {
    /// The function AST does not match a supported shape
    #[error("invalid function AST: {detail}")]
    InvalidAst { detail: String },

    /// Same-scope assignments depend on each other in a cycle
    #[error("circular dependency between variables: {}", variables.join(", "))]
    CircularDependency { variables: Vec<String> },

    /// The build deadline elapsed; no partial graph is kept
    #[error("DFG build deadline exceeded")]
    Timeout,
}

impl DfgError {
    pub fn invalid(detail: impl Into<String>) -> Self {
        DfgError::InvalidAst {
            detail: detail.into(),
        }
    }
}

/// Result type for DFG operations
pub type DfgResult<T> = Result<T, DfgError>;
