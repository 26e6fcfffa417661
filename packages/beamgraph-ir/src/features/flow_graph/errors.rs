//! CFG construction errors

use thiserror::Error;

/// CFG build failure; always function-local
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CfgError {
    /// The function AST does not match a supported head/body shape
    #[error("invalid function AST: {detail}")]
    InvalidAst { detail: String },

    /// The build deadline elapsed; no partial graph is kept
    #[error("CFG build deadline exceeded")]
    Timeout,
}

impl CfgError {
    pub fn invalid(detail: impl Into<String>) -> Self {
        CfgError::InvalidAst {
            detail: detail.into(),
        }
    }
}

/// Result type for CFG operations
pub type CfgResult<T> = Result<T, CfgError>;
