//! CPG unification errors

use crate::features::data_flow::DfgError;
use crate::features::flow_graph::CfgError;
use thiserror::Error;

/// CPG build failure; always function-local
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CpgError {
    /// The control-flow layer failed to build
    #[error("CFG construction failed: {0}")]
    CfgFailed(CfgError),

    /// The data-flow layer failed to build
    #[error("DFG construction failed: {0}")]
    DfgFailed(DfgError),

    /// More than one function definition in the input
    #[error("interprocedural analysis is not supported")]
    InterproceduralUnsupported,

    /// The complexity-derived deadline elapsed
    #[error("CPG build deadline exceeded")]
    Timeout,

    #[error("CPG build failed: {0}")]
    BuildFailed(String),
}

/// Result type for CPG operations
pub type CpgResult<T> = Result<T, CpgError>;
