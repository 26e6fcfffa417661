//! Crate-level error umbrella
//!
//! Each component returns its own tagged error type; this enum unifies them
//! at the API boundary. Builders never let panics escape — every failure is
//! a value.

use crate::features::cpg::CpgError;
use crate::features::data_flow::DfgError;
use crate::features::flow_graph::CfgError;
use crate::features::query_engine::QueryError;
use crate::features::repository::RepositoryError;
use crate::shared::ports::ParseError;
use thiserror::Error;

/// Unified error type for beamgraph operations
#[derive(Debug, Error)]
pub enum BeamgraphError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Cfg(#[from] CfgError),

    #[error(transparent)]
    Dfg(#[from] DfgError),

    #[error(transparent)]
    Cpg(#[from] CpgError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for beamgraph operations
pub type Result<T> = std::result::Result<T, BeamgraphError>;
