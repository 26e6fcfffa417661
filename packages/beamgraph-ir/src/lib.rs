/*
 * beamgraph-ir - Multi-layer static analysis graphs
 *
 * Builds and queries CFG, SSA-form DFG and unified CPG representations for
 * an expression-oriented functional language with pattern matching,
 * pipelines, guards and structured concurrency.
 *
 * Feature-first layout:
 * - shared/   : common models (AST, graphs, records), ports, utilities
 * - features/ : vertical slices (identifiers → cfg → dfg → cpg →
 *               repository → query → sync)
 * - pipeline/ : parallel parse→build→store orchestration
 * - config/   : typed configuration records
 */

/// Shared models, ports and utilities
pub mod shared;

/// Feature modules
pub mod features;

/// Pipeline orchestration
pub mod pipeline;

/// Configuration system
pub mod config;

/// Error types
pub mod errors;

// Re-exports for the public API
pub use config::{AnalysisConfig, PathAnalysisConfig};
pub use errors::{BeamgraphError, Result};
pub use features::cpg::{build_cpg, build_function_cpg, CpgBuildOpts, CpgError};
pub use features::data_flow::{build_dfg, DfgBuildOpts, DfgError};
pub use features::flow_graph::{build_cfg, CfgBuildOpts, CfgError};
pub use features::node_identifier::{assign_module_ids, NodeId};
pub use features::query_engine::{Query, QueryBuilder, QueryError};
pub use features::repository::{Repository, RepositoryError};
pub use features::synchronizer::Synchronizer;
pub use shared::models::{
    CodePropertyGraph, ControlFlowGraph, DataFlowGraph, FunctionKey, FunctionRecord, ModuleAst,
    ModuleRecord,
};
