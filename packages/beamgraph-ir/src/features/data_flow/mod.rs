//! Data Flow Graph construction (SSA)
//!
//! Builds one SSA-form DFG per function: variable versions, def/use chains,
//! φ-nodes at joins, captures, shadowing, mutations, plus derived analyses
//! (lifetimes, unused variables, optimization hints, shape metrics).

pub mod analyses;
pub mod builder;
pub mod cycles;
pub mod errors;

pub use builder::{build_dfg, DfgBuildOpts};
pub use cycles::check_assignment_cycles;
pub use errors::{DfgError, DfgResult};
