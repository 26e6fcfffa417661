//! Code Property Graph unification
//!
//! Merges the CFG and DFG of one function into a unified labelled property
//! graph with cross-layer mappings, query indexes, and advisory analyses.

pub mod analyses;
pub mod errors;
pub mod unifier;

pub use errors::{CpgError, CpgResult};
pub use unifier::{build_cpg, build_function_cpg, unify_graphs, CpgBuildOpts};
