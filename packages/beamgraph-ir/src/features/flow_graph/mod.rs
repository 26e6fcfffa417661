//! Control Flow Graph construction
//!
//! Builds one CFG per function: nodes (entries, exits, expressions,
//! decisions), edges (sequential, conditional, pattern-match, exception),
//! the lexical scope tree, decision-point complexity metrics, and bounded
//! path analysis.

pub mod builder;
pub mod complexity;
pub mod errors;
pub mod path_analysis;

pub use builder::{build_cfg, CfgBuildOpts};
pub use complexity::compute_complexity;
pub use errors::{CfgError, CfgResult};
pub use path_analysis::analyze_paths;
