//! Declarative queries over the repository
//!
//! Inert query values, a fluent builder, a planner/executor seeded from the
//! repository indexes, CPG sub-graph pattern matching, and correlation with
//! external runtime-event streams.

pub mod builder;
pub mod correlate;
pub mod errors;
pub mod executor;
pub mod pattern;
pub mod spec;

pub use builder::QueryBuilder;
pub use correlate::{execute_correlated, CorrelatedQuery, CorrelatedRow};
pub use errors::{QueryError, QueryResult};
pub use executor::{
    execute_cpg_nodes, execute_functions, execute_modules, project_functions, CpgNodeHit,
};
pub use pattern::{match_pattern, PatternMatch};
pub use spec::{
    Condition, CpgPattern, OrderBy, OrderDir, PatternEdge, PatternNode, Query, QueryFrom,
    QueryOp, Selection,
};
