//! Shared model types
//!
//! These types are used across multiple features (builders, unifier,
//! repository, query engine), so they live here rather than in any single
//! feature's domain.

pub mod ast;
pub mod cfg;
pub mod cpg;
pub mod dfg;
pub mod records;

pub use ast::{
    AccessKey, CaseClause, CondClause, Expr, ExprKind, FnClause, FunctionClause, FunctionDef,
    Generator, Literal, Meta, ModuleAst, Pattern, PatternKind, ReceiveAfter, WithBinding,
};
pub use cfg::{
    CfgEdge, CfgEdgeKind, CfgNode, CfgNodeId, CfgNodeKind, ComplexityMetrics, ControlFlowGraph,
    HalsteadMetrics, LoopInfo, LoopRisk, PathAnalysis, Scope, ScopeKind,
};
pub use cpg::{
    CodePropertyGraph, CodeSmell, CpgAnalyses, CpgEdge, CpgIndexes, CpgLayer, CpgMappings,
    CpgNode, Hotspot, TaintFinding,
};
pub use dfg::{
    CaptureRecord, DataFlowGraph, DfgEdge, DfgEdgeKind, DfgMetrics, DfgNode, DfgNodeId,
    DfgNodeKind, MutationRecord, OptimizationHint, PhiIncoming, PhiNode, ShadowRecord,
    VariableLifetime, VariableVersion,
};
pub use records::{
    FailedFunction, FunctionKey, FunctionRecord, ModuleMetrics, ModuleRecord,
};
