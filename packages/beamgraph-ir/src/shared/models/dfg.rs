//! Data Flow Graph types (SSA form)
//!
//! Variable versions, φ-nodes and data edges produced by the DFG builder.
//! The canonical SSA name of a version is `name_vVERSION`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Arena index of a DFG node
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DfgNodeId(pub u32);

impl DfgNodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for DfgNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dfg_{}", self.0)
    }
}

/// DFG node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DfgNodeKind {
    /// Definition of a variable version (parameter or assignment)
    Definition,
    /// Read of a variable version
    Use,
    /// φ pseudo-definition at a control-flow join
    Phi,
    /// Value-producing expression (call, operator, pipe stage, closure)
    Expression,
}

impl DfgNodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DfgNodeKind::Definition => "definition",
            DfgNodeKind::Use => "use",
            DfgNodeKind::Phi => "phi",
            DfgNodeKind::Expression => "expression",
        }
    }
}

/// DFG node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DfgNode {
    pub id: DfgNodeId,
    pub kind: DfgNodeKind,
    pub variable: String,
    pub version: u32,
    pub scope_id: String,
    pub line: u32,
    pub ast_node_id: Option<String>,
}

/// SSA variable version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableVersion {
    pub name: String,
    pub version: u32,
    pub scope_id: String,
    pub defining_node: DfgNodeId,
    pub is_parameter: bool,
    pub is_captured: bool,
}

impl VariableVersion {
    /// Canonical SSA name, e.g. `x_v0`
    pub fn ssa_name(&self) -> String {
        format!("{}_v{}", self.name, self.version)
    }
}

/// One incoming arm of a φ-node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhiIncoming {
    /// Exit of the predecessor branch the version flows in from
    pub predecessor: String,
    pub source_version: u32,
}

/// φ-node placed at a control-flow join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhiNode {
    pub variable: String,
    pub target_version: u32,
    pub scope_id: String,
    pub node: DfgNodeId,
    /// Ordered to match predecessor order at the join
    pub incoming: Vec<PhiIncoming>,
}

/// DFG edge kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DfgEdgeKind {
    Data,
    DefUse,
    Mutation,
    PipeFlow,
    Capture,
    PhiInput,
    PhiOutput,
    PatternBind,
}

impl DfgEdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DfgEdgeKind::Data => "data",
            DfgEdgeKind::DefUse => "def_use",
            DfgEdgeKind::Mutation => "mutation",
            DfgEdgeKind::PipeFlow => "pipe_flow",
            DfgEdgeKind::Capture => "capture",
            DfgEdgeKind::PhiInput => "phi_input",
            DfgEdgeKind::PhiOutput => "phi_output",
            DfgEdgeKind::PatternBind => "pattern_bind",
        }
    }
}

/// DFG edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DfgEdge {
    pub from: DfgNodeId,
    pub to: DfgNodeId,
    pub kind: DfgEdgeKind,
    pub variable: Option<String>,
}

/// Recorded same-scope reassignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationRecord {
    pub variable: String,
    pub scope_id: String,
    pub from_version: u32,
    pub to_version: u32,
    pub line: u32,
}

/// Inner-scope binding shadowing an outer-scope one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowRecord {
    pub variable: String,
    pub outer_scope: String,
    pub inner_scope: String,
    pub line: u32,
}

/// Outer-scope variable read inside a closure or comprehension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub variable: String,
    pub from_scope: String,
    pub into_scope: String,
    pub line: u32,
}

/// Birth/death lines and usage frequency of one SSA version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableLifetime {
    pub birth_line: u32,
    pub death_line: u32,
    pub use_count: u32,
}

/// Advisory optimization hint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OptimizationHint {
    /// Identical call with identical argument versions computed more than once
    CommonSubexpression { expression: String, count: u32 },
    /// Definition never read or captured
    DeadAssignment { ssa_name: String, line: u32 },
}

/// Fan-in/out and shape metrics of the data flow graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DfgMetrics {
    pub max_fan_in: u32,
    pub max_fan_out: u32,
    pub depth: u32,
    pub width: u32,
}

/// Data Flow Graph of a single function, in SSA form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFlowGraph {
    pub nodes: Vec<DfgNode>,
    pub edges: Vec<DfgEdge>,
    pub versions: Vec<VariableVersion>,
    pub phi_nodes: Vec<PhiNode>,
    pub mutations: Vec<MutationRecord>,
    pub shadows: Vec<ShadowRecord>,
    pub captures: Vec<CaptureRecord>,
    /// Keyed by canonical SSA name
    pub lifetimes: HashMap<String, VariableLifetime>,
    /// SSA names defined but never read, captured, or depended upon
    pub unused_variables: Vec<String>,
    pub optimization_hints: Vec<OptimizationHint>,
    pub metrics: DfgMetrics,
}

impl DataFlowGraph {
    pub fn node(&self, id: DfgNodeId) -> Option<&DfgNode> {
        self.nodes.get(id.index())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All versions of one variable, ordered by version number
    pub fn versions_of(&self, name: &str) -> Vec<&VariableVersion> {
        let mut found: Vec<&VariableVersion> =
            self.versions.iter().filter(|v| v.name == name).collect();
        found.sort_by_key(|v| v.version);
        found
    }

    /// Parameter definitions (SSA v0 bindings from the function head)
    pub fn parameters(&self) -> Vec<&VariableVersion> {
        self.versions.iter().filter(|v| v.is_parameter).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssa_name_format() {
        let version = VariableVersion {
            name: "total".to_string(),
            version: 3,
            scope_id: "function".to_string(),
            defining_node: DfgNodeId(7),
            is_parameter: false,
            is_captured: false,
        };
        assert_eq!(version.ssa_name(), "total_v3");
    }

    #[test]
    fn test_versions_of_ordered() {
        let dfg = DataFlowGraph {
            nodes: vec![],
            edges: vec![],
            versions: vec![
                VariableVersion {
                    name: "x".to_string(),
                    version: 1,
                    scope_id: "function".to_string(),
                    defining_node: DfgNodeId(1),
                    is_parameter: false,
                    is_captured: false,
                },
                VariableVersion {
                    name: "x".to_string(),
                    version: 0,
                    scope_id: "function".to_string(),
                    defining_node: DfgNodeId(0),
                    is_parameter: true,
                    is_captured: false,
                },
            ],
            phi_nodes: vec![],
            mutations: vec![],
            shadows: vec![],
            captures: vec![],
            lifetimes: HashMap::new(),
            unused_variables: vec![],
            optimization_hints: vec![],
            metrics: DfgMetrics::default(),
        };

        let versions = dfg.versions_of("x");
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, 0);
        assert!(versions[0].is_parameter);
    }
}
