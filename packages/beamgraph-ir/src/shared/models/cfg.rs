//! Control Flow Graph types
//!
//! Shared across the CFG builder, the CPG unifier and the query engine.
//! Nodes live in an arena `Vec` and are referenced by `CfgNodeId`; edges are
//! id pairs. Predecessor/successor sets are always derived from the edge
//! list, never stored on the nodes.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Arena index of a CFG node
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CfgNodeId(pub u32);

impl CfgNodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for CfgNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cfg_{}", self.0)
    }
}

/// CFG node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CfgNodeKind {
    Entry,
    Exit,
    Expression,
    Assignment,
    Conditional,
    Case,
    CaseClause,
    Cond,
    CondClause,
    With,
    WithBinding,
    Try,
    Rescue,
    Catch,
    After,
    GuardCheck,
    FunctionCall,
    Pipe,
    Comprehension,
    Send,
    Spawn,
    Receive,
    Raise,
    Throw,
    ExitCall,
    AnonymousFunction,
    Operator,
    VariableRef,
    Literal,
}

impl CfgNodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CfgNodeKind::Entry => "entry",
            CfgNodeKind::Exit => "exit",
            CfgNodeKind::Expression => "expression",
            CfgNodeKind::Assignment => "assignment",
            CfgNodeKind::Conditional => "conditional",
            CfgNodeKind::Case => "case",
            CfgNodeKind::CaseClause => "case_clause",
            CfgNodeKind::Cond => "cond",
            CfgNodeKind::CondClause => "cond_clause",
            CfgNodeKind::With => "with",
            CfgNodeKind::WithBinding => "with_binding",
            CfgNodeKind::Try => "try",
            CfgNodeKind::Rescue => "rescue",
            CfgNodeKind::Catch => "catch",
            CfgNodeKind::After => "after",
            CfgNodeKind::GuardCheck => "guard_check",
            CfgNodeKind::FunctionCall => "function_call",
            CfgNodeKind::Pipe => "pipe",
            CfgNodeKind::Comprehension => "comprehension",
            CfgNodeKind::Send => "send",
            CfgNodeKind::Spawn => "spawn",
            CfgNodeKind::Receive => "receive",
            CfgNodeKind::Raise => "raise",
            CfgNodeKind::Throw => "throw",
            CfgNodeKind::ExitCall => "exit_call",
            CfgNodeKind::AnonymousFunction => "anonymous_function",
            CfgNodeKind::Operator => "operator",
            CfgNodeKind::VariableRef => "variable_ref",
            CfgNodeKind::Literal => "literal",
        }
    }
}

/// CFG node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgNode {
    pub id: CfgNodeId,
    pub kind: CfgNodeKind,
    pub scope_id: String,
    pub line: u32,
    /// Identifier of the AST node this CFG node was built from
    pub ast_node_id: Option<String>,
    /// Compact rendering of the underlying expression
    pub expression: Option<String>,
    pub metadata: HashMap<String, Value>,
}

/// CFG edge kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CfgEdgeKind {
    Sequential,
    ConditionalTrue,
    ConditionalFalse,
    PatternMatch,
    Exception,
    Call,
    Return,
}

impl CfgEdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CfgEdgeKind::Sequential => "sequential",
            CfgEdgeKind::ConditionalTrue => "conditional_true",
            CfgEdgeKind::ConditionalFalse => "conditional_false",
            CfgEdgeKind::PatternMatch => "pattern_match",
            CfgEdgeKind::Exception => "exception",
            CfgEdgeKind::Call => "call",
            CfgEdgeKind::Return => "return",
        }
    }
}

/// CFG edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgEdge {
    pub from: CfgNodeId,
    pub to: CfgNodeId,
    pub kind: CfgEdgeKind,
    /// Pattern or condition rendering for branch edges
    pub condition: Option<String>,
    /// Branch probability hint; never affects correctness
    pub probability: Option<f64>,
    pub metadata: HashMap<String, Value>,
}

impl CfgEdge {
    pub fn sequential(from: CfgNodeId, to: CfgNodeId) -> Self {
        Self {
            from,
            to,
            kind: CfgEdgeKind::Sequential,
            condition: None,
            probability: None,
            metadata: HashMap::new(),
        }
    }

    pub fn new(from: CfgNodeId, to: CfgNodeId, kind: CfgEdgeKind) -> Self {
        Self {
            from,
            to,
            kind,
            condition: None,
            probability: None,
            metadata: HashMap::new(),
        }
    }
}

/// Lexical scope kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    Function,
    CaseClause,
    IfThen,
    IfElse,
    Rescue,
    Catch,
    AnonymousFn,
    Comprehension,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Function => "function",
            ScopeKind::CaseClause => "case_clause",
            ScopeKind::IfThen => "if_then",
            ScopeKind::IfElse => "if_else",
            ScopeKind::Rescue => "rescue",
            ScopeKind::Catch => "catch",
            ScopeKind::AnonymousFn => "anonymous_fn",
            ScopeKind::Comprehension => "comprehension",
        }
    }
}

/// Lexical scope; scopes form a strict tree per function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub id: String,
    pub kind: ScopeKind,
    pub parent: Option<String>,
    /// Names introduced by this scope (parameters, pattern bindings)
    pub variables: Vec<String>,
    pub ast_node_id: Option<String>,
    pub metadata: HashMap<String, Value>,
}

/// Halstead software-science measures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HalsteadMetrics {
    pub distinct_operators: u32,
    pub distinct_operands: u32,
    pub total_operators: u32,
    pub total_operands: u32,
    pub vocabulary: u32,
    pub length: u32,
    pub volume: f64,
    pub difficulty: f64,
    pub effort: f64,
}

/// Complexity metrics derived from a built CFG
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    /// Sum of decision-point contributions
    pub decision_points: u32,
    /// decision_points + 1
    pub cyclomatic: u32,
    /// Cyclomatic plus a 0.5 nesting penalty per scope depth level
    pub cognitive: f64,
    pub halstead: HalsteadMetrics,
    pub maintainability_index: f64,
    pub nesting_depth: u32,
    pub lines_of_code: u32,
}

/// Infinite-loop risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopRisk {
    Low,
    Medium,
    High,
}

/// A detected back-edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopInfo {
    pub back_edge_from: CfgNodeId,
    pub back_edge_to: CfgNodeId,
}

/// Result of bounded entry-to-exit path enumeration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathAnalysis {
    pub paths: Vec<Vec<CfgNodeId>>,
    /// True when the path cap cut enumeration short
    pub truncated: bool,
    pub loops: Vec<LoopInfo>,
    pub infinite_loop_risk: Option<LoopRisk>,
    pub unreachable_nodes: Vec<CfgNodeId>,
    /// feasible_paths / total_paths > 0.5
    pub feasible: bool,
}

/// Control Flow Graph of a single function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    pub nodes: Vec<CfgNode>,
    pub edges: Vec<CfgEdge>,
    pub scopes: HashMap<String, Scope>,
    pub entry: CfgNodeId,
    pub exits: Vec<CfgNodeId>,
    pub complexity: ComplexityMetrics,
    pub path_analysis: PathAnalysis,
}

impl ControlFlowGraph {
    pub fn node(&self, id: CfgNodeId) -> Option<&CfgNode> {
        self.nodes.get(id.index())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Successors derived from the edge list
    pub fn successors(&self, id: CfgNodeId) -> Vec<CfgNodeId> {
        self.edges
            .iter()
            .filter(|e| e.from == id)
            .map(|e| e.to)
            .collect()
    }

    /// Predecessors derived from the edge list
    pub fn predecessors(&self, id: CfgNodeId) -> Vec<CfgNodeId> {
        self.edges
            .iter()
            .filter(|e| e.to == id)
            .map(|e| e.from)
            .collect()
    }

    /// Forward adjacency map, computed on demand for traversals
    pub fn adjacency(&self) -> AHashMap<CfgNodeId, Vec<CfgNodeId>> {
        let mut adj: AHashMap<CfgNodeId, Vec<CfgNodeId>> = AHashMap::new();
        for edge in &self.edges {
            adj.entry(edge.from).or_default().push(edge.to);
        }
        adj
    }

    pub fn nodes_of_kind(&self, kind: CfgNodeKind) -> Vec<&CfgNode> {
        self.nodes.iter().filter(|n| n.kind == kind).collect()
    }
}
