//! Code Property Graph types
//!
//! The CPG overlays the CFG and DFG of one function into a single labelled
//! property graph. Nodes are keyed by a unification key: the AST node
//! identifier when the layer node carries one, else a layer-qualified graph
//! id. Multi-edges between the same endpoints are allowed across layers,
//! never within one.

use super::cfg::CfgNodeId;
use super::dfg::DfgNodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Graph layer a CPG edge belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpgLayer {
    Control,
    Data,
}

impl CpgLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            CpgLayer::Control => "control",
            CpgLayer::Data => "data",
        }
    }
}

/// Union node over the CFG and DFG projections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpgNode {
    /// Unification key
    pub key: String,
    /// Layers contributing to this node
    pub layers: Vec<CpgLayer>,
    pub cfg_node: Option<CfgNodeId>,
    pub dfg_node: Option<DfgNodeId>,
    /// Derived properties
    pub line: Option<u32>,
    pub ast_type: Option<String>,
    pub scope_id: Option<String>,
}

impl CpgNode {
    pub fn has_layer(&self, layer: CpgLayer) -> bool {
        self.layers.contains(&layer)
    }
}

/// CPG edge: a CFG or DFG edge lifted into the unified graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpgEdge {
    pub from: String,
    pub to: String,
    pub layer: CpgLayer,
    pub kind: String,
    pub metadata: HashMap<String, Value>,
}

/// Cross-layer navigation maps
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpgMappings {
    pub ast_to_cfg: HashMap<String, CfgNodeId>,
    pub ast_to_dfg: HashMap<String, Vec<DfgNodeId>>,
    pub cfg_to_dfg: HashMap<CfgNodeId, Vec<DfgNodeId>>,
    pub dfg_to_cfg: HashMap<DfgNodeId, CfgNodeId>,
}

/// Secondary indexes built at finalisation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpgIndexes {
    pub by_kind: HashMap<String, Vec<String>>,
    pub by_line: HashMap<u32, Vec<String>>,
    pub by_scope: HashMap<String, Vec<String>>,
    pub by_variable: HashMap<String, Vec<String>>,
    pub by_callee: HashMap<String, Vec<String>>,
}

/// Taint source→sink finding (advisory)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaintFinding {
    pub source_key: String,
    pub sink_key: String,
    pub source_call: String,
    pub sink_call: String,
}

/// Performance hotspot (advisory)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hotspot {
    pub key: String,
    pub reason: String,
    pub line: Option<u32>,
}

/// Code smell classification (advisory)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CodeSmell {
    LongFunction { lines: u32 },
    DeepNesting { depth: u32 },
    TooManyParameters { count: u32 },
    TooManyVariables { count: u32 },
    ComplexExpression { operators: u32, line: u32 },
    DuplicateCall { callee: String, count: u32 },
}

/// Best-effort CPG-level analyses; missing entries are never a failure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpgAnalyses {
    pub taint_findings: Vec<TaintFinding>,
    pub hotspots: Vec<Hotspot>,
    pub code_smells: Vec<CodeSmell>,
    pub maintainability_index: f64,
    pub technical_debt_ratio: f64,
}

/// Unified Code Property Graph of a single function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodePropertyGraph {
    pub nodes: HashMap<String, CpgNode>,
    pub edges: Vec<CpgEdge>,
    pub mappings: CpgMappings,
    pub indexes: CpgIndexes,
    pub analyses: CpgAnalyses,
}

impl CodePropertyGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Keys of nodes carrying the given kind (from the kind index)
    pub fn keys_of_kind(&self, kind: &str) -> &[String] {
        self.indexes
            .by_kind
            .get(kind)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Neighbours of `key` along edges of the given layer, both directions
    pub fn neighbours(&self, key: &str, layer: Option<CpgLayer>) -> Vec<&str> {
        let mut seen: HashSet<&str> = HashSet::new();
        for edge in &self.edges {
            if let Some(l) = layer {
                if edge.layer != l {
                    continue;
                }
            }
            if edge.from == key {
                seen.insert(edge.to.as_str());
            } else if edge.to == key {
                seen.insert(edge.from.as_str());
            }
        }
        seen.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_membership() {
        let node = CpgNode {
            key: "k".to_string(),
            layers: vec![CpgLayer::Control, CpgLayer::Data],
            cfg_node: Some(CfgNodeId(0)),
            dfg_node: Some(DfgNodeId(0)),
            line: Some(1),
            ast_type: None,
            scope_id: None,
        };
        assert!(node.has_layer(CpgLayer::Control));
        assert!(node.has_layer(CpgLayer::Data));
    }

    #[test]
    fn test_neighbours_layer_filter() {
        let mut nodes = HashMap::new();
        for key in ["a", "b", "c"] {
            nodes.insert(
                key.to_string(),
                CpgNode {
                    key: key.to_string(),
                    layers: vec![CpgLayer::Control],
                    cfg_node: None,
                    dfg_node: None,
                    line: None,
                    ast_type: None,
                    scope_id: None,
                },
            );
        }
        let cpg = CodePropertyGraph {
            nodes,
            edges: vec![
                CpgEdge {
                    from: "a".to_string(),
                    to: "b".to_string(),
                    layer: CpgLayer::Control,
                    kind: "sequential".to_string(),
                    metadata: HashMap::new(),
                },
                CpgEdge {
                    from: "a".to_string(),
                    to: "c".to_string(),
                    layer: CpgLayer::Data,
                    kind: "def_use".to_string(),
                    metadata: HashMap::new(),
                },
            ],
            mappings: CpgMappings::default(),
            indexes: CpgIndexes::default(),
            analyses: CpgAnalyses::default(),
        };

        let control = cpg.neighbours("a", Some(CpgLayer::Control));
        assert_eq!(control, vec!["b"]);
        let all = cpg.neighbours("a", None);
        assert_eq!(all.len(), 2);
    }
}
