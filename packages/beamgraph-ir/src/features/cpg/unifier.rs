//! CPG unifier
//!
//! Fuses the CFG and DFG of one function into a single labelled property
//! graph. Nodes are keyed by the unification key (the AST node identifier
//! when present, else a layer-qualified graph id), every layer edge is
//! lifted with its layer tag, and cross-layer mappings plus query indexes
//! are built at finalisation.

use super::analyses::compute_analyses;
use super::errors::{CpgError, CpgResult};
use crate::config::PathAnalysisConfig;
use crate::features::data_flow::{build_dfg, DfgBuildOpts, DfgError};
use crate::features::flow_graph::{build_cfg, CfgBuildOpts, CfgError};
use crate::shared::models::{
    CfgNode, CodePropertyGraph, ControlFlowGraph, CpgEdge, CpgIndexes, CpgLayer, CpgMappings,
    CpgNode, DataFlowGraph, DfgNode, Expr, ExprKind, FunctionDef, Pattern, PatternKind,
};
use crate::shared::utils::Deadline;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// CPG build options
#[derive(Debug, Clone, Default)]
pub struct CpgBuildOpts {
    pub path_analysis: PathAnalysisConfig,
    /// Override of the complexity-derived deadline
    pub timeout_ms: Option<u64>,
}

/// Build the unified CPG for an analysis unit.
///
/// Interprocedural input (more than one function definition) is rejected up
/// front.
pub fn build_cpg(functions: &[FunctionDef], opts: &CpgBuildOpts) -> CpgResult<CodePropertyGraph> {
    match functions {
        [] => Err(CpgError::BuildFailed("no function definition".to_string())),
        [function] => build_function_cpg(function, opts),
        _ => Err(CpgError::InterproceduralUnsupported),
    }
}

/// Build the CPG of a single function under the complexity-derived deadline.
pub fn build_function_cpg(
    function: &FunctionDef,
    opts: &CpgBuildOpts,
) -> CpgResult<CodePropertyGraph> {
    let deadline = match opts.timeout_ms {
        Some(ms) => Deadline::after(Duration::from_millis(ms)),
        None => Deadline::for_complexity(estimate_complexity(function)),
    };

    let cfg_opts = CfgBuildOpts {
        path_analysis: opts.path_analysis,
        deadline: Some(deadline),
    };
    let cfg = build_cfg(function, &cfg_opts).map_err(|e| match e {
        CfgError::Timeout => CpgError::Timeout,
        other => CpgError::CfgFailed(other),
    })?;

    let dfg_opts = DfgBuildOpts {
        deadline: Some(deadline),
    };
    let dfg = build_dfg(function, &dfg_opts).map_err(|e| match e {
        DfgError::Timeout => CpgError::Timeout,
        other => CpgError::DfgFailed(other),
    })?;

    if deadline.expired() {
        return Err(CpgError::Timeout);
    }

    Ok(unify_graphs(function, &cfg, &dfg))
}

/// Unify already-built layers (the populator builds CFG and DFG once and
/// reuses them here).
pub fn unify_graphs(
    function: &FunctionDef,
    cfg: &ControlFlowGraph,
    dfg: &DataFlowGraph,
) -> CodePropertyGraph {
    let mut cpg = unify(cfg, dfg);
    cpg.analyses = compute_analyses(&cpg, function, cfg, dfg);
    cpg
}

/// Unification key of a CFG node
pub fn cfg_key(node: &CfgNode) -> String {
    node.ast_node_id
        .clone()
        .unwrap_or_else(|| format!("cfg:{}", node.id.0))
}

/// Unification key of a DFG node
pub fn dfg_key(node: &DfgNode) -> String {
    node.ast_node_id
        .clone()
        .unwrap_or_else(|| format!("dfg:{}", node.id.0))
}

fn unify(cfg: &ControlFlowGraph, dfg: &DataFlowGraph) -> CodePropertyGraph {
    let mut nodes: HashMap<String, CpgNode> = HashMap::new();
    let mut mappings = CpgMappings::default();
    let mut indexes = CpgIndexes::default();

    // Control projection first; it owns line/scope when both layers land on
    // the same key
    for node in &cfg.nodes {
        let key = cfg_key(node);
        if let Some(ast_id) = &node.ast_node_id {
            mappings.ast_to_cfg.entry(ast_id.clone()).or_insert(node.id);
        }
        let entry = nodes.entry(key.clone()).or_insert_with(|| CpgNode {
            key: key.clone(),
            layers: Vec::new(),
            cfg_node: None,
            dfg_node: None,
            line: None,
            ast_type: None,
            scope_id: None,
        });
        if !entry.layers.contains(&CpgLayer::Control) {
            entry.layers.push(CpgLayer::Control);
        }
        if entry.cfg_node.is_none() {
            entry.cfg_node = Some(node.id);
            entry.line = (node.line > 0).then_some(node.line);
            entry.ast_type = Some(node.kind.as_str().to_string());
            entry.scope_id = Some(node.scope_id.clone());
        }
    }

    for node in &dfg.nodes {
        let key = dfg_key(node);
        if let Some(ast_id) = &node.ast_node_id {
            mappings
                .ast_to_dfg
                .entry(ast_id.clone())
                .or_default()
                .push(node.id);
        }
        let entry = nodes.entry(key.clone()).or_insert_with(|| CpgNode {
            key: key.clone(),
            layers: Vec::new(),
            cfg_node: None,
            dfg_node: None,
            line: None,
            ast_type: None,
            scope_id: None,
        });
        if !entry.layers.contains(&CpgLayer::Data) {
            entry.layers.push(CpgLayer::Data);
        }
        if entry.dfg_node.is_none() {
            entry.dfg_node = Some(node.id);
        }
        if entry.line.is_none() {
            entry.line = (node.line > 0).then_some(node.line);
        }
        if entry.ast_type.is_none() {
            entry.ast_type = Some(node.kind.as_str().to_string());
        }
        if entry.scope_id.is_none() {
            entry.scope_id = Some(node.scope_id.clone());
        }
        // Cross-layer mapping through the shared key
        if let Some(cfg_node) = entry.cfg_node {
            mappings
                .cfg_to_dfg
                .entry(cfg_node)
                .or_default()
                .push(node.id);
            mappings.dfg_to_cfg.insert(node.id, cfg_node);
        }
    }

    // Edge lifting; duplicates allowed across layers, never within one
    let cfg_keys: Vec<String> = cfg.nodes.iter().map(cfg_key).collect();
    let dfg_keys: Vec<String> = dfg.nodes.iter().map(dfg_key).collect();
    let mut edges = Vec::new();
    let mut seen: HashSet<(String, String, CpgLayer, String)> = HashSet::new();
    for edge in &cfg.edges {
        let from = cfg_keys[edge.from.index()].clone();
        let to = cfg_keys[edge.to.index()].clone();
        let kind = edge.kind.as_str().to_string();
        if seen.insert((from.clone(), to.clone(), CpgLayer::Control, kind.clone())) {
            let mut metadata = HashMap::new();
            if let Some(condition) = &edge.condition {
                metadata.insert("condition".to_string(), serde_json::json!(condition));
            }
            edges.push(CpgEdge {
                from,
                to,
                layer: CpgLayer::Control,
                kind,
                metadata,
            });
        }
    }
    for edge in &dfg.edges {
        let from = dfg_keys[edge.from.index()].clone();
        let to = dfg_keys[edge.to.index()].clone();
        let kind = edge.kind.as_str().to_string();
        if seen.insert((from.clone(), to.clone(), CpgLayer::Data, kind.clone())) {
            let mut metadata = HashMap::new();
            if let Some(variable) = &edge.variable {
                metadata.insert("variable".to_string(), serde_json::json!(variable));
            }
            edges.push(CpgEdge {
                from,
                to,
                layer: CpgLayer::Data,
                kind,
                metadata,
            });
        }
    }

    // Indexes, built from arena order so results are deterministic
    for node in &cfg.nodes {
        let key = &cfg_keys[node.id.index()];
        push_unique(indexes.by_kind.entry(node.kind.as_str().to_string()).or_default(), key);
        if node.line > 0 {
            push_unique(indexes.by_line.entry(node.line).or_default(), key);
        }
        push_unique(indexes.by_scope.entry(node.scope_id.clone()).or_default(), key);
        if let Some(callee) = node.metadata.get("callee").and_then(|v| v.as_str()) {
            push_unique(indexes.by_callee.entry(callee.to_string()).or_default(), key);
        }
    }
    for node in &dfg.nodes {
        let key = &dfg_keys[node.id.index()];
        push_unique(indexes.by_kind.entry(node.kind.as_str().to_string()).or_default(), key);
        if node.line > 0 {
            push_unique(indexes.by_line.entry(node.line).or_default(), key);
        }
        push_unique(indexes.by_scope.entry(node.scope_id.clone()).or_default(), key);
        if matches!(
            node.kind,
            crate::shared::models::DfgNodeKind::Definition
                | crate::shared::models::DfgNodeKind::Use
                | crate::shared::models::DfgNodeKind::Phi
        ) {
            push_unique(
                indexes.by_variable.entry(node.variable.clone()).or_default(),
                key,
            );
        }
    }

    CodePropertyGraph {
        nodes,
        edges,
        mappings,
        indexes,
        analyses: Default::default(),
    }
}

fn push_unique(list: &mut Vec<String>, key: &String) {
    if !list.contains(key) {
        list.push(key.clone());
    }
}

/// Rough AST size estimate used to size the build deadline
pub fn estimate_complexity(function: &FunctionDef) -> usize {
    let mut count = 0;
    for clause in &function.clauses {
        for param in &clause.params {
            count += pattern_size(param);
        }
        if let Some(guard) = &clause.guard {
            count += expr_size(guard);
        }
        count += expr_size(&clause.body);
    }
    count
}

fn pattern_size(pattern: &Pattern) -> usize {
    1 + match &pattern.kind {
        PatternKind::Tuple(elements) => elements.iter().map(pattern_size).sum(),
        PatternKind::List { elements, tail } => {
            elements.iter().map(pattern_size).sum::<usize>()
                + tail.as_ref().map(|t| pattern_size(t)).unwrap_or(0)
        }
        PatternKind::Map(entries) => entries.iter().map(|(_, p)| pattern_size(p)).sum(),
        PatternKind::Keyword(entries) => entries.iter().map(|(_, p)| pattern_size(p)).sum(),
        PatternKind::Struct { fields, .. } => fields.iter().map(|(_, p)| pattern_size(p)).sum(),
        _ => 0,
    }
}

fn expr_size(expr: &Expr) -> usize {
    1 + match &expr.kind {
        ExprKind::Block(statements) => statements.iter().map(expr_size).sum(),
        ExprKind::Assign { value, .. } => expr_size(value),
        ExprKind::Pipe { left, right } => expr_size(left) + expr_size(right),
        ExprKind::If {
            condition,
            then_branch,
            else_branch,
        }
        | ExprKind::Unless {
            condition,
            then_branch,
            else_branch,
        } => {
            expr_size(condition)
                + expr_size(then_branch)
                + else_branch.as_ref().map(|e| expr_size(e)).unwrap_or(0)
        }
        ExprKind::Case { subject, clauses } => {
            expr_size(subject)
                + clauses
                    .iter()
                    .map(|c| {
                        pattern_size(&c.pattern)
                            + c.guard.as_ref().map(expr_size).unwrap_or(0)
                            + expr_size(&c.body)
                    })
                    .sum::<usize>()
        }
        ExprKind::Cond { clauses } => clauses
            .iter()
            .map(|c| expr_size(&c.condition) + expr_size(&c.body))
            .sum(),
        ExprKind::With {
            bindings,
            body,
            else_clauses,
        } => {
            bindings
                .iter()
                .map(|b| pattern_size(&b.pattern) + expr_size(&b.expr))
                .sum::<usize>()
                + expr_size(body)
                + else_clauses
                    .iter()
                    .map(|c| pattern_size(&c.pattern) + expr_size(&c.body))
                    .sum::<usize>()
        }
        ExprKind::Try {
            body,
            rescue_clauses,
            catch_clauses,
            after_block,
        } => {
            expr_size(body)
                + rescue_clauses
                    .iter()
                    .chain(catch_clauses.iter())
                    .map(|c| pattern_size(&c.pattern) + expr_size(&c.body))
                    .sum::<usize>()
                + after_block.as_ref().map(|e| expr_size(e)).unwrap_or(0)
        }
        ExprKind::For {
            generators,
            filters,
            body,
        } => {
            generators
                .iter()
                .map(|g| pattern_size(&g.pattern) + expr_size(&g.source))
                .sum::<usize>()
                + filters.iter().map(expr_size).sum::<usize>()
                + expr_size(body)
        }
        ExprKind::Receive {
            clauses,
            after_clause,
        } => {
            clauses
                .iter()
                .map(|c| pattern_size(&c.pattern) + expr_size(&c.body))
                .sum::<usize>()
                + after_clause
                    .as_ref()
                    .map(|a| expr_size(&a.timeout) + expr_size(&a.body))
                    .unwrap_or(0)
        }
        ExprKind::Fn { clauses } => clauses
            .iter()
            .map(|c| {
                c.params.iter().map(pattern_size).sum::<usize>()
                    + c.guard.as_ref().map(expr_size).unwrap_or(0)
                    + expr_size(&c.body)
            })
            .sum(),
        ExprKind::Call { args, .. } | ExprKind::Raise { args } => {
            args.iter().map(expr_size).sum()
        }
        ExprKind::Send { dest, message } => expr_size(dest) + expr_size(message),
        ExprKind::Spawn { body } => expr_size(body),
        ExprKind::Throw { value } | ExprKind::ExitCall { value } => expr_size(value),
        ExprKind::BinaryOp { left, right, .. } => expr_size(left) + expr_size(right),
        ExprKind::UnaryOp { operand, .. } => expr_size(operand),
        ExprKind::TupleLit(items) | ExprKind::ListLit(items) => {
            items.iter().map(expr_size).sum()
        }
        ExprKind::MapLit(entries) => entries
            .iter()
            .map(|(k, v)| expr_size(k) + expr_size(v))
            .sum(),
        ExprKind::StructLit { fields, .. } => {
            fields.iter().map(|(_, v)| expr_size(v)).sum()
        }
        ExprKind::Access { base, .. } => expr_size(base),
        _ => 0,
    }
}
