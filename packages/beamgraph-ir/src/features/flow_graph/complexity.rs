//! Complexity metrics derived from a built CFG
//!
//! Cyclomatic complexity counts decision points, not edges: each decision
//! node contributes per the table below and the final value is
//! `decision_points + 1`. Cognitive complexity adds a 0.5 nesting penalty
//! per scope depth level at each decision node.

use crate::shared::models::{
    CfgNodeKind, ComplexityMetrics, ControlFlowGraph, HalsteadMetrics,
};
use std::collections::HashSet;

/// Decision-point contribution of one CFG node
pub fn decision_contribution(cfg: &ControlFlowGraph, node_index: usize) -> u32 {
    let node = &cfg.nodes[node_index];
    match node.kind {
        CfgNodeKind::Case | CfgNodeKind::Cond => {
            let clauses = node
                .metadata
                .get("clause_count")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            clauses.saturating_sub(1)
        }
        CfgNodeKind::Conditional => 1,
        CfgNodeKind::GuardCheck => 1,
        CfgNodeKind::Try => 1,
        CfgNodeKind::With => 1,
        CfgNodeKind::Comprehension => node
            .metadata
            .get("complexity_contribution")
            .and_then(|v| v.as_u64())
            .unwrap_or(1) as u32,
        CfgNodeKind::Pipe => {
            if node
                .metadata
                .get("filter_pipe")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
            {
                1
            } else {
                0
            }
        }
        _ => 0,
    }
}

pub fn compute_complexity(cfg: &ControlFlowGraph) -> ComplexityMetrics {
    let mut decision_points = 0u32;
    let mut cognitive_penalty = 0.0f64;

    for index in 0..cfg.nodes.len() {
        let contribution = decision_contribution(cfg, index);
        if contribution > 0 {
            decision_points += contribution;
            cognitive_penalty += 0.5 * scope_depth(cfg, &cfg.nodes[index].scope_id) as f64;
        }
    }

    let cyclomatic = decision_points + 1;
    let cognitive = cyclomatic as f64 + cognitive_penalty;
    let halstead = compute_halstead(cfg);
    let lines_of_code = lines_of_code(cfg);
    let nesting_depth = cfg
        .scopes
        .keys()
        .map(|id| scope_depth(cfg, id))
        .max()
        .unwrap_or(0);
    let maintainability_index =
        maintainability_index(halstead.volume, cyclomatic, lines_of_code);

    ComplexityMetrics {
        decision_points,
        cyclomatic,
        cognitive,
        halstead,
        maintainability_index,
        nesting_depth,
        lines_of_code,
    }
}

/// Depth of a scope in the scope tree; the function scope is depth 0
fn scope_depth(cfg: &ControlFlowGraph, scope_id: &str) -> u32 {
    let mut depth = 0;
    let mut current = scope_id;
    while let Some(scope) = cfg.scopes.get(current) {
        match &scope.parent {
            Some(parent) => {
                depth += 1;
                current = parent;
            }
            None => break,
        }
    }
    depth
}

fn compute_halstead(cfg: &ControlFlowGraph) -> HalsteadMetrics {
    let mut operators: HashSet<String> = HashSet::new();
    let mut operands: HashSet<String> = HashSet::new();
    let mut total_operators = 0u32;
    let mut total_operands = 0u32;

    for node in &cfg.nodes {
        let label = node
            .expression
            .clone()
            .unwrap_or_else(|| node.kind.as_str().to_string());
        match node.kind {
            CfgNodeKind::VariableRef | CfgNodeKind::Literal | CfgNodeKind::Expression => {
                operands.insert(label);
                total_operands += 1;
            }
            CfgNodeKind::Entry | CfgNodeKind::Exit => {}
            _ => {
                operators.insert(format!("{}:{}", node.kind.as_str(), label));
                total_operators += 1;
            }
        }
    }

    let n1 = operators.len() as u32;
    let n2 = operands.len() as u32;
    let vocabulary = n1 + n2;
    let length = total_operators + total_operands;
    let volume = if vocabulary > 0 {
        length as f64 * (vocabulary as f64).log2()
    } else {
        0.0
    };
    let difficulty = if n2 > 0 {
        (n1 as f64 / 2.0) * (total_operands as f64 / n2 as f64)
    } else {
        0.0
    };
    let effort = difficulty * volume;

    HalsteadMetrics {
        distinct_operators: n1,
        distinct_operands: n2,
        total_operators,
        total_operands,
        vocabulary,
        length,
        volume,
        difficulty,
        effort,
    }
}

fn lines_of_code(cfg: &ControlFlowGraph) -> u32 {
    let lines: Vec<u32> = cfg.nodes.iter().map(|n| n.line).filter(|&l| l > 0).collect();
    match (lines.iter().min(), lines.iter().max()) {
        (Some(&min), Some(&max)) => max - min + 1,
        _ => 0,
    }
}

fn maintainability_index(volume: f64, cyclomatic: u32, loc: u32) -> f64 {
    let ln_volume = if volume > 0.0 { volume.ln() } else { 0.0 };
    let ln_loc = if loc > 0 { (loc as f64).ln() } else { 0.0 };
    let raw = 171.0 - 5.2 * ln_volume - 0.23 * cyclomatic as f64 - 16.2 * ln_loc;
    (raw * 100.0 / 171.0).clamp(0.0, 100.0)
}
