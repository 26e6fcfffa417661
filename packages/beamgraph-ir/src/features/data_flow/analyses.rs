//! Derived DFG analyses
//!
//! Variable lifetimes, unused variables, optimization hints, and graph
//! shape metrics, computed once over the finished node/edge sets.

use crate::shared::models::{
    DataFlowGraph, DfgEdgeKind, DfgMetrics, DfgNodeId, OptimizationHint, VariableLifetime,
};
use ahash::AHashMap;
use std::collections::{HashMap, HashSet};

/// A definition counts as used when one of these edge kinds leaves it
fn is_usage_edge(kind: DfgEdgeKind) -> bool {
    matches!(
        kind,
        DfgEdgeKind::DefUse
            | DfgEdgeKind::Capture
            | DfgEdgeKind::PhiInput
            | DfgEdgeKind::PhiOutput
    )
}

pub fn finalize_analyses(dfg: &mut DataFlowGraph, call_sites: &[(String, u32)]) {
    compute_lifetimes(dfg);
    compute_unused(dfg);
    compute_hints(dfg, call_sites);
    dfg.metrics = compute_metrics(dfg);
}

fn compute_lifetimes(dfg: &mut DataFlowGraph) {
    let mut lifetimes: HashMap<String, VariableLifetime> = HashMap::new();
    for version in &dfg.versions {
        let def_node = &dfg.nodes[version.defining_node.index()];
        let mut lifetime = VariableLifetime {
            birth_line: def_node.line,
            death_line: def_node.line,
            use_count: 0,
        };
        for edge in &dfg.edges {
            if edge.from == version.defining_node && is_usage_edge(edge.kind) {
                lifetime.use_count += 1;
                let target_line = dfg.nodes[edge.to.index()].line;
                if target_line > lifetime.death_line {
                    lifetime.death_line = target_line;
                }
            }
        }
        lifetimes.insert(version.ssa_name(), lifetime);
    }
    dfg.lifetimes = lifetimes;
}

fn compute_unused(dfg: &mut DataFlowGraph) {
    let mut used: HashSet<DfgNodeId> = HashSet::new();
    for edge in &dfg.edges {
        if is_usage_edge(edge.kind) {
            used.insert(edge.from);
        }
    }
    let mut unused: Vec<String> = dfg
        .versions
        .iter()
        .filter(|version| !used.contains(&version.defining_node))
        .map(|version| version.ssa_name())
        .collect();
    unused.sort();
    dfg.unused_variables = unused;
}

fn compute_hints(dfg: &mut DataFlowGraph, call_sites: &[(String, u32)]) {
    let mut hints = Vec::new();

    // Identical call with identical argument versions computed again
    let mut counts: AHashMap<&str, u32> = AHashMap::new();
    for (signature, _) in call_sites {
        *counts.entry(signature.as_str()).or_insert(0) += 1;
    }
    let mut repeated: Vec<(&str, u32)> = counts
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .collect();
    repeated.sort();
    for (signature, count) in repeated {
        hints.push(OptimizationHint::CommonSubexpression {
            expression: signature.to_string(),
            count,
        });
    }

    // Dead assignments from the unused set
    let unused: HashSet<&str> = dfg.unused_variables.iter().map(|s| s.as_str()).collect();
    for version in &dfg.versions {
        let ssa_name = version.ssa_name();
        if unused.contains(ssa_name.as_str()) && !version.is_parameter {
            let line = dfg.nodes[version.defining_node.index()].line;
            hints.push(OptimizationHint::DeadAssignment { ssa_name, line });
        }
    }

    dfg.optimization_hints = hints;
}

fn compute_metrics(dfg: &DataFlowGraph) -> DfgMetrics {
    let mut fan_in: AHashMap<DfgNodeId, u32> = AHashMap::new();
    let mut fan_out: AHashMap<DfgNodeId, u32> = AHashMap::new();
    let mut forward: AHashMap<DfgNodeId, Vec<DfgNodeId>> = AHashMap::new();
    for edge in &dfg.edges {
        *fan_in.entry(edge.to).or_insert(0) += 1;
        *fan_out.entry(edge.from).or_insert(0) += 1;
        forward.entry(edge.from).or_default().push(edge.to);
    }

    // Longest chain through the graph; cycle-guarded, memoised
    let mut depth_memo: AHashMap<DfgNodeId, u32> = AHashMap::new();
    let mut max_depth = 0u32;
    for node in &dfg.nodes {
        let mut on_stack = HashSet::new();
        let depth = longest_chain(node.id, &forward, &mut depth_memo, &mut on_stack);
        max_depth = max_depth.max(depth);
    }

    // Width: most nodes at the same chain depth
    let mut level_counts: AHashMap<u32, u32> = AHashMap::new();
    for node in &dfg.nodes {
        let depth = depth_memo.get(&node.id).copied().unwrap_or(0);
        *level_counts.entry(depth).or_insert(0) += 1;
    }

    DfgMetrics {
        max_fan_in: fan_in.values().copied().max().unwrap_or(0),
        max_fan_out: fan_out.values().copied().max().unwrap_or(0),
        depth: max_depth,
        width: level_counts.values().copied().max().unwrap_or(0),
    }
}

fn longest_chain(
    node: DfgNodeId,
    forward: &AHashMap<DfgNodeId, Vec<DfgNodeId>>,
    memo: &mut AHashMap<DfgNodeId, u32>,
    on_stack: &mut HashSet<DfgNodeId>,
) -> u32 {
    if let Some(&depth) = memo.get(&node) {
        return depth;
    }
    if !on_stack.insert(node) {
        return 0;
    }
    let mut best = 0;
    if let Some(successors) = forward.get(&node) {
        for &next in successors {
            best = best.max(1 + longest_chain(next, forward, memo, on_stack));
        }
    }
    on_stack.remove(&node);
    memo.insert(node, best);
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::data_flow::builder::{build_dfg, DfgBuildOpts};
    use crate::shared::models::{Expr, FunctionDef, Pattern};

    #[test]
    fn test_unused_variable_reported() {
        // def f(x) do y = 1; x end
        let body = Expr::block(
            vec![
                Expr::assign(Pattern::var("y", 2), Expr::int(1, 2), 2),
                Expr::var("x", 3),
            ],
            1,
        );
        let def = FunctionDef::simple("f", vec![Pattern::var("x", 1)], None, body, 1);
        let dfg = build_dfg(&def, &DfgBuildOpts::default()).unwrap();
        assert_eq!(dfg.unused_variables, vec!["y_v0".to_string()]);
        assert!(dfg
            .optimization_hints
            .iter()
            .any(|h| matches!(h, OptimizationHint::DeadAssignment { ssa_name, .. } if ssa_name == "y_v0")));
    }

    #[test]
    fn test_lifetime_tracks_last_use() {
        // def f(x) do y = x; z = y; z end
        let body = Expr::block(
            vec![
                Expr::assign(Pattern::var("y", 2), Expr::var("x", 2), 2),
                Expr::assign(Pattern::var("z", 5), Expr::var("y", 5), 5),
                Expr::var("z", 6),
            ],
            1,
        );
        let def = FunctionDef::simple("f", vec![Pattern::var("x", 1)], None, body, 1);
        let dfg = build_dfg(&def, &DfgBuildOpts::default()).unwrap();
        let y = dfg.lifetimes.get("y_v0").unwrap();
        assert_eq!(y.birth_line, 2);
        assert_eq!(y.death_line, 5);
        assert_eq!(y.use_count, 1);
    }

    #[test]
    fn test_common_subexpression_hint() {
        // def f(x) do a = calc(x); b = calc(x); {a, b} end
        let call = |line| Expr::call(None, "calc", vec![Expr::var("x", line)], line);
        let body = Expr::block(
            vec![
                Expr::assign(Pattern::var("a", 2), call(2), 2),
                Expr::assign(Pattern::var("b", 3), call(3), 3),
                Expr::new(
                    crate::shared::models::ExprKind::TupleLit(vec![
                        Expr::var("a", 4),
                        Expr::var("b", 4),
                    ]),
                    4,
                ),
            ],
            1,
        );
        let def = FunctionDef::simple("f", vec![Pattern::var("x", 1)], None, body, 1);
        let dfg = build_dfg(&def, &DfgBuildOpts::default()).unwrap();
        assert!(dfg
            .optimization_hints
            .iter()
            .any(|h| matches!(h, OptimizationHint::CommonSubexpression { count: 2, .. })));
    }
}
