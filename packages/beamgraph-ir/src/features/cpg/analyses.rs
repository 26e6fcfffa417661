//! Advisory CPG-level analyses
//!
//! Security heuristics, performance hotspots, code smells, maintainability
//! and technical-debt scoring. All of these are best-effort: a missing or
//! empty result is never a correctness failure.

use crate::shared::models::{
    CfgNodeKind, CodePropertyGraph, CodeSmell, ControlFlowGraph, CpgAnalyses, CpgLayer,
    DataFlowGraph, FunctionDef, Hotspot, ScopeKind, TaintFinding,
};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet, VecDeque};

/// Calls whose results are attacker-influenced
static TAINT_SOURCES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "IO.gets",
        "IO.read",
        "System.get_env",
        "File.read",
        "File.read!",
        "Plug.Conn.fetch_query_params",
    ]
    .into_iter()
    .collect()
});

/// Calls that must never receive attacker-influenced input
static TAINT_SINKS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "Code.eval_string",
        "Code.eval_quoted",
        "System.cmd",
        "System.shell",
        "File.write",
        "File.write!",
        ":os.cmd",
    ]
    .into_iter()
    .collect()
});

/// Calls that dominate runtime cost when they appear inside a loop body
static EXPENSIVE_CALLS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "Enum.sort",
        "Enum.sort_by",
        "Enum.uniq",
        "String.to_atom",
        ":timer.sleep",
    ]
    .into_iter()
    .collect()
});

pub fn compute_analyses(
    cpg: &CodePropertyGraph,
    function: &FunctionDef,
    cfg: &ControlFlowGraph,
    dfg: &DataFlowGraph,
) -> CpgAnalyses {
    let taint_findings = detect_taint(cpg);
    let hotspots = detect_hotspots(cfg);
    let code_smells = detect_smells(function, cfg, dfg);
    let maintainability_index = cfg.complexity.maintainability_index;
    let technical_debt_ratio = debt_ratio(&code_smells, cfg);

    CpgAnalyses {
        taint_findings,
        hotspots,
        code_smells,
        maintainability_index,
        technical_debt_ratio,
    }
}

/// Source→sink reachability over data-layer edges
fn detect_taint(cpg: &CodePropertyGraph) -> Vec<TaintFinding> {
    let mut sources: Vec<(String, String)> = Vec::new();
    let mut sinks: HashMap<String, String> = HashMap::new();
    for (callee, keys) in &cpg.indexes.by_callee {
        let name = callee.split('/').next().unwrap_or(callee);
        if TAINT_SOURCES.contains(name) {
            for key in keys {
                sources.push((key.clone(), name.to_string()));
            }
        }
        if TAINT_SINKS.contains(name) {
            for key in keys {
                sinks.insert(key.clone(), name.to_string());
            }
        }
    }
    if sources.is_empty() || sinks.is_empty() {
        return Vec::new();
    }

    // Forward adjacency over the data layer
    let mut forward: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &cpg.edges {
        if edge.layer == CpgLayer::Data {
            forward
                .entry(edge.from.as_str())
                .or_default()
                .push(edge.to.as_str());
        }
    }

    let mut findings = Vec::new();
    for (source_key, source_call) in &sources {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(source_key.as_str());
        seen.insert(source_key.as_str());
        while let Some(key) = queue.pop_front() {
            if let Some(sink_call) = sinks.get(key) {
                if key != source_key {
                    findings.push(TaintFinding {
                        source_key: source_key.clone(),
                        sink_key: key.to_string(),
                        source_call: source_call.clone(),
                        sink_call: sink_call.clone(),
                    });
                }
            }
            for &next in forward.get(key).map(|v| v.as_slice()).unwrap_or(&[]) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }
    findings
}

fn detect_hotspots(cfg: &ControlFlowGraph) -> Vec<Hotspot> {
    let mut hotspots = Vec::new();

    // Nested comprehensions: a comprehension scope inside another one
    for node in cfg.nodes_of_kind(CfgNodeKind::Comprehension) {
        let mut depth = 0;
        let mut current = node.scope_id.as_str();
        while let Some(scope) = cfg.scopes.get(current) {
            if scope.kind == ScopeKind::Comprehension {
                depth += 1;
            }
            match &scope.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        if depth >= 1 {
            // The comprehension node sits outside its own scope; one
            // enclosing comprehension scope means nesting
            hotspots.push(Hotspot {
                key: node
                    .ast_node_id
                    .clone()
                    .unwrap_or_else(|| format!("cfg:{}", node.id.0)),
                reason: "nested_loop".to_string(),
                line: (node.line > 0).then_some(node.line),
            });
        }
    }

    // Expensive operations inside a comprehension body
    for node in cfg.nodes_of_kind(CfgNodeKind::FunctionCall) {
        let in_loop = scope_chain_has(cfg, &node.scope_id, ScopeKind::Comprehension);
        if !in_loop {
            continue;
        }
        let callee = node
            .metadata
            .get("callee")
            .and_then(|v| v.as_str())
            .map(|c| c.split('/').next().unwrap_or(c).to_string());
        if let Some(callee) = callee {
            if EXPENSIVE_CALLS.contains(callee.as_str()) {
                hotspots.push(Hotspot {
                    key: node
                        .ast_node_id
                        .clone()
                        .unwrap_or_else(|| format!("cfg:{}", node.id.0)),
                    reason: format!("expensive_call_in_loop:{}", callee),
                    line: (node.line > 0).then_some(node.line),
                });
            }
        }
    }

    hotspots
}

fn scope_chain_has(cfg: &ControlFlowGraph, scope_id: &str, kind: ScopeKind) -> bool {
    let mut current = scope_id;
    while let Some(scope) = cfg.scopes.get(current) {
        if scope.kind == kind {
            return true;
        }
        match &scope.parent {
            Some(parent) => current = parent,
            None => return false,
        }
    }
    false
}

fn detect_smells(
    function: &FunctionDef,
    cfg: &ControlFlowGraph,
    dfg: &DataFlowGraph,
) -> Vec<CodeSmell> {
    let mut smells = Vec::new();

    let lines = cfg.complexity.lines_of_code;
    if lines > 50 {
        smells.push(CodeSmell::LongFunction { lines });
    }

    let depth = cfg.complexity.nesting_depth;
    if depth > 3 {
        smells.push(CodeSmell::DeepNesting { depth });
    }

    let parameter_count = function.arity();
    if parameter_count > 6 {
        smells.push(CodeSmell::TooManyParameters {
            count: parameter_count,
        });
    }

    let distinct_variables: HashSet<&str> =
        dfg.versions.iter().map(|v| v.name.as_str()).collect();
    if distinct_variables.len() > 10 {
        smells.push(CodeSmell::TooManyVariables {
            count: distinct_variables.len() as u32,
        });
    }

    // Complex expressions: more than 4 operator nodes on one line
    let mut operators_per_line: HashMap<u32, u32> = HashMap::new();
    for node in cfg.nodes_of_kind(CfgNodeKind::Operator) {
        if node.line > 0 {
            *operators_per_line.entry(node.line).or_insert(0) += 1;
        }
    }
    let mut complex_lines: Vec<(u32, u32)> = operators_per_line
        .into_iter()
        .filter(|(_, count)| *count > 4)
        .collect();
    complex_lines.sort();
    for (line, operators) in complex_lines {
        smells.push(CodeSmell::ComplexExpression { operators, line });
    }

    // Code duplication: the same function called at least twice
    let mut callee_counts: HashMap<String, u32> = HashMap::new();
    for node in cfg.nodes_of_kind(CfgNodeKind::FunctionCall) {
        if let Some(callee) = node.metadata.get("callee").and_then(|v| v.as_str()) {
            *callee_counts.entry(callee.to_string()).or_insert(0) += 1;
        }
    }
    let mut duplicates: Vec<(String, u32)> = callee_counts
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .collect();
    duplicates.sort();
    for (callee, count) in duplicates {
        smells.push(CodeSmell::DuplicateCall { callee, count });
    }

    smells
}

/// Heuristic debt score in [0, 1]
fn debt_ratio(smells: &[CodeSmell], cfg: &ControlFlowGraph) -> f64 {
    let smell_cost = smells.len() as f64 * 0.1;
    let complexity_cost = (cfg.complexity.cyclomatic.saturating_sub(10)) as f64 * 0.02;
    (smell_cost + complexity_cost).min(1.0)
}
