//! Same-scope assignment cycle detection
//!
//! Builds a dependency digraph of assignments within each scope (parameters
//! and cross-scope captures are excluded upstream) and rejects any cycle.
//! Self-dependencies (`x = x + 1`) never reach this check: they are
//! classified as mutations when the dependency sets are collected.

use super::errors::{DfgError, DfgResult};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Check the per-scope assignment dependency sets for cycles.
pub fn check_assignment_cycles(
    scope_deps: &BTreeMap<String, Vec<(String, BTreeSet<String>)>>,
) -> DfgResult<()> {
    for assignments in scope_deps.values() {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut indices: HashMap<String, NodeIndex> = HashMap::new();

        for (target, deps) in assignments {
            indices
                .entry(target.clone())
                .or_insert_with(|| graph.add_node(target.clone()));
            for dep in deps {
                indices
                    .entry(dep.clone())
                    .or_insert_with(|| graph.add_node(dep.clone()));
            }
        }
        for (target, deps) in assignments {
            let from = indices[target];
            for dep in deps {
                if dep == target {
                    continue;
                }
                graph.add_edge(from, indices[dep], ());
            }
        }

        for component in tarjan_scc(&graph) {
            if component.len() > 1 {
                let mut variables: Vec<String> = component
                    .into_iter()
                    .map(|index| graph[index].clone())
                    .collect();
                variables.sort();
                return Err(DfgError::CircularDependency { variables });
            }
        }
    }
    Ok(())
}
