//! CPG sub-graph pattern matching
//!
//! Backtracking sub-graph isomorphism anchored on the most selective
//! pattern node (rarest kind), expanding via the CPG adjacency. Matching is
//! bounded by a deadline and a result cap so pathological patterns cannot
//! run unboundedly.

use super::errors::{QueryError, QueryResult};
use super::spec::{CpgPattern, PatternNode};
use crate::shared::models::{CodePropertyGraph, CpgNode};
use crate::shared::utils::Deadline;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

const MAX_MATCHES: usize = 1_000;

/// One complete assignment of pattern nodes to CPG node keys
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    /// (pattern node index, CPG node key), sorted by index
    pub bindings: Vec<(usize, String)>,
}

/// Match `pattern` against one CPG.
pub fn match_pattern(
    cpg: &CodePropertyGraph,
    pattern: &CpgPattern,
    deadline: &Deadline,
) -> QueryResult<Vec<PatternMatch>> {
    if pattern.nodes.is_empty() {
        return Ok(Vec::new());
    }

    // Candidate keys per pattern node, in deterministic order
    let mut candidates: Vec<Vec<&str>> = Vec::with_capacity(pattern.nodes.len());
    for node in &pattern.nodes {
        candidates.push(candidate_keys(cpg, node));
    }

    // Anchor on the most selective node, then expand outward over pattern
    // edges so every later node is adjacency-constrained when possible
    let anchor = candidates
        .iter()
        .enumerate()
        .min_by_key(|(_, keys)| keys.len())
        .map(|(index, _)| index)
        .unwrap_or(0);
    let order = matching_order(pattern, anchor);

    // Forward and reverse adjacency with edge kinds
    let mut forward: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
    let mut backward: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
    for edge in &cpg.edges {
        forward
            .entry(edge.from.as_str())
            .or_default()
            .push((edge.to.as_str(), edge.kind.as_str()));
        backward
            .entry(edge.to.as_str())
            .or_default()
            .push((edge.from.as_str(), edge.kind.as_str()));
    }

    let mut search = Search {
        cpg,
        pattern,
        candidates: &candidates,
        order: &order,
        forward: &forward,
        backward: &backward,
        deadline,
        assignment: vec![None; pattern.nodes.len()],
        used: HashSet::new(),
        matches: Vec::new(),
    };
    search.expand(0)?;

    Ok(search.matches)
}

struct Search<'a> {
    cpg: &'a CodePropertyGraph,
    pattern: &'a CpgPattern,
    candidates: &'a [Vec<&'a str>],
    order: &'a [usize],
    forward: &'a HashMap<&'a str, Vec<(&'a str, &'a str)>>,
    backward: &'a HashMap<&'a str, Vec<(&'a str, &'a str)>>,
    deadline: &'a Deadline,
    assignment: Vec<Option<String>>,
    used: HashSet<String>,
    matches: Vec<PatternMatch>,
}

impl<'a> Search<'a> {
    fn expand(&mut self, position: usize) -> QueryResult<()> {
        if self.matches.len() >= MAX_MATCHES {
            return Ok(());
        }
        self.deadline
            .check()
            .map_err(|_| QueryError::unsupported("cpg pattern matching deadline exceeded"))?;

        if position == self.order.len() {
            let mut bindings: Vec<(usize, String)> = self
                .assignment
                .iter()
                .enumerate()
                .filter_map(|(index, key)| key.clone().map(|k| (index, k)))
                .collect();
            bindings.sort_by_key(|(index, _)| *index);
            self.matches.push(PatternMatch { bindings });
            return Ok(());
        }

        let node_index = self.order[position];
        let options = self.restricted_candidates(node_index);
        for key in options {
            if self.used.contains(&key) {
                continue;
            }
            if !self.edges_satisfied(node_index, &key) {
                continue;
            }
            self.assignment[node_index] = Some(key.clone());
            self.used.insert(key.clone());
            self.expand(position + 1)?;
            self.used.remove(&key);
            self.assignment[node_index] = None;
        }
        Ok(())
    }

    /// Candidates for `node_index`, narrowed through an already-assigned
    /// neighbour when one exists
    fn restricted_candidates(&self, node_index: usize) -> Vec<String> {
        for edge in &self.pattern.edges {
            let (other, incoming) = if edge.to_index == node_index {
                (edge.from_index, true)
            } else if edge.from_index == node_index {
                (edge.to_index, false)
            } else {
                continue;
            };
            let Some(Some(assigned)) = self.assignment.get(other) else {
                continue;
            };
            let adjacency = if incoming { self.forward } else { self.backward };
            let mut keys: Vec<String> = adjacency
                .get(assigned.as_str())
                .map(|neighbours| {
                    neighbours
                        .iter()
                        .filter(|(_, kind)| {
                            edge.kind.as_deref().map(|k| k == *kind).unwrap_or(true)
                        })
                        .map(|(key, _)| key.to_string())
                        .collect()
                })
                .unwrap_or_default();
            keys.retain(|key| {
                self.cpg
                    .nodes
                    .get(key)
                    .map(|node| node_matches(key, node, &self.pattern.nodes[node_index]))
                    .unwrap_or(false)
            });
            keys.sort();
            keys.dedup();
            return keys;
        }
        self.candidates[node_index]
            .iter()
            .map(|key| key.to_string())
            .collect()
    }

    /// Every pattern edge between `node_index` and an assigned node must
    /// exist in the CPG
    fn edges_satisfied(&self, node_index: usize, key: &str) -> bool {
        for edge in &self.pattern.edges {
            let (from_key, to_key) = if edge.from_index == node_index {
                match self.assignment.get(edge.to_index).and_then(|a| a.as_ref()) {
                    Some(other) => (key.to_string(), other.clone()),
                    None => continue,
                }
            } else if edge.to_index == node_index {
                match self.assignment.get(edge.from_index).and_then(|a| a.as_ref()) {
                    Some(other) => (other.clone(), key.to_string()),
                    None => continue,
                }
            } else {
                continue;
            };
            let found = self
                .forward
                .get(from_key.as_str())
                .map(|neighbours| {
                    neighbours.iter().any(|(neighbour, kind)| {
                        *neighbour == to_key
                            && edge.kind.as_deref().map(|k| k == *kind).unwrap_or(true)
                    })
                })
                .unwrap_or(false);
            if !found {
                return false;
            }
        }
        true
    }
}

/// Keys whose node satisfies the pattern node's kind, label prefix and
/// property constraints
fn candidate_keys<'a>(cpg: &'a CodePropertyGraph, pattern: &PatternNode) -> Vec<&'a str> {
    let mut keys: Vec<&str> = match &pattern.kind {
        Some(kind) => cpg
            .keys_of_kind(kind)
            .iter()
            .map(|k| k.as_str())
            .collect(),
        None => {
            let mut all: Vec<&str> = cpg.nodes.keys().map(|k| k.as_str()).collect();
            all.sort();
            all
        }
    };
    keys.retain(|key| {
        cpg.nodes
            .get(*key)
            .map(|node| node_matches(key, node, pattern))
            .unwrap_or(false)
    });
    keys
}

fn node_matches(key: &str, node: &CpgNode, pattern: &PatternNode) -> bool {
    if let Some(prefix) = &pattern.label_prefix {
        if !key.starts_with(prefix.as_str()) {
            return false;
        }
    }
    if let Some(kind) = &pattern.kind {
        if node.ast_type.as_deref() != Some(kind.as_str()) {
            return false;
        }
    }
    for (property, expected) in &pattern.properties {
        let actual = match property.as_str() {
            "line" => node.line.map(|l| Value::from(l)).unwrap_or(Value::Null),
            "scope_id" => node
                .scope_id
                .as_ref()
                .map(|s| Value::from(s.clone()))
                .unwrap_or(Value::Null),
            "ast_type" => node
                .ast_type
                .as_ref()
                .map(|t| Value::from(t.clone()))
                .unwrap_or(Value::Null),
            _ => Value::Null,
        };
        let equal = match (actual.as_f64(), expected.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => actual == *expected,
        };
        if !equal {
            return false;
        }
    }
    true
}

/// BFS over pattern edges from the anchor; disconnected nodes follow in
/// index order
fn matching_order(pattern: &CpgPattern, anchor: usize) -> Vec<usize> {
    let mut order = vec![anchor];
    let mut seen: HashSet<usize> = HashSet::from([anchor]);
    let mut frontier = vec![anchor];
    while let Some(current) = frontier.pop() {
        for edge in &pattern.edges {
            for next in [edge.from_index, edge.to_index] {
                if (edge.from_index == current || edge.to_index == current)
                    && seen.insert(next)
                {
                    order.push(next);
                    frontier.push(next);
                }
            }
        }
    }
    for index in 0..pattern.nodes.len() {
        if seen.insert(index) {
            order.push(index);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::cpg::{build_function_cpg, CpgBuildOpts};
    use crate::features::node_identifier::assign_function_ids;
    use crate::features::query_engine::spec::PatternEdge;
    use crate::shared::models::{Expr, ExprKind, FunctionDef, Pattern};
    use std::time::Duration;

    fn if_else_cpg() -> CodePropertyGraph {
        let body = Expr::new(
            ExprKind::If {
                condition: Box::new(Expr::binary_op(
                    ">",
                    Expr::var("x", 2),
                    Expr::int(0, 2),
                    2,
                )),
                then_branch: Box::new(Expr::atom("pos", 3)),
                else_branch: Some(Box::new(Expr::atom("neg", 5))),
            },
            2,
        );
        let mut def = FunctionDef::simple("g", vec![Pattern::var("x", 1)], None, body, 1);
        assign_function_ids(&mut def, "M");
        build_function_cpg(&def, &CpgBuildOpts::default()).unwrap()
    }

    fn fresh_deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[test]
    fn test_single_node_pattern() {
        let cpg = if_else_cpg();
        let pattern = CpgPattern {
            nodes: vec![PatternNode {
                kind: Some("conditional".to_string()),
                ..Default::default()
            }],
            edges: vec![],
        };
        let matches = match_pattern(&cpg, &pattern, &fresh_deadline()).unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_edge_constrained_pattern() {
        let cpg = if_else_cpg();
        // conditional --conditional_true--> literal
        let pattern = CpgPattern {
            nodes: vec![
                PatternNode {
                    kind: Some("conditional".to_string()),
                    ..Default::default()
                },
                PatternNode {
                    kind: Some("literal".to_string()),
                    ..Default::default()
                },
            ],
            edges: vec![PatternEdge {
                kind: Some("conditional_true".to_string()),
                from_index: 0,
                to_index: 1,
            }],
        };
        let matches = match_pattern(&cpg, &pattern, &fresh_deadline()).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].bindings.len(), 2);
    }

    #[test]
    fn test_unsatisfiable_pattern_empty() {
        let cpg = if_else_cpg();
        let pattern = CpgPattern {
            nodes: vec![PatternNode {
                kind: Some("comprehension".to_string()),
                ..Default::default()
            }],
            edges: vec![],
        };
        let matches = match_pattern(&cpg, &pattern, &fresh_deadline()).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_expired_deadline_errors() {
        let cpg = if_else_cpg();
        let pattern = CpgPattern {
            nodes: vec![PatternNode::default()],
            edges: vec![],
        };
        let deadline = Deadline::after(Duration::from_secs(0));
        assert!(match_pattern(&cpg, &pattern, &deadline).is_err());
    }
}
