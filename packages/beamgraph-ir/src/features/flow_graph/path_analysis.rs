//! Bounded path enumeration and loop detection
//!
//! Simple entry→exit paths via depth-first search, bounded by depth,
//! per-node fan-out, and a total path cap so no input can run unboundedly.
//! Back-edges are detected by a bounded reachability probe and reported as
//! loops.

use crate::config::PathAnalysisConfig;
use crate::shared::models::{
    CfgNodeId, ControlFlowGraph, LoopInfo, LoopRisk, PathAnalysis,
};
use ahash::AHashMap;
use std::collections::HashSet;

pub fn analyze_paths(cfg: &ControlFlowGraph, config: &PathAnalysisConfig) -> PathAnalysis {
    let adjacency = cfg.adjacency();
    let exits: HashSet<CfgNodeId> = cfg.exits.iter().copied().collect();

    let mut enumerator = PathEnumerator {
        adjacency: &adjacency,
        exits: &exits,
        config,
        paths: Vec::new(),
        aborted: 0,
        truncated: false,
    };
    let mut current = Vec::new();
    let mut visited = HashSet::new();
    enumerator.dfs(cfg.entry, &mut current, &mut visited);

    let loops = detect_loops(cfg, &adjacency);
    let infinite_loop_risk = Some(match loops.len() {
        0 => LoopRisk::Low,
        1 => LoopRisk::Medium,
        _ => LoopRisk::High,
    });

    let unreachable_nodes = unreachable_from_entry(cfg, &adjacency);

    let complete = enumerator.paths.len();
    let total = complete + enumerator.aborted;
    let feasible = total > 0 && (complete as f64 / total as f64) > 0.5;

    PathAnalysis {
        paths: enumerator.paths,
        truncated: enumerator.truncated,
        loops,
        infinite_loop_risk,
        unreachable_nodes,
        feasible,
    }
}

struct PathEnumerator<'a> {
    adjacency: &'a AHashMap<CfgNodeId, Vec<CfgNodeId>>,
    exits: &'a HashSet<CfgNodeId>,
    config: &'a PathAnalysisConfig,
    paths: Vec<Vec<CfgNodeId>>,
    /// Walks cut short by the depth bound before reaching an exit
    aborted: usize,
    truncated: bool,
}

impl<'a> PathEnumerator<'a> {
    fn dfs(&mut self, node: CfgNodeId, current: &mut Vec<CfgNodeId>, visited: &mut HashSet<CfgNodeId>) {
        if self.paths.len() >= self.config.max_paths {
            self.truncated = true;
            return;
        }
        if current.len() >= self.config.max_depth {
            self.aborted += 1;
            self.truncated = true;
            return;
        }

        current.push(node);
        visited.insert(node);

        if self.exits.contains(&node) {
            self.paths.push(current.clone());
        } else {
            let successors = self
                .adjacency
                .get(&node)
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            let mut followed = 0;
            for &next in successors {
                if followed >= self.config.max_fanout {
                    self.truncated = true;
                    break;
                }
                if visited.contains(&next) {
                    continue;
                }
                followed += 1;
                self.dfs(next, current, visited);
            }
        }

        visited.remove(&node);
        current.pop();
    }
}

/// Back-edge detection by iterative DFS colouring: an edge into a node that
/// is still on the DFS stack closes a cycle. One back-edge per cycle.
fn detect_loops(
    cfg: &ControlFlowGraph,
    adjacency: &AHashMap<CfgNodeId, Vec<CfgNodeId>>,
) -> Vec<LoopInfo> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: AHashMap<CfgNodeId, Color> = AHashMap::new();
    let mut loops = Vec::new();
    let empty: Vec<CfgNodeId> = Vec::new();

    let roots: Vec<CfgNodeId> =
        std::iter::once(cfg.entry).chain(cfg.nodes.iter().map(|n| n.id)).collect();
    for root in roots {
        if color.get(&root).copied().unwrap_or(Color::White) != Color::White {
            continue;
        }
        // (node, next successor index)
        let mut stack: Vec<(CfgNodeId, usize)> = vec![(root, 0)];
        color.insert(root, Color::Gray);
        while let Some(&(node, next_index)) = stack.last() {
            let successors = adjacency.get(&node).unwrap_or(&empty);
            if next_index < successors.len() {
                stack.last_mut().expect("stack non-empty").1 += 1;
                let next = successors[next_index];
                match color.get(&next).copied().unwrap_or(Color::White) {
                    Color::White => {
                        color.insert(next, Color::Gray);
                        stack.push((next, 0));
                    }
                    Color::Gray => loops.push(LoopInfo {
                        back_edge_from: node,
                        back_edge_to: next,
                    }),
                    Color::Black => {}
                }
            } else {
                color.insert(node, Color::Black);
                stack.pop();
            }
        }
    }
    loops
}

fn unreachable_from_entry(
    cfg: &ControlFlowGraph,
    adjacency: &AHashMap<CfgNodeId, Vec<CfgNodeId>>,
) -> Vec<CfgNodeId> {
    let mut reachable: HashSet<CfgNodeId> = HashSet::new();
    let mut frontier = vec![cfg.entry];
    reachable.insert(cfg.entry);
    while let Some(node) = frontier.pop() {
        for &next in adjacency.get(&node).map(|v| v.as_slice()).unwrap_or(&[]) {
            if reachable.insert(next) {
                frontier.push(next);
            }
        }
    }
    cfg.nodes
        .iter()
        .map(|n| n.id)
        .filter(|id| !reachable.contains(id))
        .collect()
}
