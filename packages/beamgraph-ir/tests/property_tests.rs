//! Property tests for the graph pipeline invariants
//!
//! Generated functions always take two parameters (`p0`, `p1`) so every
//! variable read has a dominating definition by construction.

mod common;

use beamgraph_ir::config::{AnalysisConfig, PathAnalysisConfig};
use beamgraph_ir::features::cpg::unifier::{cfg_key, dfg_key};
use beamgraph_ir::features::cpg::{build_function_cpg, CpgBuildOpts};
use beamgraph_ir::features::data_flow::{build_dfg, DfgBuildOpts};
use beamgraph_ir::features::flow_graph::complexity::decision_contribution;
use beamgraph_ir::features::flow_graph::{build_cfg, CfgBuildOpts};
use beamgraph_ir::features::node_identifier::{assign_function_ids, NodeId};
use beamgraph_ir::features::query_engine::{QueryBuilder, QueryOp};
use beamgraph_ir::pipeline::build_module_record;
use beamgraph_ir::shared::models::{
    CaseClause, CfgNodeId, DfgEdgeKind, DfgNodeKind, Expr, ExprKind, FunctionDef, FunctionKey,
    Literal, Meta, ModuleAst, Pattern,
};
use beamgraph_ir::Repository;
use common::collect_node_ids;
use proptest::prelude::*;
use std::collections::HashSet;

const PARAMS: [&str; 2] = ["p0", "p1"];

fn arb_leaf() -> impl Strategy<Value = Expr> {
    prop_oneof![
        (0usize..2).prop_map(|i| Expr::var(PARAMS[i], 2)),
        any::<i8>().prop_map(|n| Expr::int(n as i64, 2)),
        "[a-z]{1,6}".prop_map(|a| Expr::atom(a, 2)),
    ]
}

fn case2(subject: Expr, first: Expr, second: Expr) -> Expr {
    Expr::new(
        ExprKind::Case {
            subject: Box::new(subject),
            clauses: vec![
                CaseClause {
                    pattern: Pattern::literal(Literal::Int(0), 3),
                    guard: None,
                    body: first,
                    meta: Meta::new(3, 0),
                },
                CaseClause {
                    pattern: Pattern::wildcard(4),
                    guard: None,
                    body: second,
                    meta: Meta::new(4, 0),
                },
            ],
        },
        2,
    )
}

fn arb_expr() -> impl Strategy<Value = Expr> {
    arb_leaf().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(left, right)| Expr::binary_op("+", left, right, 2)),
            (inner.clone(), inner.clone(), inner.clone()).prop_map(|(c, t, e)| Expr::new(
                ExprKind::If {
                    condition: Box::new(c),
                    then_branch: Box::new(t),
                    else_branch: Some(Box::new(e)),
                },
                2,
            )),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(subject, first, second)| case2(subject, first, second)),
            (inner.clone(), inner.clone()).prop_map(|(value, rest)| Expr::block(
                vec![Expr::assign(Pattern::var("t", 2), value, 2), rest],
                2,
            )),
            (inner.clone(), "[a-z]{1,5}").prop_map(|(left, callee)| Expr::new(
                ExprKind::Pipe {
                    left: Box::new(left),
                    right: Box::new(Expr::call(None, callee, vec![], 2)),
                },
                2,
            )),
            inner,
        ]
    })
}

fn arb_function() -> impl Strategy<Value = FunctionDef> {
    arb_expr().prop_map(|body| {
        FunctionDef::simple(
            "gen",
            vec![Pattern::var(PARAMS[0], 1), Pattern::var(PARAMS[1], 1)],
            None,
            body,
            1,
        )
    })
}

proptest! {
    // P1 — identifier round-trip
    #[test]
    fn prop_identifier_round_trip(mut def in arb_function()) {
        assign_function_ids(&mut def, "Prop.Mod");
        let ids = collect_node_ids(&def);
        prop_assert!(!ids.is_empty());
        for id in ids {
            let parsed = NodeId::parse(&id).unwrap();
            prop_assert_eq!(parsed.function_key(), FunctionKey::new("Prop.Mod", "gen", 2));
        }
    }

    // P2 — CFG connectivity
    #[test]
    fn prop_cfg_connectivity(def in arb_function()) {
        let cfg = build_cfg(&def, &CfgBuildOpts::default()).unwrap();
        prop_assert!(!cfg.exits.is_empty());

        let mut reachable: HashSet<CfgNodeId> = HashSet::from([cfg.entry]);
        let mut frontier = vec![cfg.entry];
        while let Some(node) = frontier.pop() {
            for next in cfg.successors(node) {
                if reachable.insert(next) {
                    frontier.push(next);
                }
            }
        }
        for node in &cfg.nodes {
            prop_assert!(reachable.contains(&node.id), "unreachable node {:?}", node.id);
        }
        prop_assert!(cfg.path_analysis.unreachable_nodes.is_empty());
    }

    // P3 — complexity by decision points, deterministic
    #[test]
    fn prop_complexity_by_decision_points(def in arb_function()) {
        let cfg = build_cfg(&def, &CfgBuildOpts::default()).unwrap();
        let total: u32 = (0..cfg.nodes.len())
            .map(|index| decision_contribution(&cfg, index))
            .sum();
        prop_assert_eq!(cfg.complexity.decision_points, total);
        prop_assert_eq!(cfg.complexity.cyclomatic, total + 1);

        let again = build_cfg(&def, &CfgBuildOpts::default()).unwrap();
        prop_assert_eq!(cfg.complexity, again.complexity);
    }

    // P4 — SSA soundness: every use has a reaching definition
    #[test]
    fn prop_ssa_soundness(def in arb_function()) {
        let dfg = build_dfg(&def, &DfgBuildOpts::default()).unwrap();
        for node in &dfg.nodes {
            if node.kind == DfgNodeKind::Use {
                let defined = dfg.edges.iter().any(|edge| {
                    edge.to == node.id
                        && matches!(
                            edge.kind,
                            DfgEdgeKind::DefUse | DfgEdgeKind::PhiOutput | DfgEdgeKind::Capture
                        )
                });
                prop_assert!(defined, "use of {} has no reaching definition", node.variable);
            }
        }
    }

    // P5 — self-referential reassignment is a mutation chain, never an error
    #[test]
    fn prop_self_reassignment_succeeds(extra in 1usize..5) {
        let mut statements = vec![Expr::assign(Pattern::var("x", 2), Expr::int(1, 2), 2)];
        for i in 0..extra {
            let line = 3 + i as u32;
            statements.push(Expr::assign(
                Pattern::var("x", line),
                Expr::binary_op("+", Expr::var("x", line), Expr::int(1, line), line),
                line,
            ));
        }
        statements.push(Expr::var("x", 10));
        let def = FunctionDef::simple("k", vec![], None, Expr::block(statements, 1), 1);

        let dfg = build_dfg(&def, &DfgBuildOpts::default()).unwrap();
        prop_assert_eq!(dfg.mutations.len(), extra);
    }

    // P6 — CPG node set is the union of both layers
    #[test]
    fn prop_cpg_union(mut def in arb_function()) {
        assign_function_ids(&mut def, "Prop.Mod");
        let cfg = build_cfg(&def, &CfgBuildOpts::default()).unwrap();
        let dfg = build_dfg(&def, &DfgBuildOpts::default()).unwrap();
        let cpg = build_function_cpg(&def, &CpgBuildOpts::default()).unwrap();

        let mut expected: HashSet<String> = cfg.nodes.iter().map(cfg_key).collect();
        expected.extend(dfg.nodes.iter().map(dfg_key));
        let actual: HashSet<String> = cpg.nodes.keys().cloned().collect();
        prop_assert_eq!(actual, expected);

        for edge in &cpg.edges {
            prop_assert!(cpg.nodes.contains_key(&edge.from));
            prop_assert!(cpg.nodes.contains_key(&edge.to));
        }
    }

    // P7 — repository atomicity
    #[test]
    fn prop_repository_atomicity(function_count in 1usize..4) {
        let defs: Vec<FunctionDef> = (0..function_count)
            .map(|i| {
                FunctionDef::simple(
                    format!("f{}", i),
                    vec![Pattern::var("x", 1)],
                    None,
                    Expr::var("x", 1),
                    1,
                )
            })
            .collect();
        let ast = ModuleAst::new("Prop", defs);
        let record = build_module_record(ast, "/prop.ex", "src", &AnalysisConfig::default());

        let repo = Repository::default();
        repo.store_module(record).unwrap();
        prop_assert!(repo.get_module("Prop").is_ok());
        prop_assert!(repo.get_module_by_filepath("/prop.ex").is_ok());
        for i in 0..function_count {
            let key = FunctionKey::new("Prop", format!("f{}", i), 1);
            prop_assert!(repo.get_function(&key).is_ok());
        }

        repo.delete_module("Prop").unwrap();
        prop_assert!(repo.get_module("Prop").is_err());
        prop_assert!(repo.get_module_by_filepath("/prop.ex").is_err());
        for i in 0..function_count {
            let key = FunctionKey::new("Prop", format!("f{}", i), 1);
            prop_assert!(repo.get_function(&key).is_err());
        }
    }

    // P8 — query determinism
    #[test]
    fn prop_query_determinism(threshold in 0u32..20) {
        let defs: Vec<FunctionDef> = (0..6)
            .map(|i| common::complexity_fn(&format!("f{}", i), i * 3 + 1))
            .collect();
        let ast = ModuleAst::new("Prop", defs);
        let record = build_module_record(ast, "/prop.ex", "src", &AnalysisConfig::default());
        let repo = Repository::default();
        repo.store_module(record).unwrap();

        let query = QueryBuilder::find_functions()
            .by_complexity("cyclomatic", QueryOp::Gte, threshold)
            .build()
            .unwrap();
        let first: Vec<FunctionKey> = repo
            .query_functions(&query)
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        let second: Vec<FunctionKey> = repo
            .query_functions(&query)
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        prop_assert_eq!(first, second);
    }

    // P9 — boundedness of path enumeration
    #[test]
    fn prop_path_bounds(
        def in arb_function(),
        max_paths in 1usize..50,
        max_depth in 3usize..30,
        max_fanout in 1usize..6,
    ) {
        let opts = CfgBuildOpts {
            path_analysis: PathAnalysisConfig {
                max_paths,
                max_depth,
                max_fanout,
            },
            deadline: None,
        };
        let cfg = build_cfg(&def, &opts).unwrap();
        prop_assert!(cfg.path_analysis.paths.len() <= max_paths);
        for path in &cfg.path_analysis.paths {
            prop_assert!(path.len() <= max_depth);
            let unique: HashSet<&CfgNodeId> = path.iter().collect();
            prop_assert_eq!(unique.len(), path.len(), "paths are simple");
        }
    }
}
