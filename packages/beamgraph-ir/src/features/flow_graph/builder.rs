//! CFG builder
//!
//! Recursive descent over the function AST. Every handler returns a
//! `Segment {entry, exits}` where `exits` is the set of nodes whose control
//! leaves the sub-construct; the caller wires predecessor exits into the
//! segment entry. Raising constructs (`raise`, `throw`, `exit`) return an
//! empty exit set and are wired straight to the function exit, which is what
//! makes statements behind them unreachable.

use super::complexity::compute_complexity;
use super::errors::{CfgError, CfgResult};
use super::path_analysis::analyze_paths;
use crate::config::PathAnalysisConfig;
use crate::shared::models::{
    CaseClause, CfgEdge, CfgEdgeKind, CfgNode, CfgNodeId, CfgNodeKind, ControlFlowGraph, Expr,
    ExprKind, FunctionClause, FunctionDef, Pattern, Scope, ScopeKind,
};
use crate::shared::utils::Deadline;
use once_cell::sync::Lazy;
use serde_json::json;
use std::collections::{HashMap, HashSet};

/// Type predicates recognised as guard checks
static GUARD_PREDICATES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "is_atom",
        "is_binary",
        "is_bitstring",
        "is_boolean",
        "is_float",
        "is_function",
        "is_integer",
        "is_list",
        "is_map",
        "is_nil",
        "is_number",
        "is_pid",
        "is_port",
        "is_reference",
        "is_tuple",
    ]
    .into_iter()
    .collect()
});

/// Filter-style calls on the right of a pipe count as decision points
static FILTER_CALLS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["filter", "reject", "find", "any?", "all?"].into_iter().collect());

/// CFG build options
#[derive(Debug, Clone, Default)]
pub struct CfgBuildOpts {
    pub path_analysis: PathAnalysisConfig,
    pub deadline: Option<Deadline>,
}

/// Build the control flow graph of one function definition.
pub fn build_cfg(function: &FunctionDef, opts: &CfgBuildOpts) -> CfgResult<ControlFlowGraph> {
    if function.clauses.is_empty() {
        return Err(CfgError::invalid("function has no clauses"));
    }
    let arity = function.arity();
    for clause in &function.clauses {
        if clause.params.len() as u32 != arity {
            return Err(CfgError::invalid("clauses disagree on arity"));
        }
    }

    let mut builder = CfgBuilder::new(opts.deadline);
    let (entry, exit) = builder.build_function(function)?;

    let mut cfg = ControlFlowGraph {
        nodes: builder.nodes,
        edges: builder.edges,
        scopes: builder.scopes,
        entry,
        exits: vec![exit],
        complexity: Default::default(),
        path_analysis: Default::default(),
    };
    cfg.complexity = compute_complexity(&cfg);
    cfg.path_analysis = analyze_paths(&cfg, &opts.path_analysis);
    Ok(cfg)
}

/// A processed sub-construct: its entry node and the nodes control leaves by
#[derive(Debug, Clone)]
struct Segment {
    entry: CfgNodeId,
    exits: Vec<CfgNodeId>,
}

impl Segment {
    fn single(node: CfgNodeId) -> Self {
        Self {
            entry: node,
            exits: vec![node],
        }
    }
}

struct CfgBuilder {
    nodes: Vec<CfgNode>,
    edges: Vec<CfgEdge>,
    scopes: HashMap<String, Scope>,
    current_scope: String,
    scope_counter: u32,
    /// Raising nodes to be wired to the function exit at finalisation
    terminators: Vec<CfgNodeId>,
    guard_depth: u32,
    deadline: Option<Deadline>,
}

impl CfgBuilder {
    fn new(deadline: Option<Deadline>) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            scopes: HashMap::new(),
            current_scope: "function".to_string(),
            scope_counter: 1,
            terminators: Vec::new(),
            guard_depth: 0,
            deadline,
        }
    }

    fn build_function(&mut self, function: &FunctionDef) -> CfgResult<(CfgNodeId, CfgNodeId)> {
        let head_meta = &function.clauses[0].meta;
        self.scopes.insert(
            "function".to_string(),
            Scope {
                id: "function".to_string(),
                kind: ScopeKind::Function,
                parent: None,
                variables: Vec::new(),
                ast_node_id: head_meta.node_id.clone(),
                metadata: HashMap::new(),
            },
        );

        let entry = self.add_node(
            CfgNodeKind::Entry,
            function.meta.line.max(head_meta.line),
            head_meta.node_id.clone(),
            None,
        );

        let mut body_exits = Vec::new();
        if function.clauses.len() == 1 {
            let clause = &function.clauses[0];
            self.bind_scope_variables("function", &clause.params);
            body_exits = self.build_clause_body(entry, clause)?;
        } else {
            for (index, clause) in function.clauses.iter().enumerate() {
                let scope_id = self.enter_scope(
                    ScopeKind::CaseClause,
                    clause.meta.node_id.clone(),
                    clause_variables(&clause.params),
                );
                let clause_node = self.add_node(
                    CfgNodeKind::CaseClause,
                    clause.meta.line,
                    clause.meta.node_id.clone(),
                    Some(render_params(&clause.params)),
                );
                self.node_metadata(clause_node, "clause_index", json!(index));
                let mut edge = CfgEdge::new(entry, clause_node, CfgEdgeKind::PatternMatch);
                edge.condition = Some(render_params(&clause.params));
                self.edges.push(edge);

                let exits = self.build_clause_body(clause_node, clause)?;
                body_exits.extend(exits);
                self.leave_scope(scope_id);
            }
        }

        let exit = self.add_node(CfgNodeKind::Exit, 0, None, None);
        if let Some(node) = self.nodes.get_mut(exit.index()) {
            node.scope_id = "function".to_string();
        }
        for from in body_exits {
            let mut edge = CfgEdge::sequential(from, exit);
            let direct = self
                .nodes
                .get_mut(from.index())
                .map(|node| node.metadata.remove("connection").is_some())
                .unwrap_or(false);
            if direct {
                edge.metadata
                    .insert("connection".to_string(), json!("entry_to_exit_direct"));
            }
            self.edges.push(edge);
        }
        for terminator in std::mem::take(&mut self.terminators) {
            let mut edge = CfgEdge::new(terminator, exit, CfgEdgeKind::Return);
            edge.metadata.insert("early_exit".to_string(), json!(true));
            self.edges.push(edge);
        }
        Ok((entry, exit))
    }

    /// Wire `from` through the optional guard into the clause body; returns
    /// the body exit set. An empty body produces the direct entry→exit edge
    /// at finalisation.
    fn build_clause_body(&mut self, from: CfgNodeId, clause: &FunctionClause) -> CfgResult<Vec<CfgNodeId>> {
        let mut pred_exits = vec![from];
        if let Some(guard) = &clause.guard {
            self.guard_depth += 1;
            let guard_segment = self.process(guard);
            self.guard_depth -= 1;
            let guard_segment = guard_segment?;
            self.connect(&pred_exits, guard_segment.entry, CfgEdgeKind::Sequential);
            pred_exits = guard_segment.exits;
        }

        if let ExprKind::Block(statements) = &clause.body.kind {
            if statements.is_empty() {
                return Ok(self.empty_body_exits(pred_exits));
            }
        }

        let body = self.process(&clause.body)?;
        self.connect(&pred_exits, body.entry, CfgEdgeKind::Sequential);
        Ok(body.exits)
    }

    /// Empty body: mark the predecessor exits so finalisation produces the
    /// documented direct edge
    fn empty_body_exits(&mut self, pred_exits: Vec<CfgNodeId>) -> Vec<CfgNodeId> {
        for &from in &pred_exits {
            if let Some(node) = self.nodes.get_mut(from.index()) {
                node.metadata
                    .insert("connection".to_string(), json!("entry_to_exit_direct"));
            }
        }
        pred_exits
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn process(&mut self, expr: &Expr) -> CfgResult<Segment> {
        if let Some(deadline) = self.deadline {
            deadline.check().map_err(|_| CfgError::Timeout)?;
        }

        match &expr.kind {
            ExprKind::Block(statements) => self.process_block(statements, expr),
            ExprKind::Assign { value, .. } => self.process_assign(expr, value),
            ExprKind::Pipe { left, right } => self.process_pipe(expr, left, right),
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.process_conditional(expr, condition, then_branch, else_branch.as_deref(), false),
            ExprKind::Unless {
                condition,
                then_branch,
                else_branch,
            } => self.process_conditional(expr, condition, then_branch, else_branch.as_deref(), true),
            ExprKind::Case { subject, clauses } => self.process_case(expr, subject, clauses),
            ExprKind::Cond { clauses } => self.process_cond(expr, clauses),
            ExprKind::With {
                bindings,
                body,
                else_clauses,
            } => self.process_with(expr, bindings, body, else_clauses),
            ExprKind::Try {
                body,
                rescue_clauses,
                catch_clauses,
                after_block,
            } => self.process_try(expr, body, rescue_clauses, catch_clauses, after_block.as_deref()),
            ExprKind::For {
                generators,
                filters,
                body,
            } => self.process_for(expr, generators, filters, body),
            ExprKind::Receive {
                clauses,
                after_clause,
            } => self.process_receive(expr, clauses, after_clause.as_deref()),
            ExprKind::Fn { clauses } => self.process_fn(expr, clauses),
            ExprKind::Call { function, args, .. } => self.process_call(expr, function, args),
            ExprKind::Send { dest, message } => self.process_send(expr, dest, message),
            ExprKind::Spawn { body } => self.process_spawn(expr, body),
            ExprKind::Raise { args } => self.process_raising(expr, CfgNodeKind::Raise, args),
            ExprKind::Throw { value } => {
                self.process_raising(expr, CfgNodeKind::Throw, std::slice::from_ref(value))
            }
            ExprKind::ExitCall { value } => {
                self.process_raising(expr, CfgNodeKind::ExitCall, std::slice::from_ref(value))
            }
            ExprKind::BinaryOp { left, right, .. } => {
                self.process_operator(expr, &[left, right])
            }
            ExprKind::UnaryOp { operand, .. } => self.process_operator(expr, &[operand]),
            ExprKind::Var(_) => Ok(Segment::single(self.leaf(expr, CfgNodeKind::VariableRef))),
            ExprKind::Literal(_) => Ok(Segment::single(self.leaf(expr, CfgNodeKind::Literal))),
            ExprKind::TupleLit(_)
            | ExprKind::ListLit(_)
            | ExprKind::MapLit(_)
            | ExprKind::StructLit { .. }
            | ExprKind::Access { .. }
            | ExprKind::AttributeRef(_) => {
                Ok(Segment::single(self.leaf(expr, CfgNodeKind::Expression)))
            }
        }
    }

    fn process_block(&mut self, statements: &[Expr], expr: &Expr) -> CfgResult<Segment> {
        if statements.is_empty() {
            return Ok(Segment::single(self.leaf(expr, CfgNodeKind::Expression)));
        }
        let mut entry = None;
        let mut pred_exits: Vec<CfgNodeId> = Vec::new();
        for statement in statements {
            let segment = self.process(statement)?;
            if entry.is_none() {
                entry = Some(segment.entry);
            } else {
                self.connect(&pred_exits, segment.entry, CfgEdgeKind::Sequential);
            }
            pred_exits = segment.exits;
        }
        Ok(Segment {
            entry: entry.expect("non-empty block"),
            exits: pred_exits,
        })
    }

    fn process_assign(&mut self, expr: &Expr, value: &Expr) -> CfgResult<Segment> {
        let value_segment = self.process(value)?;
        let node = self.make_node(expr, CfgNodeKind::Assignment);
        self.connect(&value_segment.exits, node, CfgEdgeKind::Sequential);
        Ok(Segment {
            entry: value_segment.entry,
            exits: vec![node],
        })
    }

    fn process_pipe(&mut self, expr: &Expr, left: &Expr, right: &Expr) -> CfgResult<Segment> {
        let left_segment = self.process(left)?;
        let node = self.make_node(expr, CfgNodeKind::Pipe);
        if let ExprKind::Call { function, .. } = &right.kind {
            if FILTER_CALLS.contains(function.as_str()) {
                self.node_metadata(node, "filter_pipe", json!(true));
            }
        }
        self.connect(&left_segment.exits, node, CfgEdgeKind::Sequential);
        let right_segment = self.process(right)?;
        self.edges
            .push(CfgEdge::sequential(node, right_segment.entry));
        Ok(Segment {
            entry: left_segment.entry,
            exits: right_segment.exits,
        })
    }

    fn process_conditional(
        &mut self,
        expr: &Expr,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: Option<&Expr>,
        negated: bool,
    ) -> CfgResult<Segment> {
        let cond_segment = self.process(condition)?;
        let node = self.make_node(expr, CfgNodeKind::Conditional);
        if negated {
            // unless cond == if not(cond)
            self.node_metadata(node, "negated", json!(true));
        }
        self.connect(&cond_segment.exits, node, CfgEdgeKind::Sequential);

        let mut exits = Vec::new();

        let then_scope = self.enter_scope(ScopeKind::IfThen, then_branch.meta.node_id.clone(), vec![]);
        let then_segment = self.process(then_branch)?;
        self.leave_scope(then_scope);
        let mut true_edge = CfgEdge::new(node, then_segment.entry, CfgEdgeKind::ConditionalTrue);
        true_edge.condition = Some(condition.preview());
        true_edge.probability = Some(0.5);
        self.edges.push(true_edge);
        exits.extend(then_segment.exits);

        match else_branch {
            Some(other) => {
                let else_scope = self.enter_scope(ScopeKind::IfElse, other.meta.node_id.clone(), vec![]);
                let else_segment = self.process(other)?;
                self.leave_scope(else_scope);
                let mut false_edge =
                    CfgEdge::new(node, else_segment.entry, CfgEdgeKind::ConditionalFalse);
                false_edge.condition = Some(condition.preview());
                false_edge.probability = Some(0.5);
                self.edges.push(false_edge);
                exits.extend(else_segment.exits);
            }
            None => {
                // Without an else branch the conditional itself is an exit
                exits.push(node);
            }
        }

        Ok(Segment {
            entry: cond_segment.entry,
            exits,
        })
    }

    fn process_case(&mut self, expr: &Expr, subject: &Expr, clauses: &[CaseClause]) -> CfgResult<Segment> {
        let subject_segment = self.process(subject)?;
        let node = self.make_node(expr, CfgNodeKind::Case);
        self.node_metadata(node, "clause_count", json!(clauses.len()));
        self.connect(&subject_segment.exits, node, CfgEdgeKind::Sequential);

        let exits = self.process_match_clauses(node, clauses, CfgNodeKind::CaseClause)?;
        Ok(Segment {
            entry: subject_segment.entry,
            exits: if exits.is_empty() { vec![node] } else { exits },
        })
    }

    /// Shared shape for case/receive/with-else branches: one branch node per
    /// clause, pattern_match edge carrying the rendered pattern, body in a
    /// fresh clause scope.
    fn process_match_clauses(
        &mut self,
        decision: CfgNodeId,
        clauses: &[CaseClause],
        branch_kind: CfgNodeKind,
    ) -> CfgResult<Vec<CfgNodeId>> {
        let mut exits = Vec::new();
        for clause in clauses {
            let scope_kind = match branch_kind {
                CfgNodeKind::Rescue => ScopeKind::Rescue,
                CfgNodeKind::Catch => ScopeKind::Catch,
                _ => ScopeKind::CaseClause,
            };
            let scope_id = self.enter_scope(
                scope_kind,
                clause.meta.node_id.clone(),
                clause.pattern.bound_names(),
            );
            let clause_node = self.add_node(
                branch_kind,
                clause.meta.line,
                clause.meta.node_id.clone(),
                Some(clause.pattern.render()),
            );
            let edge_kind = match branch_kind {
                CfgNodeKind::Rescue | CfgNodeKind::Catch => CfgEdgeKind::Exception,
                _ => CfgEdgeKind::PatternMatch,
            };
            let mut edge = CfgEdge::new(decision, clause_node, edge_kind);
            edge.condition = Some(clause.pattern.render());
            self.edges.push(edge);

            let mut pred_exits = vec![clause_node];
            if let Some(guard) = &clause.guard {
                self.guard_depth += 1;
                let guard_segment = self.process(guard);
                self.guard_depth -= 1;
                let guard_segment = guard_segment?;
                self.connect(&pred_exits, guard_segment.entry, CfgEdgeKind::Sequential);
                pred_exits = guard_segment.exits;
            }
            let body = self.process(&clause.body)?;
            self.connect(&pred_exits, body.entry, CfgEdgeKind::Sequential);
            exits.extend(body.exits);
            self.leave_scope(scope_id);
        }
        Ok(exits)
    }

    fn process_cond(
        &mut self,
        expr: &Expr,
        clauses: &[crate::shared::models::CondClause],
    ) -> CfgResult<Segment> {
        let node = self.make_node(expr, CfgNodeKind::Cond);
        self.node_metadata(node, "clause_count", json!(clauses.len()));

        let mut exits = Vec::new();
        for clause in clauses {
            let scope_id =
                self.enter_scope(ScopeKind::CaseClause, clause.meta.node_id.clone(), vec![]);
            let clause_node = self.add_node(
                CfgNodeKind::CondClause,
                clause.meta.line,
                clause.meta.node_id.clone(),
                Some(clause.condition.preview()),
            );
            let mut edge = CfgEdge::new(node, clause_node, CfgEdgeKind::PatternMatch);
            edge.condition = Some(clause.condition.preview());
            self.edges.push(edge);

            let body = self.process(&clause.body)?;
            self.connect(&[clause_node], body.entry, CfgEdgeKind::Sequential);
            exits.extend(body.exits);
            self.leave_scope(scope_id);
        }

        Ok(Segment {
            entry: node,
            exits: if exits.is_empty() { vec![node] } else { exits },
        })
    }

    fn process_with(
        &mut self,
        expr: &Expr,
        bindings: &[crate::shared::models::WithBinding],
        body: &Expr,
        else_clauses: &[CaseClause],
    ) -> CfgResult<Segment> {
        let node = self.make_node(expr, CfgNodeKind::With);
        self.node_metadata(node, "binding_count", json!(bindings.len()));

        // Bindings evaluate in order; each one can short-circuit to else
        let mut pred_exits = vec![node];
        for binding in bindings {
            let value = self.process(&binding.expr)?;
            self.connect(&pred_exits, value.entry, CfgEdgeKind::Sequential);
            let bind_node = self.add_node(
                CfgNodeKind::WithBinding,
                binding.meta.line,
                binding.meta.node_id.clone(),
                Some(binding.pattern.render()),
            );
            for &from in &value.exits {
                let mut edge = CfgEdge::new(from, bind_node, CfgEdgeKind::PatternMatch);
                edge.condition = Some(binding.pattern.render());
                self.edges.push(edge);
            }
            pred_exits = vec![bind_node];
        }

        let body_segment = self.process(body)?;
        self.connect(&pred_exits, body_segment.entry, CfgEdgeKind::Sequential);
        let mut exits = body_segment.exits;

        let else_exits = self.process_match_clauses(node, else_clauses, CfgNodeKind::CaseClause)?;
        exits.extend(else_exits);
        Ok(Segment {
            entry: node,
            exits,
        })
    }

    fn process_try(
        &mut self,
        expr: &Expr,
        body: &Expr,
        rescue_clauses: &[CaseClause],
        catch_clauses: &[CaseClause],
        after_block: Option<&Expr>,
    ) -> CfgResult<Segment> {
        let node = self.make_node(expr, CfgNodeKind::Try);

        let body_segment = self.process(body)?;
        self.connect(&[node], body_segment.entry, CfgEdgeKind::Sequential);
        let mut exits = body_segment.exits;

        exits.extend(self.process_match_clauses(node, rescue_clauses, CfgNodeKind::Rescue)?);
        exits.extend(self.process_match_clauses(node, catch_clauses, CfgNodeKind::Catch)?);

        if let Some(after) = after_block {
            // The after block runs on every exit
            let after_node = self.add_node(
                CfgNodeKind::After,
                after.meta.line,
                after.meta.node_id.clone(),
                None,
            );
            self.connect(&exits, after_node, CfgEdgeKind::Sequential);
            let after_segment = self.process(after)?;
            self.edges
                .push(CfgEdge::sequential(after_node, after_segment.entry));
            exits = after_segment.exits;
        }

        Ok(Segment {
            entry: node,
            exits,
        })
    }

    fn process_for(
        &mut self,
        expr: &Expr,
        generators: &[crate::shared::models::Generator],
        filters: &[Expr],
        body: &Expr,
    ) -> CfgResult<Segment> {
        let mut entry = None;
        let mut pred_exits: Vec<CfgNodeId> = Vec::new();
        for generator in generators {
            let source = self.process(&generator.source)?;
            if entry.is_none() {
                entry = Some(source.entry);
            } else {
                self.connect(&pred_exits, source.entry, CfgEdgeKind::Sequential);
            }
            pred_exits = source.exits;
        }

        let node = self.make_node(expr, CfgNodeKind::Comprehension);
        let contribution = (generators.len() + filters.len()).max(1);
        self.node_metadata(node, "generator_count", json!(generators.len()));
        self.node_metadata(node, "filter_count", json!(filters.len()));
        self.node_metadata(node, "complexity_contribution", json!(contribution));
        self.connect(&pred_exits, node, CfgEdgeKind::Sequential);

        let mut variables = Vec::new();
        for generator in generators {
            variables.extend(generator.pattern.bound_names());
        }
        let scope_id = self.enter_scope(ScopeKind::Comprehension, expr.meta.node_id.clone(), variables);
        let body_segment = self.process(body)?;
        self.leave_scope(scope_id);
        self.edges
            .push(CfgEdge::sequential(node, body_segment.entry));
        // Iteration back-edge
        for &from in &body_segment.exits {
            let mut edge = CfgEdge::sequential(from, node);
            edge.metadata.insert("loop_back".to_string(), json!(true));
            self.edges.push(edge);
        }

        Ok(Segment {
            entry: entry.unwrap_or(node),
            exits: vec![node],
        })
    }

    fn process_receive(
        &mut self,
        expr: &Expr,
        clauses: &[CaseClause],
        after_clause: Option<&crate::shared::models::ReceiveAfter>,
    ) -> CfgResult<Segment> {
        let node = self.make_node(expr, CfgNodeKind::Receive);
        self.node_metadata(node, "clause_count", json!(clauses.len()));

        let mut exits = self.process_match_clauses(node, clauses, CfgNodeKind::CaseClause)?;
        if let Some(after) = after_clause {
            let after_segment = self.process(&after.body)?;
            let mut edge = CfgEdge::sequential(node, after_segment.entry);
            edge.metadata
                .insert("after_timeout".to_string(), json!(after.timeout.preview()));
            self.edges.push(edge);
            exits.extend(after_segment.exits);
        }

        Ok(Segment {
            entry: node,
            exits: if exits.is_empty() { vec![node] } else { exits },
        })
    }

    fn process_fn(
        &mut self,
        expr: &Expr,
        clauses: &[crate::shared::models::FnClause],
    ) -> CfgResult<Segment> {
        let node = self.make_node(expr, CfgNodeKind::AnonymousFunction);
        self.node_metadata(node, "clause_count", json!(clauses.len()));

        // Clause bodies are analysed but do not flow into the enclosing
        // continuation; the definition itself is the single exit.
        for clause in clauses {
            let scope_id = self.enter_scope(
                ScopeKind::AnonymousFn,
                clause.meta.node_id.clone(),
                clause_variables(&clause.params),
            );
            let mut pred_exits = vec![node];
            if let Some(guard) = &clause.guard {
                self.guard_depth += 1;
                let guard_segment = self.process(guard);
                self.guard_depth -= 1;
                let guard_segment = guard_segment?;
                let mut edge =
                    CfgEdge::new(node, guard_segment.entry, CfgEdgeKind::PatternMatch);
                edge.condition = Some(render_params(&clause.params));
                self.edges.push(edge);
                pred_exits = guard_segment.exits;
            }
            let body = self.process(&clause.body)?;
            if pred_exits == vec![node] {
                let mut edge = CfgEdge::new(node, body.entry, CfgEdgeKind::PatternMatch);
                edge.condition = Some(render_params(&clause.params));
                self.edges.push(edge);
            } else {
                self.connect(&pred_exits, body.entry, CfgEdgeKind::Sequential);
            }
            self.leave_scope(scope_id);
        }

        Ok(Segment::single(node))
    }

    fn process_call(&mut self, expr: &Expr, function: &str, args: &[Expr]) -> CfgResult<Segment> {
        let mut entry = None;
        let mut pred_exits: Vec<CfgNodeId> = Vec::new();
        for arg in args {
            let segment = self.process(arg)?;
            if entry.is_none() {
                entry = Some(segment.entry);
            } else {
                self.connect(&pred_exits, segment.entry, CfgEdgeKind::Sequential);
            }
            pred_exits = segment.exits;
        }

        let kind = if self.guard_depth > 0 && GUARD_PREDICATES.contains(function) {
            CfgNodeKind::GuardCheck
        } else {
            CfgNodeKind::FunctionCall
        };
        let node = self.make_node(expr, kind);
        if let ExprKind::Call { module, function, args } = &expr.kind {
            let callee = match module {
                Some(m) => format!("{}.{}/{}", m, function, args.len()),
                None => format!("{}/{}", function, args.len()),
            };
            self.node_metadata(node, "callee", json!(callee));
        }
        self.connect(&pred_exits, node, CfgEdgeKind::Sequential);
        Ok(Segment {
            entry: entry.unwrap_or(node),
            exits: vec![node],
        })
    }

    fn process_send(&mut self, expr: &Expr, dest: &Expr, message: &Expr) -> CfgResult<Segment> {
        let dest_segment = self.process(dest)?;
        let message_segment = self.process(message)?;
        self.connect(
            &dest_segment.exits,
            message_segment.entry,
            CfgEdgeKind::Sequential,
        );
        let node = self.make_node(expr, CfgNodeKind::Send);
        self.connect(&message_segment.exits, node, CfgEdgeKind::Sequential);
        Ok(Segment {
            entry: dest_segment.entry,
            exits: vec![node],
        })
    }

    fn process_spawn(&mut self, expr: &Expr, body: &Expr) -> CfgResult<Segment> {
        let node = self.make_node(expr, CfgNodeKind::Spawn);
        // The spawned expression runs in another process; analyse it behind
        // a call edge so it stays reachable without joining the local flow
        let body_segment = self.process(body)?;
        self.edges
            .push(CfgEdge::new(node, body_segment.entry, CfgEdgeKind::Call));
        Ok(Segment::single(node))
    }

    /// raise/throw/exit: control never continues past the node locally;
    /// finalisation wires it to the function exit
    fn process_raising(&mut self, expr: &Expr, kind: CfgNodeKind, args: &[impl std::borrow::Borrow<Expr>]) -> CfgResult<Segment> {
        let mut entry = None;
        let mut pred_exits: Vec<CfgNodeId> = Vec::new();
        for arg in args {
            let segment = self.process(arg.borrow())?;
            if entry.is_none() {
                entry = Some(segment.entry);
            } else {
                self.connect(&pred_exits, segment.entry, CfgEdgeKind::Sequential);
            }
            pred_exits = segment.exits;
        }
        let node = self.make_node(expr, kind);
        self.connect(&pred_exits, node, CfgEdgeKind::Sequential);
        self.terminators.push(node);
        Ok(Segment {
            entry: entry.unwrap_or(node),
            exits: Vec::new(),
        })
    }

    fn process_operator(&mut self, expr: &Expr, operands: &[&Expr]) -> CfgResult<Segment> {
        let mut entry = None;
        let mut pred_exits: Vec<CfgNodeId> = Vec::new();
        for operand in operands {
            let segment = self.process(operand)?;
            if entry.is_none() {
                entry = Some(segment.entry);
            } else {
                self.connect(&pred_exits, segment.entry, CfgEdgeKind::Sequential);
            }
            pred_exits = segment.exits;
        }
        let node = self.make_node(expr, CfgNodeKind::Operator);
        self.connect(&pred_exits, node, CfgEdgeKind::Sequential);
        Ok(Segment {
            entry: entry.unwrap_or(node),
            exits: vec![node],
        })
    }

    // ------------------------------------------------------------------
    // State helpers
    // ------------------------------------------------------------------

    fn add_node(
        &mut self,
        kind: CfgNodeKind,
        line: u32,
        ast_node_id: Option<String>,
        expression: Option<String>,
    ) -> CfgNodeId {
        let id = CfgNodeId(self.nodes.len() as u32);
        self.nodes.push(CfgNode {
            id,
            kind,
            scope_id: self.current_scope.clone(),
            line,
            ast_node_id,
            expression,
            metadata: HashMap::new(),
        });
        id
    }

    fn make_node(&mut self, expr: &Expr, kind: CfgNodeKind) -> CfgNodeId {
        self.add_node(
            kind,
            expr.meta.line,
            expr.meta.node_id.clone(),
            Some(expr.preview()),
        )
    }

    fn leaf(&mut self, expr: &Expr, kind: CfgNodeKind) -> CfgNodeId {
        self.make_node(expr, kind)
    }

    fn node_metadata(&mut self, id: CfgNodeId, key: &str, value: serde_json::Value) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.metadata.insert(key.to_string(), value);
        }
    }

    fn connect(&mut self, from: &[CfgNodeId], to: CfgNodeId, kind: CfgEdgeKind) {
        for &source in from {
            self.edges.push(CfgEdge::new(source, to, kind));
        }
    }

    fn enter_scope(
        &mut self,
        kind: ScopeKind,
        ast_node_id: Option<String>,
        variables: Vec<String>,
    ) -> String {
        let id = format!("{}_{}", kind.as_str(), self.scope_counter);
        self.scope_counter += 1;
        self.scopes.insert(
            id.clone(),
            Scope {
                id: id.clone(),
                kind,
                parent: Some(self.current_scope.clone()),
                variables,
                ast_node_id,
                metadata: HashMap::new(),
            },
        );
        self.current_scope = id.clone();
        id
    }

    fn leave_scope(&mut self, scope_id: String) {
        debug_assert_eq!(self.current_scope, scope_id);
        let parent = self
            .scopes
            .get(&scope_id)
            .and_then(|s| s.parent.clone())
            .unwrap_or_else(|| "function".to_string());
        self.current_scope = parent;
    }

    fn bind_scope_variables(&mut self, scope_id: &str, params: &[Pattern]) {
        if let Some(scope) = self.scopes.get_mut(scope_id) {
            scope.variables = clause_variables(params);
        }
    }
}

fn clause_variables(params: &[Pattern]) -> Vec<String> {
    let mut variables = Vec::new();
    for pattern in params {
        variables.extend(pattern.bound_names());
    }
    variables
}

fn render_params(params: &[Pattern]) -> String {
    let rendered: Vec<String> = params.iter().map(|p| p.render()).collect();
    format!("({})", rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{Literal, Meta};

    fn build(function: &FunctionDef) -> ControlFlowGraph {
        build_cfg(function, &CfgBuildOpts::default()).expect("cfg builds")
    }

    fn identity_fn() -> FunctionDef {
        FunctionDef::simple("f", vec![Pattern::var("x", 1)], None, Expr::var("x", 1), 1)
    }

    #[test]
    fn test_trivial_function_three_nodes_two_edges() {
        let cfg = build(&identity_fn());
        assert_eq!(cfg.node_count(), 3); // entry, variable_ref, exit
        assert_eq!(cfg.edge_count(), 2);
        assert_eq!(cfg.complexity.cyclomatic, 1);
    }

    #[test]
    fn test_empty_body_direct_edge() {
        let def = FunctionDef::simple("noop", vec![], None, Expr::block(vec![], 1), 1);
        let cfg = build(&def);
        assert_eq!(cfg.node_count(), 2);
        assert_eq!(cfg.edge_count(), 1);
        assert_eq!(
            cfg.edges[0].metadata.get("connection"),
            Some(&json!("entry_to_exit_direct"))
        );
    }

    #[test]
    fn test_if_else_branches() {
        // if x > 0 do :pos else :neg end
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
        let def = FunctionDef::simple("g", vec![Pattern::var("x", 1)], None, body, 1);
        let cfg = build(&def);

        let conditionals = cfg.nodes_of_kind(CfgNodeKind::Conditional);
        assert_eq!(conditionals.len(), 1);
        let cond_id = conditionals[0].id;
        let true_edges: Vec<_> = cfg
            .edges
            .iter()
            .filter(|e| e.from == cond_id && e.kind == CfgEdgeKind::ConditionalTrue)
            .collect();
        let false_edges: Vec<_> = cfg
            .edges
            .iter()
            .filter(|e| e.from == cond_id && e.kind == CfgEdgeKind::ConditionalFalse)
            .collect();
        assert_eq!(true_edges.len(), 1);
        assert_eq!(false_edges.len(), 1);
        assert_eq!(true_edges[0].probability, Some(0.5));
        assert_eq!(cfg.complexity.decision_points, 1);
        assert_eq!(cfg.complexity.cyclomatic, 2);
    }

    #[test]
    fn test_case_three_clauses() {
        let clauses = vec![
            CaseClause {
                pattern: Pattern::literal(Literal::Int(1), 3),
                guard: None,
                body: Expr::atom("one", 3),
                meta: Meta::new(3, 0),
            },
            CaseClause {
                pattern: Pattern::literal(Literal::Int(2), 4),
                guard: None,
                body: Expr::atom("two", 4),
                meta: Meta::new(4, 0),
            },
            CaseClause {
                pattern: Pattern::wildcard(5),
                guard: None,
                body: Expr::atom("other", 5),
                meta: Meta::new(5, 0),
            },
        ];
        let body = Expr::new(
            ExprKind::Case {
                subject: Box::new(Expr::var("x", 2)),
                clauses,
            },
            2,
        );
        let def = FunctionDef::simple("h", vec![Pattern::var("x", 1)], None, body, 1);
        let cfg = build(&def);

        let case_nodes = cfg.nodes_of_kind(CfgNodeKind::Case);
        assert_eq!(case_nodes.len(), 1);
        assert_eq!(case_nodes[0].metadata.get("clause_count"), Some(&json!(3)));
        assert_eq!(cfg.nodes_of_kind(CfgNodeKind::CaseClause).len(), 3);
        let match_edges: Vec<_> = cfg
            .edges
            .iter()
            .filter(|e| e.kind == CfgEdgeKind::PatternMatch)
            .collect();
        assert_eq!(match_edges.len(), 3);
        assert_eq!(cfg.complexity.decision_points, 2);
        assert_eq!(cfg.complexity.cyclomatic, 3);
        // Literal patterns bind nothing
        for scope in cfg.scopes.values() {
            if scope.kind == ScopeKind::CaseClause {
                assert!(scope.variables.is_empty());
            }
        }
    }

    #[test]
    fn test_guard_produces_guard_check() {
        let guard = Expr::call(None, "is_integer", vec![Expr::var("x", 1)], 1);
        let def = FunctionDef::simple(
            "g",
            vec![Pattern::var("x", 1)],
            Some(guard),
            Expr::var("x", 2),
            1,
        );
        let cfg = build(&def);
        assert_eq!(cfg.nodes_of_kind(CfgNodeKind::GuardCheck).len(), 1);
        assert_eq!(cfg.complexity.decision_points, 1);
        assert_eq!(cfg.complexity.cyclomatic, 2);
    }

    #[test]
    fn test_call_literal_args_get_nodes() {
        // calc(1, x): every argument becomes a leaf node
        let body = Expr::call(
            None,
            "calc",
            vec![Expr::int(1, 2), Expr::var("x", 2)],
            2,
        );
        let def = FunctionDef::simple("g", vec![Pattern::var("x", 1)], None, body, 1);
        let cfg = build(&def);

        assert_eq!(cfg.nodes_of_kind(CfgNodeKind::Literal).len(), 1);
        assert_eq!(cfg.nodes_of_kind(CfgNodeKind::VariableRef).len(), 1);
        // entry, literal, variable_ref, function_call, exit
        assert_eq!(cfg.node_count(), 5);
        assert_eq!(cfg.complexity.halstead.total_operands, 2);
    }

    #[test]
    fn test_raise_is_terminating() {
        let body = Expr::block(
            vec![
                Expr::new(
                    ExprKind::Raise {
                        args: vec![Expr::literal(Literal::Str("boom".to_string()), 2)],
                    },
                    2,
                ),
                Expr::atom("unreachable", 3),
            ],
            1,
        );
        let def = FunctionDef::simple("boom", vec![], None, body, 1);
        let cfg = build(&def);
        assert_eq!(cfg.nodes_of_kind(CfgNodeKind::Raise).len(), 1);
        // Statement behind the raise is unreachable
        assert_eq!(cfg.path_analysis.unreachable_nodes.len(), 1);
    }

    #[test]
    fn test_multi_clause_function_fans_out() {
        let clause = |value: i64, result: &str, line: u32| FunctionClause {
            params: vec![Pattern::literal(Literal::Int(value), line)],
            guard: None,
            body: Expr::atom(result, line),
            meta: Meta::new(line, 0),
        };
        let def = FunctionDef {
            name: "pick".to_string(),
            clauses: vec![clause(0, "zero", 1), clause(1, "one", 2)],
            private: false,
            meta: Meta::new(1, 0),
        };
        let cfg = build(&def);
        let entry_out: Vec<_> = cfg
            .edges
            .iter()
            .filter(|e| e.from == cfg.entry && e.kind == CfgEdgeKind::PatternMatch)
            .collect();
        assert_eq!(entry_out.len(), 2);
    }

    #[test]
    fn test_pipe_chain() {
        // x |> transform() |> filter()
        let inner = Expr::new(
            ExprKind::Pipe {
                left: Box::new(Expr::var("x", 2)),
                right: Box::new(Expr::call(None, "transform", vec![], 2)),
            },
            2,
        );
        let body = Expr::new(
            ExprKind::Pipe {
                left: Box::new(inner),
                right: Box::new(Expr::call(None, "filter", vec![], 2)),
            },
            2,
        );
        let def = FunctionDef::simple("p", vec![Pattern::var("x", 1)], None, body, 1);
        let cfg = build(&def);
        assert_eq!(cfg.nodes_of_kind(CfgNodeKind::Pipe).len(), 2);
        // filter-style right side contributes one decision point
        assert_eq!(cfg.complexity.decision_points, 1);
    }

    #[test]
    fn test_comprehension_contribution() {
        let body = Expr::new(
            ExprKind::For {
                generators: vec![crate::shared::models::Generator {
                    pattern: Pattern::var("item", 2),
                    source: Expr::var("items", 2),
                    meta: Meta::new(2, 0),
                }],
                filters: vec![Expr::call(None, "valid?", vec![Expr::var("item", 2)], 2)],
                body: Box::new(Expr::var("item", 3)),
            },
            2,
        );
        let def = FunctionDef::simple("c", vec![Pattern::var("items", 1)], None, body, 1);
        let cfg = build(&def);
        let nodes = cfg.nodes_of_kind(CfgNodeKind::Comprehension);
        assert_eq!(nodes.len(), 1);
        assert_eq!(
            nodes[0].metadata.get("complexity_contribution"),
            Some(&json!(2))
        );
        assert_eq!(cfg.complexity.decision_points, 2);
        // The iteration back-edge is reported as a loop
        assert_eq!(cfg.path_analysis.loops.len(), 1);
    }

    #[test]
    fn test_invalid_ast_rejected() {
        let def = FunctionDef {
            name: "broken".to_string(),
            clauses: vec![],
            private: false,
            meta: Meta::new(1, 0),
        };
        let err = build_cfg(&def, &CfgBuildOpts::default()).unwrap_err();
        assert!(matches!(err, CfgError::InvalidAst { .. }));
    }
}
