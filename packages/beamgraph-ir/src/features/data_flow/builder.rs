//! DFG builder (SSA form)
//!
//! Mirrors the CFG dispatch but tracks data instead of control: variable
//! versions per `(name, scope)`, def/use chains, mutations vs shadows,
//! pattern decomposition, pipe flow, captures into closures and
//! comprehensions, and φ-nodes at control-flow joins.
//!
//! φ placement uses the merge approximation: at every join where at least
//! two incoming branches resolve a variable to distinct versions, a φ with
//! ordered inputs is emitted and bound at the merge scope.

use super::analyses::finalize_analyses;
use super::cycles::check_assignment_cycles;
use super::errors::{DfgError, DfgResult};
use crate::shared::models::{
    CaptureRecord, CaseClause, DataFlowGraph, DfgEdge, DfgEdgeKind, DfgNode, DfgNodeId,
    DfgNodeKind, Expr, ExprKind, FunctionDef, MutationRecord, Pattern, PatternKind, PhiIncoming,
    PhiNode, ScopeKind, ShadowRecord, VariableVersion,
};
use crate::shared::utils::Deadline;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// DFG build options
#[derive(Debug, Clone, Default)]
pub struct DfgBuildOpts {
    pub deadline: Option<Deadline>,
}

/// Build the SSA data flow graph of one function definition.
pub fn build_dfg(function: &FunctionDef, opts: &DfgBuildOpts) -> DfgResult<DataFlowGraph> {
    if function.clauses.is_empty() {
        return Err(DfgError::invalid("function has no clauses"));
    }

    let mut builder = DfgBuilder::new(opts.deadline);

    let single_clause = function.clauses.len() == 1;
    for clause in &function.clauses {
        let clause_scope = if single_clause {
            None
        } else {
            Some(builder.enter_scope(ScopeKind::CaseClause))
        };

        for param in &clause.params {
            builder.bind_pattern(param, &[], clause.meta.line, clause.meta.node_id.clone(), true);
        }
        if let Some(guard) = &clause.guard {
            builder.process(guard)?;
        }
        builder.process(&clause.body)?;

        if let Some(scope) = clause_scope {
            builder.leave_scope(scope);
        }
    }

    check_assignment_cycles(&builder.scope_deps)?;

    let mut dfg = DataFlowGraph {
        nodes: builder.nodes,
        edges: builder.edges,
        versions: builder.versions,
        phi_nodes: builder.phi_nodes,
        mutations: builder.mutations,
        shadows: builder.shadows,
        captures: builder.captures,
        lifetimes: HashMap::new(),
        unused_variables: Vec::new(),
        optimization_hints: Vec::new(),
        metrics: Default::default(),
    };
    finalize_analyses(&mut dfg, &builder.call_sites);
    Ok(dfg)
}

#[derive(Debug, Clone)]
struct ScopeEntry {
    id: String,
    kind: ScopeKind,
}

/// One read observed while processing an expression; feeds the same-scope
/// dependency graph used for cycle detection
#[derive(Debug, Clone)]
struct ReadEvent {
    name: String,
    /// Scope the read resolved in; None means unresolved (assumed to be a
    /// same-scope forward reference)
    def_scope: Option<String>,
    via_capture: bool,
    from_parameter: bool,
}

pub(super) struct DfgBuilder {
    nodes: Vec<DfgNode>,
    edges: Vec<DfgEdge>,
    versions: Vec<VariableVersion>,
    phi_nodes: Vec<PhiNode>,
    mutations: Vec<MutationRecord>,
    shadows: Vec<ShadowRecord>,
    captures: Vec<CaptureRecord>,
    /// (name, scope_id) → index into `versions`
    bindings: HashMap<(String, String), usize>,
    version_counters: HashMap<String, u32>,
    scope_stack: Vec<ScopeEntry>,
    scope_counter: u32,
    read_log: Vec<ReadEvent>,
    /// scope → (assigned name, names its value depends on)
    pub(super) scope_deps: BTreeMap<String, Vec<(String, BTreeSet<String>)>>,
    /// Canonicalised call sites for common-subexpression detection
    call_sites: Vec<(String, u32)>,
    deadline: Option<Deadline>,
}

impl DfgBuilder {
    fn new(deadline: Option<Deadline>) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            versions: Vec::new(),
            phi_nodes: Vec::new(),
            mutations: Vec::new(),
            shadows: Vec::new(),
            captures: Vec::new(),
            bindings: HashMap::new(),
            version_counters: HashMap::new(),
            scope_stack: vec![ScopeEntry {
                id: "function".to_string(),
                kind: ScopeKind::Function,
            }],
            scope_counter: 1,
            read_log: Vec::new(),
            scope_deps: BTreeMap::new(),
            call_sites: Vec::new(),
            deadline,
        }
    }

    fn current_scope(&self) -> String {
        self.scope_stack.last().expect("scope stack non-empty").id.clone()
    }

    fn enter_scope(&mut self, kind: ScopeKind) -> String {
        let id = format!("{}_{}", kind.as_str(), self.scope_counter);
        self.scope_counter += 1;
        self.scope_stack.push(ScopeEntry {
            id: id.clone(),
            kind,
        });
        id
    }

    fn leave_scope(&mut self, scope_id: String) {
        debug_assert_eq!(self.current_scope(), scope_id);
        self.scope_stack.pop();
    }

    // ------------------------------------------------------------------
    // Reads and bindings
    // ------------------------------------------------------------------

    /// Resolve a name through the scope chain: (version index, whether a
    /// closure boundary sits between use and definition)
    fn resolve(&self, name: &str) -> Option<(usize, bool, Option<String>)> {
        let mut closure_boundary: Option<String> = None;
        for entry in self.scope_stack.iter().rev() {
            if let Some(&index) = self.bindings.get(&(name.to_string(), entry.id.clone())) {
                return Some((index, closure_boundary.is_some(), closure_boundary));
            }
            if matches!(entry.kind, ScopeKind::AnonymousFn | ScopeKind::Comprehension) {
                closure_boundary = Some(entry.id.clone());
            }
        }
        None
    }

    fn read_var(&mut self, name: &str, line: u32, ast_node_id: Option<String>) -> DfgNodeId {
        let resolution = self.resolve(name);
        let (version, event) = match &resolution {
            Some((index, crossed, _)) => {
                let info = &self.versions[*index];
                (
                    info.version,
                    ReadEvent {
                        name: name.to_string(),
                        def_scope: Some(info.scope_id.clone()),
                        via_capture: *crossed,
                        from_parameter: info.is_parameter,
                    },
                )
            }
            None => (
                0,
                ReadEvent {
                    name: name.to_string(),
                    def_scope: None,
                    via_capture: false,
                    from_parameter: false,
                },
            ),
        };

        let use_node = self.add_node(
            DfgNodeKind::Use,
            name.to_string(),
            version,
            line,
            ast_node_id,
        );

        if let Some((index, crossed, boundary)) = resolution {
            let def_node = self.versions[index].defining_node;
            let kind = if crossed {
                self.versions[index].is_captured = true;
                if let Some(into_scope) = boundary {
                    self.captures.push(CaptureRecord {
                        variable: name.to_string(),
                        from_scope: self.versions[index].scope_id.clone(),
                        into_scope,
                        line,
                    });
                }
                DfgEdgeKind::Capture
            } else if self.nodes[def_node.index()].kind == DfgNodeKind::Phi {
                DfgEdgeKind::PhiOutput
            } else {
                DfgEdgeKind::DefUse
            };
            self.edges.push(DfgEdge {
                from: def_node,
                to: use_node,
                kind,
                variable: Some(name.to_string()),
            });
        }

        self.read_log.push(event);
        use_node
    }

    /// Bind one name in the current scope, handling mutation and shadowing
    fn bind_var(
        &mut self,
        name: &str,
        line: u32,
        ast_node_id: Option<String>,
        sources: &[DfgNodeId],
        edge_kind: DfgEdgeKind,
        is_parameter: bool,
    ) -> DfgNodeId {
        let scope = self.current_scope();
        let key = (name.to_string(), scope.clone());

        let previous = self.bindings.get(&key).copied();
        let shadowed = previous.is_none().then(|| {
            self.scope_stack[..self.scope_stack.len() - 1]
                .iter()
                .rev()
                .find_map(|entry| {
                    self.bindings
                        .contains_key(&(name.to_string(), entry.id.clone()))
                        .then(|| entry.id.clone())
                })
        });

        let counter = self.version_counters.entry(name.to_string()).or_insert(0);
        let version = *counter;
        *counter += 1;

        let def_node = self.add_node(
            DfgNodeKind::Definition,
            name.to_string(),
            version,
            line,
            ast_node_id,
        );
        self.versions.push(VariableVersion {
            name: name.to_string(),
            version,
            scope_id: scope.clone(),
            defining_node: def_node,
            is_parameter,
            is_captured: false,
        });
        let index = self.versions.len() - 1;

        if let Some(previous_index) = previous {
            let previous_info = &self.versions[previous_index];
            self.mutations.push(MutationRecord {
                variable: name.to_string(),
                scope_id: scope.clone(),
                from_version: previous_info.version,
                to_version: version,
                line,
            });
            self.edges.push(DfgEdge {
                from: previous_info.defining_node,
                to: def_node,
                kind: DfgEdgeKind::Mutation,
                variable: Some(name.to_string()),
            });
        } else if let Some(Some(outer_scope)) = shadowed {
            self.shadows.push(ShadowRecord {
                variable: name.to_string(),
                outer_scope,
                inner_scope: scope.clone(),
                line,
            });
        }

        self.bindings.insert(key, index);

        for &source in sources {
            self.edges.push(DfgEdge {
                from: source,
                to: def_node,
                kind: edge_kind,
                variable: Some(name.to_string()),
            });
        }
        def_node
    }

    /// Recursively decompose a pattern into position-tagged bindings.
    ///
    /// The top-level variable binds through `data` edges; nested positions
    /// bind through `pattern_bind` edges (the synthetic access step).
    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        sources: &[DfgNodeId],
        line: u32,
        ast_node_id: Option<String>,
        is_parameter: bool,
    ) -> Vec<DfgNodeId> {
        let mut bound = Vec::new();
        self.bind_pattern_inner(pattern, sources, line, &ast_node_id, is_parameter, 0, &mut bound);
        bound
    }

    #[allow(clippy::too_many_arguments)]
    fn bind_pattern_inner(
        &mut self,
        pattern: &Pattern,
        sources: &[DfgNodeId],
        line: u32,
        ast_node_id: &Option<String>,
        is_parameter: bool,
        depth: u32,
        bound: &mut Vec<DfgNodeId>,
    ) {
        let edge_kind = if depth == 0 {
            DfgEdgeKind::Data
        } else {
            DfgEdgeKind::PatternBind
        };
        match &pattern.kind {
            PatternKind::Var(name) => {
                let line = if pattern.meta.line > 0 { pattern.meta.line } else { line };
                let id = pattern.meta.node_id.clone().or_else(|| ast_node_id.clone());
                bound.push(self.bind_var(name, line, id, sources, edge_kind, is_parameter));
            }
            PatternKind::Pin(name) => {
                let line = if pattern.meta.line > 0 { pattern.meta.line } else { line };
                self.read_var(name, line, pattern.meta.node_id.clone());
            }
            PatternKind::Wildcard | PatternKind::Literal(_) => {}
            PatternKind::Tuple(elements) => {
                for element in elements {
                    self.bind_pattern_inner(element, sources, line, ast_node_id, is_parameter, depth + 1, bound);
                }
            }
            PatternKind::List { elements, tail } => {
                for element in elements {
                    self.bind_pattern_inner(element, sources, line, ast_node_id, is_parameter, depth + 1, bound);
                }
                if let Some(tail) = tail {
                    self.bind_pattern_inner(tail, sources, line, ast_node_id, is_parameter, depth + 1, bound);
                }
            }
            PatternKind::Map(entries) => {
                for (_, value) in entries {
                    self.bind_pattern_inner(value, sources, line, ast_node_id, is_parameter, depth + 1, bound);
                }
            }
            PatternKind::Keyword(entries) => {
                for (_, value) in entries {
                    self.bind_pattern_inner(value, sources, line, ast_node_id, is_parameter, depth + 1, bound);
                }
            }
            PatternKind::Struct { fields, .. } => {
                for (_, value) in fields {
                    self.bind_pattern_inner(value, sources, line, ast_node_id, is_parameter, depth + 1, bound);
                }
            }
        }
    }

    fn add_node(
        &mut self,
        kind: DfgNodeKind,
        variable: String,
        version: u32,
        line: u32,
        ast_node_id: Option<String>,
    ) -> DfgNodeId {
        let id = DfgNodeId(self.nodes.len() as u32);
        self.nodes.push(DfgNode {
            id,
            kind,
            variable,
            version,
            scope_id: self.current_scope(),
            line,
            ast_node_id,
        });
        id
    }

    // ------------------------------------------------------------------
    // φ placement
    // ------------------------------------------------------------------

    /// Place φ-nodes at a join. `branch_scopes` are the scopes of the
    /// incoming branches in predecessor order; with `fallthrough` the
    /// enclosing version also reaches the join (if without else).
    fn merge_branches(&mut self, branch_scopes: &[String], fallthrough: bool, line: u32) {
        let mut names: BTreeSet<String> = BTreeSet::new();
        for ((name, scope), _) in self.bindings.iter() {
            if branch_scopes.contains(scope) {
                names.insert(name.clone());
            }
        }

        for name in names {
            let mut arms: Vec<(String, usize)> = Vec::new();
            for scope in branch_scopes {
                if let Some(&index) = self.bindings.get(&(name.clone(), scope.clone())) {
                    arms.push((scope.clone(), index));
                } else if let Some((index, _, _)) = self.resolve(&name) {
                    arms.push((scope.clone(), index));
                }
            }
            if fallthrough {
                if let Some((index, _, _)) = self.resolve(&name) {
                    arms.push((self.current_scope(), index));
                }
            }

            let distinct: HashSet<u32> =
                arms.iter().map(|(_, index)| self.versions[*index].version).collect();
            if arms.len() < 2 || distinct.len() < 2 {
                continue;
            }

            let scope = self.current_scope();
            let counter = self.version_counters.entry(name.clone()).or_insert(0);
            let version = *counter;
            *counter += 1;

            let phi_node = self.add_node(DfgNodeKind::Phi, name.clone(), version, line, None);
            let mut incoming = Vec::new();
            for (branch, index) in &arms {
                let info = &self.versions[*index];
                incoming.push(PhiIncoming {
                    predecessor: branch.clone(),
                    source_version: info.version,
                });
                self.edges.push(DfgEdge {
                    from: info.defining_node,
                    to: phi_node,
                    kind: DfgEdgeKind::PhiInput,
                    variable: Some(name.clone()),
                });
            }

            self.versions.push(VariableVersion {
                name: name.clone(),
                version,
                scope_id: scope.clone(),
                defining_node: phi_node,
                is_parameter: false,
                is_captured: false,
            });
            self.bindings
                .insert((name.clone(), scope.clone()), self.versions.len() - 1);
            self.phi_nodes.push(PhiNode {
                variable: name,
                target_version: version,
                scope_id: scope,
                node: phi_node,
                incoming,
            });
        }
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Process one expression; returns the nodes producing its value
    pub(super) fn process(&mut self, expr: &Expr) -> DfgResult<Vec<DfgNodeId>> {
        if let Some(deadline) = self.deadline {
            deadline.check().map_err(|_| DfgError::Timeout)?;
        }

        match &expr.kind {
            ExprKind::Block(statements) => {
                let mut last = Vec::new();
                for statement in statements {
                    last = self.process(statement)?;
                }
                Ok(last)
            }
            ExprKind::Assign { pattern, value } => {
                let mark = self.read_log.len();
                let sources = self.process(value)?;
                let dep_names = self.collect_deps(mark);
                let bound = self.bind_pattern(
                    pattern,
                    &sources,
                    expr.meta.line,
                    expr.meta.node_id.clone(),
                    false,
                );
                let scope = self.current_scope();
                for name in pattern.bound_names() {
                    let deps: BTreeSet<String> =
                        dep_names.iter().filter(|d| **d != name).cloned().collect();
                    self.scope_deps
                        .entry(scope.clone())
                        .or_default()
                        .push((name, deps));
                }
                Ok(bound)
            }
            ExprKind::Pipe { left, right } => {
                let left_sources = self.process(left)?;
                let right_sources = self.process(right)?;
                for &from in &left_sources {
                    for &to in &right_sources {
                        self.edges.push(DfgEdge {
                            from,
                            to,
                            kind: DfgEdgeKind::PipeFlow,
                            variable: None,
                        });
                    }
                }
                Ok(right_sources)
            }
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
                self.process(condition)?;

                let then_scope = self.enter_scope(ScopeKind::IfThen);
                let mut sources = self.process(then_branch)?;
                self.leave_scope(then_scope.clone());

                match else_branch {
                    Some(other) => {
                        let else_scope = self.enter_scope(ScopeKind::IfElse);
                        sources.extend(self.process(other)?);
                        self.leave_scope(else_scope.clone());
                        self.merge_branches(&[then_scope, else_scope], false, expr.meta.line);
                    }
                    None => {
                        self.merge_branches(&[then_scope], true, expr.meta.line);
                    }
                }
                Ok(sources)
            }
            ExprKind::Case { subject, clauses } => {
                let subject_sources = self.process(subject)?;
                self.process_clauses(clauses, &subject_sources, expr.meta.line)
            }
            ExprKind::Cond { clauses } => {
                let mut sources = Vec::new();
                let mut scopes = Vec::new();
                for clause in clauses {
                    let scope = self.enter_scope(ScopeKind::CaseClause);
                    self.process(&clause.condition)?;
                    sources.extend(self.process(&clause.body)?);
                    self.leave_scope(scope.clone());
                    scopes.push(scope);
                }
                self.merge_branches(&scopes, false, expr.meta.line);
                Ok(sources)
            }
            ExprKind::With {
                bindings,
                body,
                else_clauses,
            } => {
                for binding in bindings {
                    let mark = self.read_log.len();
                    let sources = self.process(&binding.expr)?;
                    let dep_names = self.collect_deps(mark);
                    self.bind_pattern(
                        &binding.pattern,
                        &sources,
                        binding.meta.line,
                        binding.meta.node_id.clone(),
                        false,
                    );
                    let scope = self.current_scope();
                    for name in binding.pattern.bound_names() {
                        let deps: BTreeSet<String> =
                            dep_names.iter().filter(|d| **d != name).cloned().collect();
                        self.scope_deps
                            .entry(scope.clone())
                            .or_default()
                            .push((name, deps));
                    }
                }
                let mut sources = self.process(body)?;
                sources.extend(self.process_clauses(else_clauses, &[], expr.meta.line)?);
                Ok(sources)
            }
            ExprKind::Try {
                body,
                rescue_clauses,
                catch_clauses,
                after_block,
            } => {
                let mut sources = self.process(body)?;
                for clause in rescue_clauses {
                    let scope = self.enter_scope(ScopeKind::Rescue);
                    self.bind_pattern(
                        &clause.pattern,
                        &[],
                        clause.meta.line,
                        clause.meta.node_id.clone(),
                        false,
                    );
                    if let Some(guard) = &clause.guard {
                        self.process(guard)?;
                    }
                    sources.extend(self.process(&clause.body)?);
                    self.leave_scope(scope);
                }
                for clause in catch_clauses {
                    let scope = self.enter_scope(ScopeKind::Catch);
                    self.bind_pattern(
                        &clause.pattern,
                        &[],
                        clause.meta.line,
                        clause.meta.node_id.clone(),
                        false,
                    );
                    if let Some(guard) = &clause.guard {
                        self.process(guard)?;
                    }
                    sources.extend(self.process(&clause.body)?);
                    self.leave_scope(scope);
                }
                if let Some(after) = after_block {
                    self.process(after)?;
                }
                Ok(sources)
            }
            ExprKind::For {
                generators,
                filters,
                body,
            } => {
                let mut generator_sources = Vec::new();
                for generator in generators {
                    generator_sources.push(self.process(&generator.source)?);
                }
                let scope = self.enter_scope(ScopeKind::Comprehension);
                for (generator, sources) in generators.iter().zip(&generator_sources) {
                    self.bind_pattern(
                        &generator.pattern,
                        sources,
                        generator.meta.line,
                        generator.meta.node_id.clone(),
                        false,
                    );
                }
                for filter in filters {
                    self.process(filter)?;
                }
                let body_sources = self.process(body)?;
                self.leave_scope(scope);

                let node = self.add_node(
                    DfgNodeKind::Expression,
                    expr.preview(),
                    0,
                    expr.meta.line,
                    expr.meta.node_id.clone(),
                );
                for &from in &body_sources {
                    self.edges.push(DfgEdge {
                        from,
                        to: node,
                        kind: DfgEdgeKind::Data,
                        variable: None,
                    });
                }
                Ok(vec![node])
            }
            ExprKind::Receive {
                clauses,
                after_clause,
            } => {
                let mut sources = self.process_clauses(clauses, &[], expr.meta.line)?;
                if let Some(after) = after_clause {
                    self.process(&after.timeout)?;
                    sources.extend(self.process(&after.body)?);
                }
                Ok(sources)
            }
            ExprKind::Fn { clauses } => {
                for clause in clauses {
                    let scope = self.enter_scope(ScopeKind::AnonymousFn);
                    for param in &clause.params {
                        self.bind_pattern(
                            param,
                            &[],
                            clause.meta.line,
                            clause.meta.node_id.clone(),
                            false,
                        );
                    }
                    if let Some(guard) = &clause.guard {
                        self.process(guard)?;
                    }
                    self.process(&clause.body)?;
                    self.leave_scope(scope);
                }
                let node = self.add_node(
                    DfgNodeKind::Expression,
                    expr.preview(),
                    0,
                    expr.meta.line,
                    expr.meta.node_id.clone(),
                );
                Ok(vec![node])
            }
            ExprKind::Call {
                module,
                function,
                args,
            } => {
                let mut arg_sources = Vec::new();
                for arg in args {
                    arg_sources.push(self.process(arg)?);
                }
                let node = self.add_node(
                    DfgNodeKind::Expression,
                    expr.preview(),
                    0,
                    expr.meta.line,
                    expr.meta.node_id.clone(),
                );
                let mut signature = match module {
                    Some(m) => format!("{}.{}(", m, function),
                    None => format!("{}(", function),
                };
                for sources in &arg_sources {
                    for &from in sources {
                        self.edges.push(DfgEdge {
                            from,
                            to: node,
                            kind: DfgEdgeKind::Data,
                            variable: None,
                        });
                        let source = &self.nodes[from.index()];
                        signature.push_str(&format!("{}_v{},", source.variable, source.version));
                    }
                }
                signature.push(')');
                self.call_sites.push((signature, expr.meta.line));
                Ok(vec![node])
            }
            ExprKind::Send { dest, message } => {
                self.process(dest)?;
                self.process(message)
            }
            ExprKind::Spawn { body } => {
                self.process(body)?;
                Ok(Vec::new())
            }
            ExprKind::Raise { args } => {
                for arg in args {
                    self.process(arg)?;
                }
                Ok(Vec::new())
            }
            ExprKind::Throw { value } | ExprKind::ExitCall { value } => {
                self.process(value)?;
                Ok(Vec::new())
            }
            ExprKind::BinaryOp { left, right, .. } => {
                let mut sources = self.process(left)?;
                sources.extend(self.process(right)?);
                let node = self.add_node(
                    DfgNodeKind::Expression,
                    expr.preview(),
                    0,
                    expr.meta.line,
                    expr.meta.node_id.clone(),
                );
                for &from in &sources {
                    self.edges.push(DfgEdge {
                        from,
                        to: node,
                        kind: DfgEdgeKind::Data,
                        variable: None,
                    });
                }
                Ok(vec![node])
            }
            ExprKind::UnaryOp { operand, .. } => {
                let sources = self.process(operand)?;
                let node = self.add_node(
                    DfgNodeKind::Expression,
                    expr.preview(),
                    0,
                    expr.meta.line,
                    expr.meta.node_id.clone(),
                );
                for &from in &sources {
                    self.edges.push(DfgEdge {
                        from,
                        to: node,
                        kind: DfgEdgeKind::Data,
                        variable: None,
                    });
                }
                Ok(vec![node])
            }
            ExprKind::Var(name) => Ok(vec![self.read_var(
                name,
                expr.meta.line,
                expr.meta.node_id.clone(),
            )]),
            ExprKind::Literal(_) | ExprKind::AttributeRef(_) => Ok(Vec::new()),
            ExprKind::TupleLit(items) | ExprKind::ListLit(items) => {
                let mut sources = Vec::new();
                for item in items {
                    sources.extend(self.process(item)?);
                }
                Ok(sources)
            }
            ExprKind::MapLit(entries) => {
                let mut sources = Vec::new();
                for (key, value) in entries {
                    sources.extend(self.process(key)?);
                    sources.extend(self.process(value)?);
                }
                Ok(sources)
            }
            ExprKind::StructLit { fields, .. } => {
                let mut sources = Vec::new();
                for (_, value) in fields {
                    sources.extend(self.process(value)?);
                }
                Ok(sources)
            }
            ExprKind::Access { base, .. } => self.process(base),
        }
    }

    /// case/receive/with-else clause bodies: fresh scope per clause, pattern
    /// bindings from the subject sources, φ across the clause scopes
    fn process_clauses(
        &mut self,
        clauses: &[CaseClause],
        subject_sources: &[DfgNodeId],
        line: u32,
    ) -> DfgResult<Vec<DfgNodeId>> {
        let mut sources = Vec::new();
        let mut scopes = Vec::new();
        for clause in clauses {
            let scope = self.enter_scope(ScopeKind::CaseClause);
            self.bind_pattern(
                &clause.pattern,
                subject_sources,
                clause.meta.line,
                clause.meta.node_id.clone(),
                false,
            );
            if let Some(guard) = &clause.guard {
                self.process(guard)?;
            }
            sources.extend(self.process(&clause.body)?);
            self.leave_scope(scope.clone());
            scopes.push(scope);
        }
        if scopes.len() >= 2 {
            self.merge_branches(&scopes, false, line);
        }
        Ok(sources)
    }

    /// Names read since `mark` that resolved in the current scope (or are
    /// unresolved forward references); parameters and captures are excluded
    fn collect_deps(&self, mark: usize) -> BTreeSet<String> {
        let scope = self.current_scope();
        self.read_log[mark..]
            .iter()
            .filter(|event| {
                !event.via_capture
                    && !event.from_parameter
                    && event
                        .def_scope
                        .as_ref()
                        .map(|s| *s == scope)
                        .unwrap_or(true)
            })
            .map(|event| event.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{FnClause, Literal, Meta};

    fn build(def: &FunctionDef) -> DataFlowGraph {
        build_dfg(def, &DfgBuildOpts::default()).expect("dfg builds")
    }

    #[test]
    fn test_identity_function_single_parameter() {
        let def =
            FunctionDef::simple("f", vec![Pattern::var("x", 1)], None, Expr::var("x", 1), 1);
        let dfg = build(&def);

        let params = dfg.parameters();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "x");
        assert_eq!(params[0].version, 0);
        assert!(dfg.phi_nodes.is_empty());
        assert!(dfg.mutations.is_empty());
        assert!(dfg.unused_variables.is_empty());
    }

    #[test]
    fn test_reassignment_is_mutation_not_cycle() {
        // def k() do x = 1; x = x + 1; x end
        let body = Expr::block(
            vec![
                Expr::assign(Pattern::var("x", 2), Expr::int(1, 2), 2),
                Expr::assign(
                    Pattern::var("x", 3),
                    Expr::binary_op("+", Expr::var("x", 3), Expr::int(1, 3), 3),
                    3,
                ),
                Expr::var("x", 4),
            ],
            1,
        );
        let def = FunctionDef::simple("k", vec![], None, body, 1);
        let dfg = build(&def);

        assert_eq!(dfg.mutations.len(), 1);
        assert_eq!(dfg.mutations[0].variable, "x");
        assert_eq!(dfg.mutations[0].from_version, 0);
        assert_eq!(dfg.mutations[0].to_version, 1);
        assert!(dfg.unused_variables.is_empty());
    }

    #[test]
    fn test_same_scope_cycle_rejected() {
        // def bad() do x = y + 1; y = x + 1; x end
        let body = Expr::block(
            vec![
                Expr::assign(
                    Pattern::var("x", 2),
                    Expr::binary_op("+", Expr::var("y", 2), Expr::int(1, 2), 2),
                    2,
                ),
                Expr::assign(
                    Pattern::var("y", 3),
                    Expr::binary_op("+", Expr::var("x", 3), Expr::int(1, 3), 3),
                    3,
                ),
                Expr::var("x", 4),
            ],
            1,
        );
        let def = FunctionDef::simple("bad", vec![], None, body, 1);
        let err = build_dfg(&def, &DfgBuildOpts::default()).unwrap_err();
        assert!(matches!(err, DfgError::CircularDependency { .. }));
    }

    #[test]
    fn test_phi_at_if_else_join() {
        // if c do x = 1 else x = 2 end; x
        let body = Expr::block(
            vec![
                Expr::new(
                    ExprKind::If {
                        condition: Box::new(Expr::var("c", 2)),
                        then_branch: Box::new(Expr::assign(
                            Pattern::var("x", 3),
                            Expr::int(1, 3),
                            3,
                        )),
                        else_branch: Some(Box::new(Expr::assign(
                            Pattern::var("x", 5),
                            Expr::int(2, 5),
                            5,
                        ))),
                    },
                    2,
                ),
                Expr::var("x", 7),
            ],
            1,
        );
        let def = FunctionDef::simple("m", vec![Pattern::var("c", 1)], None, body, 1);
        let dfg = build(&def);

        assert_eq!(dfg.phi_nodes.len(), 1);
        let phi = &dfg.phi_nodes[0];
        assert_eq!(phi.variable, "x");
        assert_eq!(phi.incoming.len(), 2);
        assert_eq!(phi.target_version, 2);
        // Ordered to match predecessor order: then before else
        assert_eq!(phi.incoming[0].source_version, 0);
        assert_eq!(phi.incoming[1].source_version, 1);
        // The final read resolves to the phi version
        let phi_outputs: Vec<_> = dfg
            .edges
            .iter()
            .filter(|e| e.kind == DfgEdgeKind::PhiOutput)
            .collect();
        assert_eq!(phi_outputs.len(), 1);
    }

    #[test]
    fn test_no_phi_when_versions_agree() {
        // if c do calc() else other() end — nothing rebound
        let body = Expr::new(
            ExprKind::If {
                condition: Box::new(Expr::var("c", 2)),
                then_branch: Box::new(Expr::call(None, "calc", vec![], 3)),
                else_branch: Some(Box::new(Expr::call(None, "other", vec![], 5))),
            },
            2,
        );
        let def = FunctionDef::simple("n", vec![Pattern::var("c", 1)], None, body, 1);
        let dfg = build(&def);
        assert!(dfg.phi_nodes.is_empty());
    }

    #[test]
    fn test_case_clause_pattern_binds_in_clause_scope() {
        // case x do {:ok, value} -> value; _ -> nil end
        let clauses = vec![
            CaseClause {
                pattern: Pattern {
                    kind: PatternKind::Tuple(vec![
                        Pattern::literal(Literal::Atom("ok".to_string()), 3),
                        Pattern::var("value", 3),
                    ]),
                    meta: Meta::new(3, 0),
                },
                guard: None,
                body: Expr::var("value", 3),
                meta: Meta::new(3, 0),
            },
            CaseClause {
                pattern: Pattern::wildcard(4),
                guard: None,
                body: Expr::literal(Literal::Nil, 4),
                meta: Meta::new(4, 0),
            },
        ];
        let body = Expr::new(
            ExprKind::Case {
                subject: Box::new(Expr::var("x", 2)),
                clauses,
            },
            2,
        );
        let def = FunctionDef::simple("c", vec![Pattern::var("x", 1)], None, body, 1);
        let dfg = build(&def);

        let value_versions = dfg.versions_of("value");
        assert_eq!(value_versions.len(), 1);
        assert!(value_versions[0].scope_id.starts_with("case_clause"));
        // Nested position binds through a pattern_bind edge
        assert!(dfg
            .edges
            .iter()
            .any(|e| e.kind == DfgEdgeKind::PatternBind
                && e.variable.as_deref() == Some("value")));
        assert!(dfg.phi_nodes.is_empty());
    }

    #[test]
    fn test_shadowing_recorded() {
        // x bound in function scope, rebound inside a case clause
        let clauses = vec![CaseClause {
            pattern: Pattern::wildcard(3),
            guard: None,
            body: Expr::assign(Pattern::var("x", 3), Expr::int(9, 3), 3),
            meta: Meta::new(3, 0),
        }];
        let body = Expr::block(
            vec![
                Expr::assign(Pattern::var("x", 2), Expr::int(1, 2), 2),
                Expr::new(
                    ExprKind::Case {
                        subject: Box::new(Expr::var("x", 3)),
                        clauses,
                    },
                    3,
                ),
            ],
            1,
        );
        let def = FunctionDef::simple("s", vec![], None, body, 1);
        let dfg = build(&def);

        assert_eq!(dfg.shadows.len(), 1);
        assert_eq!(dfg.shadows[0].variable, "x");
        assert_eq!(dfg.shadows[0].outer_scope, "function");
        assert!(dfg.mutations.is_empty());
    }

    #[test]
    fn test_capture_into_anonymous_fn() {
        // def f(x) do fn -> x end end
        let closure = Expr::new(
            ExprKind::Fn {
                clauses: vec![FnClause {
                    params: vec![],
                    guard: None,
                    body: Expr::var("x", 2),
                    meta: Meta::new(2, 0),
                }],
            },
            2,
        );
        let def = FunctionDef::simple("f", vec![Pattern::var("x", 1)], None, closure, 1);
        let dfg = build(&def);

        assert_eq!(dfg.captures.len(), 1);
        assert_eq!(dfg.captures[0].variable, "x");
        assert_eq!(dfg.captures[0].from_scope, "function");
        assert!(dfg.captures[0].into_scope.starts_with("anonymous_fn"));
        assert!(dfg.versions_of("x")[0].is_captured);
        assert!(dfg
            .edges
            .iter()
            .any(|e| e.kind == DfgEdgeKind::Capture));
        // Captured, so not unused
        assert!(dfg.unused_variables.is_empty());
    }

    #[test]
    fn test_pipe_flow_edge() {
        // x |> transform()
        let body = Expr::new(
            ExprKind::Pipe {
                left: Box::new(Expr::var("x", 2)),
                right: Box::new(Expr::call(None, "transform", vec![], 2)),
            },
            2,
        );
        let def = FunctionDef::simple("p", vec![Pattern::var("x", 1)], None, body, 1);
        let dfg = build(&def);
        assert!(dfg
            .edges
            .iter()
            .any(|e| e.kind == DfgEdgeKind::PipeFlow));
    }

    #[test]
    fn test_capture_cycle_across_scopes_allowed() {
        // Same-scope cycle check must not fire across closure boundaries
        let closure = Expr::new(
            ExprKind::Fn {
                clauses: vec![FnClause {
                    params: vec![],
                    guard: None,
                    body: Expr::assign(
                        Pattern::var("y", 2),
                        Expr::binary_op("+", Expr::var("x", 2), Expr::int(1, 2), 2),
                        2,
                    ),
                    meta: Meta::new(2, 0),
                }],
            },
            2,
        );
        let body = Expr::block(
            vec![
                Expr::assign(Pattern::var("x", 2), Expr::int(1, 2), 2),
                Expr::assign(Pattern::var("f", 3), closure, 3),
                Expr::var("f", 4),
            ],
            1,
        );
        let def = FunctionDef::simple("g", vec![], None, body, 1);
        assert!(build_dfg(&def, &DfgBuildOpts::default()).is_ok());
    }
}
