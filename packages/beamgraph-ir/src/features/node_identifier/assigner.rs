//! Identifier assignment pass
//!
//! Depth-first traversal stamping every structurally significant AST node
//! with a stable identifier before CFG/DFG construction. The traversal
//! threads a path of child indices from the clause root; each node's
//! fragment is `<tag>_L<line>` and its content hash is computed over a
//! canonical serialization that excludes position metadata.
//!
//! Identifier assignment cannot fail: nodes with missing position metadata
//! get a synthesised `unknown_L?` fragment and a warning.

use super::node_id::NodeId;
use crate::shared::models::{
    CaseClause, Expr, ExprKind, FunctionClause, FunctionDef, Literal, Meta, ModuleAst, Pattern,
    PatternKind,
};
use crate::shared::utils::short_hash;
use tracing::warn;

/// Enclosing identity threaded through the traversal
#[derive(Debug, Clone)]
pub struct IdContext {
    pub module: String,
    pub function: String,
    pub arity: u32,
    pub clause_index: u32,
}

/// Assign identifiers to every function in a module.
///
/// Returns the number of synthesised (`unknown_L?`) identifiers.
pub fn assign_module_ids(module: &mut ModuleAst) -> usize {
    let module_name = module.name.clone();
    let mut synthesised = 0;
    for function in &mut module.functions {
        synthesised += assign_function_ids(function, &module_name);
    }
    synthesised
}

/// Assign identifiers to one function definition (all clauses).
pub fn assign_function_ids(function: &mut FunctionDef, module: &str) -> usize {
    let arity = function.arity();
    let name = function.name.clone();
    let mut synthesised = 0;
    for (clause_index, clause) in function.clauses.iter_mut().enumerate() {
        let ctx = IdContext {
            module: module.to_string(),
            function: name.clone(),
            arity,
            clause_index: clause_index as u32,
        };
        synthesised += assign_clause_ids(clause, &ctx);
    }
    synthesised
}

/// Assign identifiers within a single clause.
pub fn assign_clause_ids(clause: &mut FunctionClause, ctx: &IdContext) -> usize {
    let mut assigner = Assigner {
        ctx,
        synthesised: 0,
    };

    let clause_canonical = canonical_clause(clause);
    let clause_line = clause.meta.line;
    assigner.stamp(&mut clause.meta, &[], "clause", clause_line, &clause_canonical);

    if let Some(guard) = clause.guard.as_mut() {
        assigner.visit(guard, &mut vec!["guard".to_string()]);
    }
    assigner.visit(&mut clause.body, &mut vec!["body".to_string()]);
    assigner.synthesised
}

struct Assigner<'a> {
    ctx: &'a IdContext,
    synthesised: usize,
}

impl<'a> Assigner<'a> {
    fn stamp(
        &mut self,
        meta: &mut Meta,
        segments: &[String],
        tag: &str,
        line: u32,
        canonical: &str,
    ) {
        let fragment = if line == 0 {
            self.synthesised += 1;
            warn!(
                module = %self.ctx.module,
                function = %self.ctx.function,
                tag,
                "node missing position metadata, synthesising identifier"
            );
            "unknown_L?".to_string()
        } else {
            format!("{}_L{}", tag, line)
        };

        let mut path = String::new();
        for segment in segments {
            path.push_str(segment);
            path.push('.');
        }
        path.push_str(&fragment);

        let id = NodeId {
            module: self.ctx.module.clone(),
            function: self.ctx.function.clone(),
            arity: self.ctx.arity,
            clause_index: self.ctx.clause_index,
            path,
            hash: short_hash(canonical),
        };
        meta.node_id = Some(id.assemble());
    }

    fn visit(&mut self, expr: &mut Expr, segments: &mut Vec<String>) {
        let canonical = canonical_expr(expr);
        let tag = expr.tag();
        let line = expr.meta.line;
        self.stamp(&mut expr.meta, segments, tag, line, &canonical);

        match &mut expr.kind {
            ExprKind::Block(statements) => {
                for (i, statement) in statements.iter_mut().enumerate() {
                    self.descend(statement, segments, i);
                }
            }
            ExprKind::Assign { value, .. } => {
                self.descend(value, segments, 0);
            }
            ExprKind::Pipe { left, right } => {
                self.descend(left, segments, 0);
                self.descend(right, segments, 1);
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
                self.descend(condition, segments, 0);
                self.descend(then_branch, segments, 1);
                if let Some(other) = else_branch {
                    self.descend(other, segments, 2);
                }
            }
            ExprKind::Case { subject, clauses } => {
                self.descend(subject, segments, 0);
                for (i, clause) in clauses.iter_mut().enumerate() {
                    self.visit_case_clause(clause, segments, i + 1);
                }
            }
            ExprKind::Cond { clauses } => {
                for (i, clause) in clauses.iter_mut().enumerate() {
                    segments.push(i.to_string());
                    let canonical = canonical_expr(&clause.condition);
                    let line = clause.meta.line;
                    self.stamp(&mut clause.meta, segments, "cond_clause", line, &canonical);
                    segments.push("cond".to_string());
                    self.visit_inner(&mut clause.condition, segments);
                    segments.pop();
                    segments.push("body".to_string());
                    self.visit_inner(&mut clause.body, segments);
                    segments.pop();
                    segments.pop();
                }
            }
            ExprKind::With {
                bindings,
                body,
                else_clauses,
            } => {
                for (i, binding) in bindings.iter_mut().enumerate() {
                    segments.push(i.to_string());
                    let canonical = canonical_expr(&binding.expr);
                    let line = binding.meta.line;
                    self.stamp(&mut binding.meta, segments, "with_binding", line, &canonical);
                    segments.push("expr".to_string());
                    self.visit_inner(&mut binding.expr, segments);
                    segments.pop();
                    segments.pop();
                }
                self.descend(body, segments, bindings.len());
                for (i, clause) in else_clauses.iter_mut().enumerate() {
                    self.visit_case_clause(clause, segments, bindings.len() + 1 + i);
                }
            }
            ExprKind::Try {
                body,
                rescue_clauses,
                catch_clauses,
                after_block,
            } => {
                self.descend(body, segments, 0);
                let mut index = 1;
                for clause in rescue_clauses.iter_mut() {
                    self.visit_case_clause(clause, segments, index);
                    index += 1;
                }
                for clause in catch_clauses.iter_mut() {
                    self.visit_case_clause(clause, segments, index);
                    index += 1;
                }
                if let Some(after) = after_block {
                    self.descend(after, segments, index);
                }
            }
            ExprKind::For {
                generators,
                filters,
                body,
            } => {
                let mut index = 0;
                for generator in generators.iter_mut() {
                    segments.push(index.to_string());
                    self.visit_inner(&mut generator.source, segments);
                    segments.pop();
                    index += 1;
                }
                for filter in filters.iter_mut() {
                    self.descend(filter, segments, index);
                    index += 1;
                }
                self.descend(body, segments, index);
            }
            ExprKind::Receive {
                clauses,
                after_clause,
            } => {
                for (i, clause) in clauses.iter_mut().enumerate() {
                    self.visit_case_clause(clause, segments, i);
                }
                if let Some(after) = after_clause {
                    segments.push("after".to_string());
                    self.visit_inner(&mut after.timeout, segments);
                    self.visit_inner(&mut after.body, segments);
                    segments.pop();
                }
            }
            ExprKind::Fn { clauses } => {
                for (i, clause) in clauses.iter_mut().enumerate() {
                    segments.push(i.to_string());
                    if let Some(guard) = clause.guard.as_mut() {
                        segments.push("guard".to_string());
                        self.visit_inner(guard, segments);
                        segments.pop();
                    }
                    segments.push("body".to_string());
                    self.visit_inner(&mut clause.body, segments);
                    segments.pop();
                    segments.pop();
                }
            }
            ExprKind::Call { args, .. } => {
                for (i, arg) in args.iter_mut().enumerate() {
                    // Literal arguments of a call are not structurally
                    // significant on their own
                    if matches!(arg.kind, ExprKind::Literal(_)) {
                        continue;
                    }
                    self.descend(arg, segments, i);
                }
            }
            ExprKind::Send { dest, message } => {
                self.descend(dest, segments, 0);
                self.descend(message, segments, 1);
            }
            ExprKind::Spawn { body } => {
                self.descend(body, segments, 0);
            }
            ExprKind::Raise { args } => {
                for (i, arg) in args.iter_mut().enumerate() {
                    if matches!(arg.kind, ExprKind::Literal(_)) {
                        continue;
                    }
                    self.descend(arg, segments, i);
                }
            }
            ExprKind::Throw { value } | ExprKind::ExitCall { value } => {
                self.descend(value, segments, 0);
            }
            ExprKind::BinaryOp { left, right, .. } => {
                self.descend(left, segments, 0);
                self.descend(right, segments, 1);
            }
            ExprKind::UnaryOp { operand, .. } => {
                self.descend(operand, segments, 0);
            }
            ExprKind::TupleLit(items) | ExprKind::ListLit(items) => {
                for (i, item) in items.iter_mut().enumerate() {
                    self.descend(item, segments, i);
                }
            }
            ExprKind::MapLit(entries) => {
                for (i, (key, value)) in entries.iter_mut().enumerate() {
                    segments.push(i.to_string());
                    self.visit_inner(key, segments);
                    self.visit_inner(value, segments);
                    segments.pop();
                }
            }
            ExprKind::StructLit { fields, .. } => {
                for (i, (_, value)) in fields.iter_mut().enumerate() {
                    self.descend(value, segments, i);
                }
            }
            ExprKind::Access { base, .. } => {
                self.descend(base, segments, 0);
            }
            ExprKind::Var(_) | ExprKind::Literal(_) | ExprKind::AttributeRef(_) => {}
        }
    }

    fn descend(&mut self, child: &mut Expr, segments: &mut Vec<String>, index: usize) {
        segments.push(index.to_string());
        self.visit(child, segments);
        segments.pop();
    }

    /// Visit without pushing an extra index segment (caller managed the path)
    fn visit_inner(&mut self, child: &mut Expr, segments: &mut Vec<String>) {
        self.visit(child, segments);
    }

    fn visit_case_clause(&mut self, clause: &mut CaseClause, segments: &mut Vec<String>, index: usize) {
        segments.push(index.to_string());
        let canonical = format!(
            "(clause {} {})",
            canonical_pattern(&clause.pattern),
            canonical_expr(&clause.body)
        );
        let line = clause.meta.line;
        self.stamp(&mut clause.meta, segments, "clause", line, &canonical);
        if let Some(guard) = clause.guard.as_mut() {
            segments.push("guard".to_string());
            self.visit_inner(guard, segments);
            segments.pop();
        }
        segments.push("body".to_string());
        self.visit_inner(&mut clause.body, segments);
        segments.pop();
        segments.pop();
    }
}

/// Canonical serialization of a clause, positions excluded
fn canonical_clause(clause: &FunctionClause) -> String {
    let params: Vec<String> = clause.params.iter().map(canonical_pattern).collect();
    let guard = clause
        .guard
        .as_ref()
        .map(canonical_expr)
        .unwrap_or_else(|| "-".to_string());
    format!(
        "(clause ({}) {} {})",
        params.join(" "),
        guard,
        canonical_expr(&clause.body)
    )
}

/// Canonical serialization of an expression, positions excluded
fn canonical_expr(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Block(statements) => {
            let inner: Vec<String> = statements.iter().map(canonical_expr).collect();
            format!("(block {})", inner.join(" "))
        }
        ExprKind::Assign { pattern, value } => {
            format!("(= {} {})", canonical_pattern(pattern), canonical_expr(value))
        }
        ExprKind::Pipe { left, right } => {
            format!("(|> {} {})", canonical_expr(left), canonical_expr(right))
        }
        ExprKind::If {
            condition,
            then_branch,
            else_branch,
        } => format!(
            "(if {} {} {})",
            canonical_expr(condition),
            canonical_expr(then_branch),
            else_branch
                .as_ref()
                .map(|e| canonical_expr(e))
                .unwrap_or_else(|| "-".to_string())
        ),
        ExprKind::Unless {
            condition,
            then_branch,
            else_branch,
        } => format!(
            "(unless {} {} {})",
            canonical_expr(condition),
            canonical_expr(then_branch),
            else_branch
                .as_ref()
                .map(|e| canonical_expr(e))
                .unwrap_or_else(|| "-".to_string())
        ),
        ExprKind::Case { subject, clauses } => {
            let inner: Vec<String> = clauses
                .iter()
                .map(|c| {
                    format!(
                        "({} {})",
                        canonical_pattern(&c.pattern),
                        canonical_expr(&c.body)
                    )
                })
                .collect();
            format!("(case {} {})", canonical_expr(subject), inner.join(" "))
        }
        ExprKind::Cond { clauses } => {
            let inner: Vec<String> = clauses
                .iter()
                .map(|c| format!("({} {})", canonical_expr(&c.condition), canonical_expr(&c.body)))
                .collect();
            format!("(cond {})", inner.join(" "))
        }
        ExprKind::With {
            bindings,
            body,
            else_clauses,
        } => {
            let binds: Vec<String> = bindings
                .iter()
                .map(|b| format!("({} {})", canonical_pattern(&b.pattern), canonical_expr(&b.expr)))
                .collect();
            let elses: Vec<String> = else_clauses
                .iter()
                .map(|c| canonical_expr(&c.body))
                .collect();
            format!(
                "(with ({}) {} ({}))",
                binds.join(" "),
                canonical_expr(body),
                elses.join(" ")
            )
        }
        ExprKind::Try {
            body,
            rescue_clauses,
            catch_clauses,
            after_block,
        } => format!(
            "(try {} r{} c{} {})",
            canonical_expr(body),
            rescue_clauses.len(),
            catch_clauses.len(),
            after_block
                .as_ref()
                .map(|e| canonical_expr(e))
                .unwrap_or_else(|| "-".to_string())
        ),
        ExprKind::For {
            generators,
            filters,
            body,
        } => {
            let gens: Vec<String> = generators
                .iter()
                .map(|g| format!("({} {})", canonical_pattern(&g.pattern), canonical_expr(&g.source)))
                .collect();
            let filts: Vec<String> = filters.iter().map(canonical_expr).collect();
            format!(
                "(for ({}) ({}) {})",
                gens.join(" "),
                filts.join(" "),
                canonical_expr(body)
            )
        }
        ExprKind::Receive {
            clauses,
            after_clause,
        } => {
            let inner: Vec<String> = clauses
                .iter()
                .map(|c| {
                    format!(
                        "({} {})",
                        canonical_pattern(&c.pattern),
                        canonical_expr(&c.body)
                    )
                })
                .collect();
            format!(
                "(receive {} {})",
                inner.join(" "),
                after_clause
                    .as_ref()
                    .map(|a| canonical_expr(&a.body))
                    .unwrap_or_else(|| "-".to_string())
            )
        }
        ExprKind::Fn { clauses } => {
            let inner: Vec<String> = clauses
                .iter()
                .map(|c| {
                    let params: Vec<String> = c.params.iter().map(canonical_pattern).collect();
                    format!("(({}) {})", params.join(" "), canonical_expr(&c.body))
                })
                .collect();
            format!("(fn {})", inner.join(" "))
        }
        ExprKind::Call {
            module,
            function,
            args,
        } => {
            let inner: Vec<String> = args.iter().map(canonical_expr).collect();
            match module {
                Some(m) => format!("(call {}.{} {})", m, function, inner.join(" ")),
                None => format!("(call {} {})", function, inner.join(" ")),
            }
        }
        ExprKind::Send { dest, message } => {
            format!("(send {} {})", canonical_expr(dest), canonical_expr(message))
        }
        ExprKind::Spawn { body } => format!("(spawn {})", canonical_expr(body)),
        ExprKind::Raise { args } => {
            let inner: Vec<String> = args.iter().map(canonical_expr).collect();
            format!("(raise {})", inner.join(" "))
        }
        ExprKind::Throw { value } => format!("(throw {})", canonical_expr(value)),
        ExprKind::ExitCall { value } => format!("(exit {})", canonical_expr(value)),
        ExprKind::BinaryOp { op, left, right } => {
            format!("({} {} {})", op, canonical_expr(left), canonical_expr(right))
        }
        ExprKind::UnaryOp { op, operand } => format!("({} {})", op, canonical_expr(operand)),
        ExprKind::Var(name) => format!("(var {})", name),
        ExprKind::Literal(lit) => format!("(lit {})", canonical_literal(lit)),
        ExprKind::TupleLit(items) => {
            let inner: Vec<String> = items.iter().map(canonical_expr).collect();
            format!("(tuple {})", inner.join(" "))
        }
        ExprKind::ListLit(items) => {
            let inner: Vec<String> = items.iter().map(canonical_expr).collect();
            format!("(list {})", inner.join(" "))
        }
        ExprKind::MapLit(entries) => {
            let inner: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("({} {})", canonical_expr(k), canonical_expr(v)))
                .collect();
            format!("(map {})", inner.join(" "))
        }
        ExprKind::StructLit { name, fields } => {
            let inner: Vec<String> = fields
                .iter()
                .map(|(k, v)| format!("({} {})", k, canonical_expr(v)))
                .collect();
            format!("(struct {} {})", name, inner.join(" "))
        }
        ExprKind::Access { base, key } => format!("(access {} {})", canonical_expr(base), key),
        ExprKind::AttributeRef(name) => format!("(attr {})", name),
    }
}

fn canonical_pattern(pattern: &Pattern) -> String {
    match &pattern.kind {
        PatternKind::Var(name) => format!("(pvar {})", name),
        PatternKind::Wildcard => "_".to_string(),
        PatternKind::Literal(lit) => format!("(plit {})", canonical_literal(lit)),
        PatternKind::Pin(name) => format!("(pin {})", name),
        PatternKind::Tuple(elements) => {
            let inner: Vec<String> = elements.iter().map(canonical_pattern).collect();
            format!("(ptuple {})", inner.join(" "))
        }
        PatternKind::List { elements, tail } => {
            let mut inner: Vec<String> = elements.iter().map(canonical_pattern).collect();
            if let Some(t) = tail {
                inner.push(format!("(tail {})", canonical_pattern(t)));
            }
            format!("(plist {})", inner.join(" "))
        }
        PatternKind::Map(entries) => {
            let inner: Vec<String> = entries
                .iter()
                .map(|(k, p)| format!("({} {})", canonical_literal(k), canonical_pattern(p)))
                .collect();
            format!("(pmap {})", inner.join(" "))
        }
        PatternKind::Keyword(entries) => {
            let inner: Vec<String> = entries
                .iter()
                .map(|(k, p)| format!("({} {})", k, canonical_pattern(p)))
                .collect();
            format!("(pkw {})", inner.join(" "))
        }
        PatternKind::Struct { name, fields } => {
            let inner: Vec<String> = fields
                .iter()
                .map(|(k, p)| format!("({} {})", k, canonical_pattern(p)))
                .collect();
            format!("(pstruct {} {})", name, inner.join(" "))
        }
    }
}

fn canonical_literal(lit: &Literal) -> String {
    lit.to_string()
}
