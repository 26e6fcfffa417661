//! Shared fixtures for the integration suites
#![allow(dead_code)] // Each suite uses its own subset

use beamgraph_ir::shared::models::{
    CaseClause, Expr, ExprKind, FunctionDef, Literal, Meta, ModuleAst, Pattern,
};
use beamgraph_ir::shared::ports::{ParseError, SourceParser};

/// `def f(x) do x end`
pub fn identity_fn() -> FunctionDef {
    FunctionDef::simple("f", vec![Pattern::var("x", 1)], None, Expr::var("x", 1), 1)
}

/// `def g(x) do if x > 0 do :pos else :neg end end`
pub fn if_else_fn() -> FunctionDef {
    let body = Expr::new(
        ExprKind::If {
            condition: Box::new(Expr::binary_op(">", Expr::var("x", 2), Expr::int(0, 2), 2)),
            then_branch: Box::new(Expr::atom("pos", 3)),
            else_branch: Some(Box::new(Expr::atom("neg", 5))),
        },
        2,
    );
    FunctionDef::simple("g", vec![Pattern::var("x", 1)], None, body, 1)
}

/// `def h(x) do case x do 1 -> :one; 2 -> :two; _ -> :other end end`
pub fn case3_fn() -> FunctionDef {
    let clause = |pattern: Pattern, atom: &str, line: u32| CaseClause {
        pattern,
        guard: None,
        body: Expr::atom(atom, line),
        meta: Meta::new(line, 0),
    };
    let body = Expr::new(
        ExprKind::Case {
            subject: Box::new(Expr::var("x", 2)),
            clauses: vec![
                clause(Pattern::literal(Literal::Int(1), 3), "one", 3),
                clause(Pattern::literal(Literal::Int(2), 4), "two", 4),
                clause(Pattern::wildcard(5), "other", 5),
            ],
        },
        2,
    );
    FunctionDef::simple("h", vec![Pattern::var("x", 1)], None, body, 1)
}

/// `def k() do x = 1; x = x + 1; x end`
pub fn reassign_fn() -> FunctionDef {
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
    FunctionDef::simple("k", vec![], None, body, 1)
}

/// `def bad() do x = y + 1; y = x + 1; x end`
pub fn cycle_fn() -> FunctionDef {
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
    FunctionDef::simple("bad", vec![], None, body, 1)
}

/// A function whose cyclomatic complexity is `target` (chain of
/// conditionals)
pub fn complexity_fn(name: &str, target: u32) -> FunctionDef {
    let mut body = Expr::var("x", 20);
    for i in 1..target {
        body = Expr::new(
            ExprKind::If {
                condition: Box::new(Expr::var("x", i + 1)),
                then_branch: Box::new(Expr::atom("t", i + 1)),
                else_branch: Some(Box::new(body)),
            },
            i + 1,
        );
    }
    FunctionDef::simple(name, vec![Pattern::var("x", 1)], None, body, 1)
}

/// Test parser bridge: the first line `# module: NAME` names the module;
/// the parsed module carries one function `go/1` that calls `Other.ping/1`.
pub struct HeaderParser;

impl SourceParser for HeaderParser {
    fn parse(&self, file_path: &str, source: &str) -> Result<ModuleAst, ParseError> {
        let module = source
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("# module: "))
            .ok_or_else(|| ParseError::new(file_path, "missing module header"))?;
        let body = Expr::call(Some("Other"), "ping", vec![Expr::var("x", 2)], 2);
        let def = FunctionDef::simple("go", vec![Pattern::var("x", 1)], None, body, 1);
        Ok(ModuleAst::new(module.trim(), vec![def]))
    }
}

/// Collect every assigned node identifier in a function definition
pub fn collect_node_ids(def: &FunctionDef) -> Vec<String> {
    let mut ids = Vec::new();
    for clause in &def.clauses {
        if let Some(id) = &clause.meta.node_id {
            ids.push(id.clone());
        }
        if let Some(guard) = &clause.guard {
            collect_expr_ids(guard, &mut ids);
        }
        collect_expr_ids(&clause.body, &mut ids);
    }
    ids
}

fn collect_expr_ids(expr: &Expr, ids: &mut Vec<String>) {
    if let Some(id) = &expr.meta.node_id {
        ids.push(id.clone());
    }
    match &expr.kind {
        ExprKind::Block(statements) => {
            for statement in statements {
                collect_expr_ids(statement, ids);
            }
        }
        ExprKind::Assign { value, .. } => collect_expr_ids(value, ids),
        ExprKind::Pipe { left, right } => {
            collect_expr_ids(left, ids);
            collect_expr_ids(right, ids);
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
            collect_expr_ids(condition, ids);
            collect_expr_ids(then_branch, ids);
            if let Some(other) = else_branch {
                collect_expr_ids(other, ids);
            }
        }
        ExprKind::Case { subject, clauses } => {
            collect_expr_ids(subject, ids);
            for clause in clauses {
                if let Some(id) = &clause.meta.node_id {
                    ids.push(id.clone());
                }
                if let Some(guard) = &clause.guard {
                    collect_expr_ids(guard, ids);
                }
                collect_expr_ids(&clause.body, ids);
            }
        }
        ExprKind::Call { args, .. } => {
            for arg in args {
                collect_expr_ids(arg, ids);
            }
        }
        ExprKind::BinaryOp { left, right, .. } => {
            collect_expr_ids(left, ids);
            collect_expr_ids(right, ids);
        }
        ExprKind::UnaryOp { operand, .. } => collect_expr_ids(operand, ids),
        ExprKind::TupleLit(items) | ExprKind::ListLit(items) => {
            for item in items {
                collect_expr_ids(item, ids);
            }
        }
        _ => {}
    }
}
