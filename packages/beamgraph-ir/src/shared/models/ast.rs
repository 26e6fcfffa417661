//! Language-neutral AST for an expression-oriented functional language
//!
//! Parser bridges lower their native syntax trees into this tagged-union
//! shape; the analysis core never sees a source language's own encoding.
//! Every node carries `Meta` with position info and the slot for the stable
//! node identifier stamped before graph construction.

use serde::{Deserialize, Serialize};

/// Node metadata: position plus the assigned identifier (if any)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub line: u32,
    pub column: u32,
    /// Stable node identifier, stamped by the identifier pass
    pub node_id: Option<String>,
}

impl Meta {
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            line,
            column,
            node_id: None,
        }
    }
}

impl Default for Meta {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Atom(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Nil,
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Atom(a) => write!(f, ":{}", a),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Str(s) => write!(f, "\"{}\"", s),
            Literal::Nil => write!(f, "nil"),
        }
    }
}

/// Key used by access expressions (map key or positional index)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AccessKey {
    Key(String),
    Index(usize),
}

impl std::fmt::Display for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessKey::Key(k) => write!(f, "{}", k),
            AccessKey::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Match patterns (function heads, case clauses, assignments, generators)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternKind {
    /// Binds a fresh name
    Var(String),
    /// `_` — matches anything, binds nothing
    Wildcard,
    Literal(Literal),
    /// `^x` — matches against an existing binding (a read, not a bind)
    Pin(String),
    Tuple(Vec<Pattern>),
    List {
        elements: Vec<Pattern>,
        tail: Option<Box<Pattern>>,
    },
    Map(Vec<(Literal, Pattern)>),
    Keyword(Vec<(String, Pattern)>),
    Struct {
        name: String,
        fields: Vec<(String, Pattern)>,
    },
}

impl Pattern {
    pub fn var(name: impl Into<String>, line: u32) -> Self {
        Self {
            kind: PatternKind::Var(name.into()),
            meta: Meta::new(line, 0),
        }
    }

    pub fn wildcard(line: u32) -> Self {
        Self {
            kind: PatternKind::Wildcard,
            meta: Meta::new(line, 0),
        }
    }

    pub fn literal(value: Literal, line: u32) -> Self {
        Self {
            kind: PatternKind::Literal(value),
            meta: Meta::new(line, 0),
        }
    }

    /// Names bound by this pattern, in source order.
    ///
    /// Pins and wildcards bind nothing.
    pub fn bound_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_bound(&mut names);
        names
    }

    fn collect_bound(&self, out: &mut Vec<String>) {
        match &self.kind {
            PatternKind::Var(name) => out.push(name.clone()),
            PatternKind::Wildcard | PatternKind::Literal(_) | PatternKind::Pin(_) => {}
            PatternKind::Tuple(elements) => {
                for p in elements {
                    p.collect_bound(out);
                }
            }
            PatternKind::List { elements, tail } => {
                for p in elements {
                    p.collect_bound(out);
                }
                if let Some(t) = tail {
                    t.collect_bound(out);
                }
            }
            PatternKind::Map(entries) => {
                for (_, p) in entries {
                    p.collect_bound(out);
                }
            }
            PatternKind::Keyword(entries) => {
                for (_, p) in entries {
                    p.collect_bound(out);
                }
            }
            PatternKind::Struct { fields, .. } => {
                for (_, p) in fields {
                    p.collect_bound(out);
                }
            }
        }
    }

    /// Names read by this pattern (pinned variables)
    pub fn pinned_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_pinned(&mut names);
        names
    }

    fn collect_pinned(&self, out: &mut Vec<String>) {
        match &self.kind {
            PatternKind::Pin(name) => out.push(name.clone()),
            PatternKind::Var(_) | PatternKind::Wildcard | PatternKind::Literal(_) => {}
            PatternKind::Tuple(elements) => {
                for p in elements {
                    p.collect_pinned(out);
                }
            }
            PatternKind::List { elements, tail } => {
                for p in elements {
                    p.collect_pinned(out);
                }
                if let Some(t) = tail {
                    t.collect_pinned(out);
                }
            }
            PatternKind::Map(entries) => {
                for (_, p) in entries {
                    p.collect_pinned(out);
                }
            }
            PatternKind::Keyword(entries) => {
                for (_, p) in entries {
                    p.collect_pinned(out);
                }
            }
            PatternKind::Struct { fields, .. } => {
                for (_, p) in fields {
                    p.collect_pinned(out);
                }
            }
        }
    }

    /// Compact source-like rendering (used as edge conditions)
    pub fn render(&self) -> String {
        match &self.kind {
            PatternKind::Var(name) => name.clone(),
            PatternKind::Wildcard => "_".to_string(),
            PatternKind::Literal(lit) => lit.to_string(),
            PatternKind::Pin(name) => format!("^{}", name),
            PatternKind::Tuple(elements) => {
                let inner: Vec<String> = elements.iter().map(|p| p.render()).collect();
                format!("{{{}}}", inner.join(", "))
            }
            PatternKind::List { elements, tail } => {
                let mut inner: Vec<String> = elements.iter().map(|p| p.render()).collect();
                if let Some(t) = tail {
                    inner.push(format!("| {}", t.render()));
                }
                format!("[{}]", inner.join(", "))
            }
            PatternKind::Map(entries) => {
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, p)| format!("{} => {}", k, p.render()))
                    .collect();
                format!("%{{{}}}", inner.join(", "))
            }
            PatternKind::Keyword(entries) => {
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, p)| format!("{}: {}", k, p.render()))
                    .collect();
                format!("[{}]", inner.join(", "))
            }
            PatternKind::Struct { name, fields } => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|(k, p)| format!("{}: {}", k, p.render()))
                    .collect();
                format!("%{}{{{}}}", name, inner.join(", "))
            }
        }
    }
}

/// One clause of a `case`, `receive`, `rescue` or `catch` construct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseClause {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Expr,
    pub meta: Meta,
}

/// One clause of a `cond` construct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondClause {
    pub condition: Expr,
    pub body: Expr,
    pub meta: Meta,
}

/// One `pattern <- expr` binding of a `with` construct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithBinding {
    pub pattern: Pattern,
    pub expr: Expr,
    pub meta: Meta,
}

/// One `pattern <- source` generator of a comprehension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub pattern: Pattern,
    pub source: Expr,
    pub meta: Meta,
}

/// `after timeout -> body` arm of a `receive`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveAfter {
    pub timeout: Expr,
    pub body: Expr,
    pub meta: Meta,
}

/// One clause of an anonymous function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnClause {
    pub params: Vec<Pattern>,
    pub guard: Option<Expr>,
    pub body: Expr,
    pub meta: Meta,
}

/// Expression node: tagged kind plus position metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Sequence of statements
    Block(Vec<Expr>),
    /// `pattern = value`
    Assign {
        pattern: Pattern,
        value: Box<Expr>,
    },
    /// `left |> right`
    Pipe {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    /// `unless` — rewritten to a negated `if` during CFG construction
    Unless {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    Case {
        subject: Box<Expr>,
        clauses: Vec<CaseClause>,
    },
    Cond {
        clauses: Vec<CondClause>,
    },
    With {
        bindings: Vec<WithBinding>,
        body: Box<Expr>,
        else_clauses: Vec<CaseClause>,
    },
    Try {
        body: Box<Expr>,
        rescue_clauses: Vec<CaseClause>,
        catch_clauses: Vec<CaseClause>,
        after_block: Option<Box<Expr>>,
    },
    /// Comprehension over one or more generators with optional filters
    For {
        generators: Vec<Generator>,
        filters: Vec<Expr>,
        body: Box<Expr>,
    },
    Receive {
        clauses: Vec<CaseClause>,
        after_clause: Option<Box<ReceiveAfter>>,
    },
    /// Anonymous function
    Fn {
        clauses: Vec<FnClause>,
    },
    /// Local or remote call
    Call {
        module: Option<String>,
        function: String,
        args: Vec<Expr>,
    },
    Send {
        dest: Box<Expr>,
        message: Box<Expr>,
    },
    Spawn {
        body: Box<Expr>,
    },
    Raise {
        args: Vec<Expr>,
    },
    Throw {
        value: Box<Expr>,
    },
    ExitCall {
        value: Box<Expr>,
    },
    BinaryOp {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: String,
        operand: Box<Expr>,
    },
    Var(String),
    Literal(Literal),
    TupleLit(Vec<Expr>),
    ListLit(Vec<Expr>),
    MapLit(Vec<(Expr, Expr)>),
    StructLit {
        name: String,
        fields: Vec<(String, Expr)>,
    },
    /// `base[key]` / positional access
    Access {
        base: Box<Expr>,
        key: AccessKey,
    },
    /// `@attribute`
    AttributeRef(String),
}

impl Expr {
    pub fn new(kind: ExprKind, line: u32) -> Self {
        Self {
            kind,
            meta: Meta::new(line, 0),
        }
    }

    pub fn var(name: impl Into<String>, line: u32) -> Self {
        Self::new(ExprKind::Var(name.into()), line)
    }

    pub fn literal(value: Literal, line: u32) -> Self {
        Self::new(ExprKind::Literal(value), line)
    }

    pub fn atom(name: impl Into<String>, line: u32) -> Self {
        Self::literal(Literal::Atom(name.into()), line)
    }

    pub fn int(value: i64, line: u32) -> Self {
        Self::literal(Literal::Int(value), line)
    }

    pub fn block(statements: Vec<Expr>, line: u32) -> Self {
        Self::new(ExprKind::Block(statements), line)
    }

    pub fn assign(pattern: Pattern, value: Expr, line: u32) -> Self {
        Self::new(
            ExprKind::Assign {
                pattern,
                value: Box::new(value),
            },
            line,
        )
    }

    pub fn call(module: Option<&str>, function: impl Into<String>, args: Vec<Expr>, line: u32) -> Self {
        Self::new(
            ExprKind::Call {
                module: module.map(|m| m.to_string()),
                function: function.into(),
                args,
            },
            line,
        )
    }

    pub fn binary_op(op: impl Into<String>, left: Expr, right: Expr, line: u32) -> Self {
        Self::new(
            ExprKind::BinaryOp {
                op: op.into(),
                left: Box::new(left),
                right: Box::new(right),
            },
            line,
        )
    }

    pub fn line(&self) -> u32 {
        self.meta.line
    }

    /// AST tag used in identifier path fragments and index keys
    pub fn tag(&self) -> &'static str {
        match &self.kind {
            ExprKind::Block(_) => "block",
            ExprKind::Assign { .. } => "assign",
            ExprKind::Pipe { .. } => "pipe",
            ExprKind::If { .. } => "if",
            ExprKind::Unless { .. } => "unless",
            ExprKind::Case { .. } => "case",
            ExprKind::Cond { .. } => "cond",
            ExprKind::With { .. } => "with",
            ExprKind::Try { .. } => "try",
            ExprKind::For { .. } => "for",
            ExprKind::Receive { .. } => "receive",
            ExprKind::Fn { .. } => "fn",
            ExprKind::Call { .. } => "call",
            ExprKind::Send { .. } => "send",
            ExprKind::Spawn { .. } => "spawn",
            ExprKind::Raise { .. } => "raise",
            ExprKind::Throw { .. } => "throw",
            ExprKind::ExitCall { .. } => "exit",
            ExprKind::BinaryOp { .. } => "binary_op",
            ExprKind::UnaryOp { .. } => "unary_op",
            ExprKind::Var(_) => "var",
            ExprKind::Literal(_) => "literal",
            ExprKind::TupleLit(_) => "tuple",
            ExprKind::ListLit(_) => "list",
            ExprKind::MapLit(_) => "map",
            ExprKind::StructLit { .. } => "struct",
            ExprKind::Access { .. } => "access",
            ExprKind::AttributeRef(_) => "attribute",
        }
    }

    /// Compact source-like rendering, truncated for node labels
    pub fn preview(&self) -> String {
        let full = self.render();
        if full.chars().count() > 60 {
            let mut truncated: String = full.chars().take(59).collect();
            truncated.push('…');
            truncated
        } else {
            full
        }
    }

    fn render(&self) -> String {
        match &self.kind {
            ExprKind::Block(stmts) => format!("block/{}", stmts.len()),
            ExprKind::Assign { pattern, value } => {
                format!("{} = {}", pattern.render(), value.render())
            }
            ExprKind::Pipe { left, right } => format!("{} |> {}", left.render(), right.render()),
            ExprKind::If { condition, .. } => format!("if {}", condition.render()),
            ExprKind::Unless { condition, .. } => format!("unless {}", condition.render()),
            ExprKind::Case { subject, clauses } => {
                format!("case {} ({} clauses)", subject.render(), clauses.len())
            }
            ExprKind::Cond { clauses } => format!("cond ({} clauses)", clauses.len()),
            ExprKind::With { bindings, .. } => format!("with ({} bindings)", bindings.len()),
            ExprKind::Try { .. } => "try".to_string(),
            ExprKind::For { generators, filters, .. } => {
                format!("for ({} generators, {} filters)", generators.len(), filters.len())
            }
            ExprKind::Receive { clauses, .. } => format!("receive ({} clauses)", clauses.len()),
            ExprKind::Fn { clauses } => format!("fn/{}", clauses.len()),
            ExprKind::Call {
                module,
                function,
                args,
            } => match module {
                Some(m) => format!("{}.{}/{}", m, function, args.len()),
                None => format!("{}/{}", function, args.len()),
            },
            ExprKind::Send { dest, .. } => format!("send {}", dest.render()),
            ExprKind::Spawn { .. } => "spawn".to_string(),
            ExprKind::Raise { .. } => "raise".to_string(),
            ExprKind::Throw { .. } => "throw".to_string(),
            ExprKind::ExitCall { .. } => "exit".to_string(),
            ExprKind::BinaryOp { op, left, right } => {
                format!("{} {} {}", left.render(), op, right.render())
            }
            ExprKind::UnaryOp { op, operand } => format!("{}{}", op, operand.render()),
            ExprKind::Var(name) => name.clone(),
            ExprKind::Literal(lit) => lit.to_string(),
            ExprKind::TupleLit(items) => format!("tuple/{}", items.len()),
            ExprKind::ListLit(items) => format!("list/{}", items.len()),
            ExprKind::MapLit(entries) => format!("map/{}", entries.len()),
            ExprKind::StructLit { name, .. } => format!("%{}{{}}", name),
            ExprKind::Access { base, key } => format!("{}[{}]", base.render(), key),
            ExprKind::AttributeRef(name) => format!("@{}", name),
        }
    }
}

/// One clause of a named function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionClause {
    pub params: Vec<Pattern>,
    pub guard: Option<Expr>,
    pub body: Expr,
    pub meta: Meta,
}

/// Named function definition (one or more clauses, all same arity)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub clauses: Vec<FunctionClause>,
    /// Private functions are excluded from module exports
    pub private: bool,
    pub meta: Meta,
}

impl FunctionDef {
    /// Single-clause convenience constructor
    pub fn simple(
        name: impl Into<String>,
        params: Vec<Pattern>,
        guard: Option<Expr>,
        body: Expr,
        line: u32,
    ) -> Self {
        Self {
            name: name.into(),
            clauses: vec![FunctionClause {
                params,
                guard,
                body,
                meta: Meta::new(line, 0),
            }],
            private: false,
            meta: Meta::new(line, 0),
        }
    }

    pub fn arity(&self) -> u32 {
        self.clauses
            .first()
            .map(|c| c.params.len() as u32)
            .unwrap_or(0)
    }
}

/// Parsed module: attributes plus function definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleAst {
    pub name: String,
    pub attributes: Vec<(String, Literal)>,
    pub functions: Vec<FunctionDef>,
    pub meta: Meta,
}

impl ModuleAst {
    pub fn new(name: impl Into<String>, functions: Vec<FunctionDef>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            functions,
            meta: Meta::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_names_nested() {
        let pattern = Pattern {
            kind: PatternKind::Tuple(vec![
                Pattern::var("a", 1),
                Pattern {
                    kind: PatternKind::List {
                        elements: vec![Pattern::var("b", 1), Pattern::wildcard(1)],
                        tail: Some(Box::new(Pattern::var("rest", 1))),
                    },
                    meta: Meta::new(1, 0),
                },
            ]),
            meta: Meta::new(1, 0),
        };

        assert_eq!(pattern.bound_names(), vec!["a", "b", "rest"]);
    }

    #[test]
    fn test_pin_is_read_not_bind() {
        let pattern = Pattern {
            kind: PatternKind::Tuple(vec![
                Pattern::var("x", 1),
                Pattern {
                    kind: PatternKind::Pin("y".to_string()),
                    meta: Meta::new(1, 0),
                },
            ]),
            meta: Meta::new(1, 0),
        };

        assert_eq!(pattern.bound_names(), vec!["x"]);
        assert_eq!(pattern.pinned_names(), vec!["y"]);
    }

    #[test]
    fn test_arity_from_first_clause() {
        let def = FunctionDef::simple(
            "add",
            vec![Pattern::var("a", 1), Pattern::var("b", 1)],
            None,
            Expr::var("a", 2),
            1,
        );
        assert_eq!(def.arity(), 2);
    }

    #[test]
    fn test_preview_truncation() {
        let long_name = "x".repeat(100);
        let expr = Expr::var(long_name, 1);
        assert!(expr.preview().len() <= 63);
        assert!(expr.preview().ends_with('…'));
    }

    #[test]
    fn test_call_render() {
        let expr = Expr::call(Some("Enum"), "map", vec![Expr::var("xs", 1)], 1);
        assert_eq!(expr.preview(), "Enum.map/1");
    }
}
