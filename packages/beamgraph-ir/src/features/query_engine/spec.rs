//! Declarative query values
//!
//! Queries are inert data: a serde-deserialisable shape validated before
//! execution. The fluent builder produces these values; external callers
//! can also submit the JSON-equivalent form directly.

use super::errors::{QueryError, QueryResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Query source table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryFrom {
    Functions,
    Modules,
    CpgNodes,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Contains,
    StartsWith,
    EndsWith,
    MatchesRegex,
}

/// One `where` predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: QueryOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub dir: OrderDir,
}

/// Projection: everything, or a named field list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    All(AllMarker),
    Fields(Vec<String>),
}

/// The literal `["all"]` / `"all"` marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllMarker {
    All,
}

impl Default for Selection {
    fn default() -> Self {
        Selection::All(AllMarker::All)
    }
}

impl Selection {
    pub fn is_all(&self) -> bool {
        match self {
            Selection::All(_) => true,
            // `["all"]` and `"all"` are equivalent in the wire shape
            Selection::Fields(fields) => fields.len() == 1 && fields[0] == "all",
        }
    }
}

/// Sub-graph pattern node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternNode {
    pub label_prefix: Option<String>,
    pub kind: Option<String>,
    pub properties: HashMap<String, Value>,
}

/// Sub-graph pattern edge between node indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternEdge {
    pub kind: Option<String>,
    pub from_index: usize,
    pub to_index: usize,
}

/// Small sub-graph to match against a CPG
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpgPattern {
    pub nodes: Vec<PatternNode>,
    pub edges: Vec<PatternEdge>,
}

/// The inert query value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub from: QueryFrom,
    pub select: Selection,
    #[serde(rename = "where")]
    pub conditions: Vec<Condition>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Reserved in the wire shape; correlated queries use the dedicated API
    pub joins: Vec<Value>,
    pub cpg_pattern: Option<CpgPattern>,
    pub query_hint: Option<String>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            from: QueryFrom::Functions,
            select: Selection::default(),
            conditions: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            joins: Vec::new(),
            cpg_pattern: None,
            query_hint: None,
        }
    }
}

/// Fields that predicates and ordering may reference, per source
pub fn known_fields(from: QueryFrom) -> &'static [&'static str] {
    match from {
        QueryFrom::Functions => &[
            "module",
            "name",
            "arity",
            "function_key",
            "calls",
            "file_path",
            "complexity.cyclomatic",
            "complexity.cognitive",
            "complexity.decision_points",
            "complexity.nesting_depth",
            "complexity.lines_of_code",
            "unused_variable_count",
            "phi_count",
        ],
        QueryFrom::Modules => &[
            "module_name",
            "file_path",
            "file_hash",
            "function_count",
            "dependencies",
        ],
        QueryFrom::CpgNodes => &["kind", "line", "scope_id", "variable"],
    }
}

impl Query {
    /// Parse and validate a JSON-equivalent query spec.
    pub fn from_json(raw: &Value) -> QueryResult<Query> {
        let query: Query = serde_json::from_value(raw.clone())
            .map_err(|e| QueryError::invalid(e.to_string()))?;
        query.validate()?;
        Ok(query)
    }

    /// Reject invalid shapes before execution.
    pub fn validate(&self) -> QueryResult<()> {
        let fields = known_fields(self.from);
        for condition in &self.conditions {
            if !fields.contains(&condition.field.as_str()) {
                return Err(QueryError::invalid(format!(
                    "unknown field '{}' for {:?}",
                    condition.field, self.from
                )));
            }
            match condition.op {
                QueryOp::In | QueryOp::Nin => {
                    if !condition.value.is_array() {
                        return Err(QueryError::invalid(format!(
                            "operator {:?} requires an array value",
                            condition.op
                        )));
                    }
                }
                QueryOp::MatchesRegex => {
                    let pattern = condition.value.as_str().ok_or_else(|| {
                        QueryError::invalid("matches_regex requires a string value")
                    })?;
                    regex::Regex::new(pattern)
                        .map_err(|e| QueryError::invalid(format!("bad regex: {}", e)))?;
                }
                _ => {}
            }
        }
        for order in &self.order_by {
            if !fields.contains(&order.field.as_str()) {
                return Err(QueryError::invalid(format!(
                    "unknown order field '{}'",
                    order.field
                )));
            }
        }
        if let Selection::Fields(selected) = &self.select {
            if selected.is_empty() {
                return Err(QueryError::invalid("empty field selection"));
            }
        }
        if !self.joins.is_empty() {
            return Err(QueryError::unsupported(
                "joins are served by the correlated query API",
            ));
        }
        if let Some(pattern) = &self.cpg_pattern {
            if pattern.nodes.is_empty() {
                return Err(QueryError::invalid("cpg pattern has no nodes"));
            }
            for edge in &pattern.edges {
                if edge.from_index >= pattern.nodes.len() || edge.to_index >= pattern.nodes.len() {
                    return Err(QueryError::invalid("cpg pattern edge index out of range"));
                }
            }
        }
        Ok(())
    }
}
