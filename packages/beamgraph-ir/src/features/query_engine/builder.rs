//! Fluent query builder
//!
//! Chainable helpers that produce the inert [`Query`] value.
//!
//! ```no_run
//! use beamgraph_ir::features::query_engine::QueryBuilder;
//! use beamgraph_ir::features::query_engine::spec::{OrderDir, QueryOp};
//!
//! let query = QueryBuilder::find_functions()
//!     .by_complexity("cyclomatic", QueryOp::Gt, 10)
//!     .order_by("complexity.cyclomatic", OrderDir::Desc)
//!     .limit(20)
//!     .build()
//!     .unwrap();
//! ```

use super::errors::QueryResult;
use super::spec::{
    Condition, CpgPattern, OrderBy, OrderDir, Query, QueryFrom, QueryOp, Selection,
};
use crate::shared::models::FunctionKey;
use serde_json::{json, Value};

/// Chainable builder for [`Query`] values
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn find_functions() -> Self {
        Self {
            query: Query {
                from: QueryFrom::Functions,
                ..Query::default()
            },
        }
    }

    pub fn find_modules() -> Self {
        Self {
            query: Query {
                from: QueryFrom::Modules,
                ..Query::default()
            },
        }
    }

    pub fn find_cpg_nodes() -> Self {
        Self {
            query: Query {
                from: QueryFrom::CpgNodes,
                ..Query::default()
            },
        }
    }

    /// Add one `where` predicate
    pub fn where_field(mut self, field: &str, op: QueryOp, value: impl Into<Value>) -> Self {
        self.query.conditions.push(Condition {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    /// Filter on a complexity metric, e.g. `by_complexity("cyclomatic",
    /// QueryOp::Gt, 10)`
    pub fn by_complexity(self, metric: &str, op: QueryOp, value: impl Into<Value>) -> Self {
        let field = format!("complexity.{}", metric);
        self.where_field_owned(field, op, value.into())
    }

    /// Functions that call `target`
    pub fn calls(self, target: &FunctionKey) -> Self {
        let canonical = format!("{}.{}/{}", target.module, target.name, target.arity);
        self.where_field_owned("calls".to_string(), QueryOp::Contains, json!(canonical))
    }

    /// Alias of [`calls`](Self::calls): the callers of `target`
    pub fn callers_of(self, target: &FunctionKey) -> Self {
        self.calls(target)
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.query.select =
            Selection::Fields(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn order_by(mut self, field: &str, dir: OrderDir) -> Self {
        self.query.order_by.push(OrderBy {
            field: field.to_string(),
            dir,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Attach a CPG sub-graph pattern (only meaningful with
    /// [`find_cpg_nodes`](Self::find_cpg_nodes))
    pub fn match_cpg_pattern(mut self, pattern: CpgPattern) -> Self {
        self.query.cpg_pattern = Some(pattern);
        self
    }

    pub fn hint(mut self, hint: &str) -> Self {
        self.query.query_hint = Some(hint.to_string());
        self
    }

    /// Validate and return the inert query value
    pub fn build(self) -> QueryResult<Query> {
        self.query.validate()?;
        Ok(self.query)
    }

    fn where_field_owned(mut self, field: String, op: QueryOp, value: Value) -> Self {
        self.query.conditions.push(Condition { field, op, value });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_chain() {
        let query = QueryBuilder::find_functions()
            .by_complexity("cyclomatic", QueryOp::Gt, 10)
            .select(&["function_key"])
            .build()
            .unwrap();
        assert_eq!(query.conditions.len(), 1);
        assert_eq!(query.conditions[0].field, "complexity.cyclomatic");
        assert_eq!(query.conditions[0].op, QueryOp::Gt);
    }

    #[test]
    fn test_calls_canonicalises_target() {
        let query = QueryBuilder::find_functions()
            .calls(&FunctionKey::new("Target", "hit", 2))
            .build()
            .unwrap();
        assert_eq!(query.conditions[0].value, json!("Target.hit/2"));
    }

    #[test]
    fn test_invalid_field_fails_build() {
        let result = QueryBuilder::find_functions()
            .where_field("bogus", QueryOp::Eq, 1)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_order_limit_offset() {
        let query = QueryBuilder::find_functions()
            .order_by("name", OrderDir::Asc)
            .limit(5)
            .offset(10)
            .build()
            .unwrap();
        assert_eq!(query.order_by.len(), 1);
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, Some(10));
    }
}
