//! Query executor
//!
//! Plans a query against the repository indexes: pick a seed set from an
//! index when a predicate allows, apply the remaining predicates in
//! declaration order, stable-sort, paginate, project. Execution is
//! read-only and deterministic for a given repository state.

use super::errors::{QueryError, QueryResult};
use super::pattern::{match_pattern, PatternMatch};
use super::spec::{Condition, OrderBy, OrderDir, Query, QueryFrom, QueryOp, Selection};
use crate::features::repository::repository::{callees_of, Repository, Tables};
use crate::shared::models::{FunctionKey, FunctionRecord, ModuleRecord};
use crate::shared::utils::Deadline;
use regex::Regex;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::time::Duration;

/// One CPG node (or pattern binding set) hit
#[derive(Debug, Clone, PartialEq)]
pub struct CpgNodeHit {
    pub function: FunctionKey,
    /// Pattern-node index → CPG node key; a single entry for plain node
    /// queries
    pub bindings: Vec<(usize, String)>,
}

impl Repository {
    /// Execute a function query.
    pub fn query_functions(&self, query: &Query) -> QueryResult<Vec<FunctionRecord>> {
        execute_functions(self, query)
    }
}

/// Execute a `from: functions` query.
pub fn execute_functions(repo: &Repository, query: &Query) -> QueryResult<Vec<FunctionRecord>> {
    query.validate()?;
    if query.from != QueryFrom::Functions {
        return Err(QueryError::unsupported("expected a functions query"));
    }

    let tables = repo.read_tables();
    let (mut records, seeded_with) = seed_functions(&tables, &query.conditions);

    for (index, condition) in query.conditions.iter().enumerate() {
        if Some(index) == seeded_with {
            continue;
        }
        records.retain(|record| {
            let actual = function_field(&tables, record, &condition.field);
            value_matches(&actual, condition.op, &condition.value)
        });
    }

    order_records(&mut records, &query.order_by, |record, field| {
        function_field(&tables, record, field)
    });
    Ok(paginate(records, query.offset, query.limit))
}

/// Execute a `from: modules` query.
pub fn execute_modules(repo: &Repository, query: &Query) -> QueryResult<Vec<ModuleRecord>> {
    query.validate()?;
    if query.from != QueryFrom::Modules {
        return Err(QueryError::unsupported("expected a modules query"));
    }

    let tables = repo.read_tables();
    let mut records: Vec<ModuleRecord> = tables.modules.values().cloned().collect();
    records.sort_by(|a, b| a.module_name.cmp(&b.module_name));

    for condition in &query.conditions {
        records.retain(|record| {
            let actual = module_field(record, &condition.field);
            value_matches(&actual, condition.op, &condition.value)
        });
    }

    order_records(&mut records, &query.order_by, module_field);
    Ok(paginate(records, query.offset, query.limit))
}

/// Execute a `from: cpg_nodes` query: either a sub-graph pattern match or a
/// plain node filter.
pub fn execute_cpg_nodes(repo: &Repository, query: &Query) -> QueryResult<Vec<CpgNodeHit>> {
    query.validate()?;
    if query.from != QueryFrom::CpgNodes {
        return Err(QueryError::unsupported("expected a cpg_nodes query"));
    }

    let tables = repo.read_tables();
    let mut keys: Vec<&FunctionKey> = tables.functions.keys().collect();
    keys.sort();

    let deadline = Deadline::after(Duration::from_secs(10));
    let mut hits = Vec::new();

    for key in keys {
        let record = &tables.functions[key];
        let Some(cpg) = &record.cpg else { continue };

        match &query.cpg_pattern {
            Some(pattern) => {
                let matches = match_pattern(cpg, pattern, &deadline)?;
                for PatternMatch { bindings } in matches {
                    hits.push(CpgNodeHit {
                        function: key.clone(),
                        bindings,
                    });
                }
            }
            None => {
                let mut node_keys: Vec<&String> = cpg.nodes.keys().collect();
                node_keys.sort();
                for node_key in node_keys {
                    let node = &cpg.nodes[node_key];
                    let all = query.conditions.iter().all(|condition| {
                        let actual = match condition.field.as_str() {
                            "kind" => node
                                .ast_type
                                .as_ref()
                                .map(|t| json!(t))
                                .unwrap_or(Value::Null),
                            "line" => node.line.map(|l| json!(l)).unwrap_or(Value::Null),
                            "scope_id" => node
                                .scope_id
                                .as_ref()
                                .map(|s| json!(s))
                                .unwrap_or(Value::Null),
                            "variable" => variable_of(cpg, node_key),
                            _ => Value::Null,
                        };
                        value_matches(&actual, condition.op, &condition.value)
                    });
                    if all {
                        hits.push(CpgNodeHit {
                            function: key.clone(),
                            bindings: vec![(0, node_key.clone())],
                        });
                    }
                }
            }
        }
        if hits.len() >= 10_000 {
            break;
        }
    }

    Ok(paginate(hits, query.offset, query.limit))
}

fn variable_of(cpg: &crate::shared::models::CodePropertyGraph, key: &str) -> Value {
    for (variable, keys) in &cpg.indexes.by_variable {
        if keys.iter().any(|k| k == key) {
            return json!(variable);
        }
    }
    Value::Null
}

/// Project records according to the query's `select`.
pub fn project_functions(
    repo: &Repository,
    records: &[FunctionRecord],
    selection: &Selection,
) -> Vec<Value> {
    let tables = repo.read_tables();
    records
        .iter()
        .map(|record| {
            if selection.is_all() {
                serde_json::to_value(record).unwrap_or(Value::Null)
            } else if let Selection::Fields(fields) = selection {
                let mut object = serde_json::Map::new();
                for field in fields {
                    object.insert(field.clone(), function_field(&tables, record, field));
                }
                Value::Object(object)
            } else {
                Value::Null
            }
        })
        .collect()
}

// ----------------------------------------------------------------------
// Planning
// ----------------------------------------------------------------------

/// Choose a seed set: an index-backed predicate when one exists, else a
/// deterministic full scan. Returns the seed plus the index of the
/// condition that was consumed by the seed.
fn seed_functions(
    tables: &Tables,
    conditions: &[Condition],
) -> (Vec<FunctionRecord>, Option<usize>) {
    for (index, condition) in conditions.iter().enumerate() {
        match (condition.field.as_str(), condition.op) {
            ("module", QueryOp::Eq) => {
                if let Some(module_name) = condition.value.as_str() {
                    return (module_functions(tables, module_name), Some(index));
                }
            }
            ("file_path", QueryOp::Eq) => {
                if let Some(path) = condition.value.as_str() {
                    if let Some(module_name) = tables.by_file_path.get(path) {
                        return (module_functions(tables, module_name), Some(index));
                    }
                    return (Vec::new(), Some(index));
                }
            }
            ("calls", QueryOp::Eq | QueryOp::Contains) => {
                if let Some(callee) = condition.value.as_str() {
                    let mut records = Vec::new();
                    if let Some(keys) = tables.callers.get(callee) {
                        for key in keys {
                            if let Some(record) = tables.functions.get(key) {
                                records.push(record.clone());
                            }
                        }
                    }
                    return (records, Some(index));
                }
            }
            ("complexity.cyclomatic", op) => {
                if let Some(value) = condition.value.as_f64() {
                    if let Some(records) = complexity_seed(tables, op, value) {
                        return (records, Some(index));
                    }
                }
            }
            _ => {}
        }
    }

    let mut records: Vec<FunctionRecord> = tables.functions.values().cloned().collect();
    records.sort_by(|a, b| a.key.cmp(&b.key));
    (records, None)
}

fn module_functions(tables: &Tables, module_name: &str) -> Vec<FunctionRecord> {
    let mut records: Vec<FunctionRecord> = tables
        .modules
        .get(module_name)
        .map(|module| module.functions.values().cloned().collect())
        .unwrap_or_default();
    records.sort_by(|a, b| a.key.cmp(&b.key));
    records
}

/// Range seed from the complexity bucket index
fn complexity_seed(tables: &Tables, op: QueryOp, value: f64) -> Option<Vec<FunctionRecord>> {
    let threshold = value as u32;
    let keys: Vec<FunctionKey> = match op {
        QueryOp::Eq => tables
            .by_complexity
            .get(&threshold)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default(),
        QueryOp::Gt => tables
            .by_complexity
            .range(threshold + 1..)
            .flat_map(|(_, set)| set.iter().cloned())
            .collect(),
        QueryOp::Gte => tables
            .by_complexity
            .range(threshold..)
            .flat_map(|(_, set)| set.iter().cloned())
            .collect(),
        QueryOp::Lt => tables
            .by_complexity
            .range(..threshold)
            .flat_map(|(_, set)| set.iter().cloned())
            .collect(),
        QueryOp::Lte => tables
            .by_complexity
            .range(..=threshold)
            .flat_map(|(_, set)| set.iter().cloned())
            .collect(),
        _ => return None,
    };
    let mut records: Vec<FunctionRecord> = keys
        .into_iter()
        .filter_map(|key| tables.functions.get(&key).cloned())
        .collect();
    records.sort_by(|a, b| a.key.cmp(&b.key));
    Some(records)
}

// ----------------------------------------------------------------------
// Field extraction and matching
// ----------------------------------------------------------------------

fn function_field(tables: &Tables, record: &FunctionRecord, field: &str) -> Value {
    match field {
        "module" => json!(record.key.module),
        "name" => json!(record.key.name),
        "arity" => json!(record.key.arity),
        "function_key" => json!(record.key.to_string()),
        "calls" => json!(callees_of(&record.key, record)),
        "file_path" => tables
            .modules
            .get(&record.key.module)
            .map(|m| json!(m.file_path))
            .unwrap_or(Value::Null),
        "complexity.cyclomatic" => json!(record.cyclomatic()),
        "complexity.cognitive" => record
            .complexity
            .as_ref()
            .map(|c| json!(c.cognitive))
            .unwrap_or(Value::Null),
        "complexity.decision_points" => record
            .complexity
            .as_ref()
            .map(|c| json!(c.decision_points))
            .unwrap_or(Value::Null),
        "complexity.nesting_depth" => record
            .complexity
            .as_ref()
            .map(|c| json!(c.nesting_depth))
            .unwrap_or(Value::Null),
        "complexity.lines_of_code" => record
            .complexity
            .as_ref()
            .map(|c| json!(c.lines_of_code))
            .unwrap_or(Value::Null),
        "unused_variable_count" => record
            .dfg
            .as_ref()
            .map(|d| json!(d.unused_variables.len()))
            .unwrap_or(Value::Null),
        "phi_count" => record
            .dfg
            .as_ref()
            .map(|d| json!(d.phi_nodes.len()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn module_field(record: &ModuleRecord, field: &str) -> Value {
    match field {
        "module_name" => json!(record.module_name),
        "file_path" => json!(record.file_path),
        "file_hash" => json!(record.file_hash),
        "function_count" => json!(record.functions.len()),
        "dependencies" => json!(record.dependencies),
        _ => Value::Null,
    }
}

/// Evaluate one predicate
fn value_matches(actual: &Value, op: QueryOp, expected: &Value) -> bool {
    match op {
        QueryOp::Eq => values_equal(actual, expected),
        QueryOp::Neq => !values_equal(actual, expected),
        QueryOp::Gt => compare(actual, expected).map(Ordering::is_gt).unwrap_or(false),
        QueryOp::Gte => compare(actual, expected).map(Ordering::is_ge).unwrap_or(false),
        QueryOp::Lt => compare(actual, expected).map(Ordering::is_lt).unwrap_or(false),
        QueryOp::Lte => compare(actual, expected).map(Ordering::is_le).unwrap_or(false),
        QueryOp::In => expected
            .as_array()
            .map(|options| options.iter().any(|option| values_equal(actual, option)))
            .unwrap_or(false),
        QueryOp::Nin => expected
            .as_array()
            .map(|options| !options.iter().any(|option| values_equal(actual, option)))
            .unwrap_or(false),
        QueryOp::Contains => match actual {
            Value::String(text) => expected
                .as_str()
                .map(|needle| text.contains(needle))
                .unwrap_or(false),
            Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
            _ => false,
        },
        QueryOp::StartsWith => match (actual.as_str(), expected.as_str()) {
            (Some(text), Some(prefix)) => text.starts_with(prefix),
            _ => false,
        },
        QueryOp::EndsWith => match (actual.as_str(), expected.as_str()) {
            (Some(text), Some(suffix)) => text.ends_with(suffix),
            _ => false,
        },
        QueryOp::MatchesRegex => match (actual.as_str(), expected.as_str()) {
            // Validated at build time; a failed compile here matches nothing
            (Some(text), Some(pattern)) => Regex::new(pattern)
                .map(|re| re.is_match(text))
                .unwrap_or(false),
            _ => false,
        },
    }
}

/// Equality with numeric coercion (`1` equals `1.0`)
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return Some(x.cmp(y));
    }
    None
}

/// Stable sort on the last key first, so earlier keys dominate
fn order_records<T, F>(records: &mut [T], order_by: &[OrderBy], field_of: F)
where
    F: Fn(&T, &str) -> Value,
{
    for order in order_by.iter().rev() {
        records.sort_by(|a, b| {
            let left = field_of(a, &order.field);
            let right = field_of(b, &order.field);
            let ordering = compare(&left, &right).unwrap_or(Ordering::Equal);
            match order.dir {
                OrderDir::Asc => ordering,
                OrderDir::Desc => ordering.reverse(),
            }
        });
    }
}

fn paginate<T>(records: Vec<T>, offset: Option<usize>, limit: Option<usize>) -> Vec<T> {
    let mut iterator = records.into_iter().skip(offset.unwrap_or(0));
    match limit {
        Some(limit) => iterator.by_ref().take(limit).collect(),
        None => iterator.collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::query_engine::builder::QueryBuilder;
    use crate::features::repository::test_support::seed_repo;

    #[test]
    fn test_by_complexity_filter() {
        let repo = seed_repo(&[("M", "simple", 3), ("M", "gnarly", 12)]);
        let query = QueryBuilder::find_functions()
            .by_complexity("cyclomatic", QueryOp::Gt, 10)
            .select(&["function_key"])
            .build()
            .unwrap();
        let results = repo.query_functions(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key.name, "gnarly");
    }

    #[test]
    fn test_module_seed_and_name_filter() {
        let repo = seed_repo(&[("A", "one", 1), ("A", "two", 1), ("B", "one", 1)]);
        let query = QueryBuilder::find_functions()
            .where_field("module", QueryOp::Eq, "A")
            .where_field("name", QueryOp::StartsWith, "t")
            .build()
            .unwrap();
        let results = repo.query_functions(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key.name, "two");
    }

    #[test]
    fn test_order_and_pagination() {
        let repo = seed_repo(&[("M", "a", 2), ("M", "b", 5), ("M", "c", 9)]);
        let query = QueryBuilder::find_functions()
            .order_by("complexity.cyclomatic", OrderDir::Desc)
            .offset(1)
            .limit(1)
            .build()
            .unwrap();
        let results = repo.query_functions(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key.name, "b");
    }

    #[test]
    fn test_deterministic_repeat() {
        let repo = seed_repo(&[("M", "a", 1), ("M", "b", 1), ("N", "c", 1)]);
        let query = QueryBuilder::find_functions().build().unwrap();
        let first: Vec<String> = repo
            .query_functions(&query)
            .unwrap()
            .iter()
            .map(|r| r.key.to_string())
            .collect();
        let second: Vec<String> = repo
            .query_functions(&query)
            .unwrap()
            .iter()
            .map(|r| r.key.to_string())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_regex_operator() {
        let repo = seed_repo(&[("M", "handle_call", 1), ("M", "init", 1)]);
        let query = QueryBuilder::find_functions()
            .where_field("name", QueryOp::MatchesRegex, "^handle_")
            .build()
            .unwrap();
        let results = repo.query_functions(&query).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key.name, "handle_call");
    }

    #[test]
    fn test_projection_fields() {
        let repo = seed_repo(&[("M", "f", 4)]);
        let query = QueryBuilder::find_functions()
            .select(&["function_key", "complexity.cyclomatic"])
            .build()
            .unwrap();
        let records = repo.query_functions(&query).unwrap();
        let projected = project_functions(&repo, &records, &query.select);
        assert_eq!(projected[0]["function_key"], json!("M.f/1"));
        assert_eq!(projected[0]["complexity.cyclomatic"], json!(4));
    }

    #[test]
    fn test_wrong_from_rejected() {
        let repo = seed_repo(&[]);
        let query = QueryBuilder::find_modules().build().unwrap();
        assert!(repo.query_functions(&query).is_err());
    }
}
