//! Correlated static/runtime queries
//!
//! Composes a static repository query with a runtime-event template: the
//! static half runs first, its function keys become the join key set, and
//! the external runtime-event bridge supplies the aggregates.

use super::errors::QueryResult;
use super::executor::execute_functions;
use super::spec::Query;
use crate::features::repository::Repository;
use crate::shared::models::{FunctionKey, FunctionRecord};
use crate::shared::ports::{EventSummary, EventTemplate, RuntimeEventSource};
use std::collections::HashMap;

/// A static query joined with runtime events by function identity
#[derive(Debug, Clone)]
pub struct CorrelatedQuery {
    pub query: Query,
    pub template: EventTemplate,
}

/// One joined row
#[derive(Debug, Clone)]
pub struct CorrelatedRow {
    pub record: FunctionRecord,
    pub events: Option<EventSummary>,
}

/// Evaluate the static half, extract the join keys, and consult the
/// runtime-event bridge.
pub fn execute_correlated(
    repo: &Repository,
    source: &dyn RuntimeEventSource,
    correlated: &CorrelatedQuery,
) -> QueryResult<Vec<CorrelatedRow>> {
    let records = execute_functions(repo, &correlated.query)?;

    let mut template = correlated.template.clone();
    template.functions = records.iter().map(|r| r.key.clone()).collect();

    let mut summaries: HashMap<FunctionKey, EventSummary> = source
        .query_events(&template)
        .into_iter()
        .map(|summary| (summary.function.clone(), summary))
        .collect();

    Ok(records
        .into_iter()
        .map(|record| {
            let events = summaries.remove(&record.key);
            CorrelatedRow { record, events }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::query_engine::builder::QueryBuilder;
    use crate::features::query_engine::spec::QueryOp;
    use crate::features::repository::test_support::seed_repo;

    /// Canned bridge returning a fixed count for every requested function
    struct FakeEvents;

    impl RuntimeEventSource for FakeEvents {
        fn query_events(&self, template: &EventTemplate) -> Vec<EventSummary> {
            template
                .functions
                .iter()
                .map(|key| EventSummary {
                    function: key.clone(),
                    count: Some(42),
                    error_count: Some(0),
                    avg_duration_us: None,
                    time_range: None,
                })
                .collect()
        }
    }

    #[test]
    fn test_join_by_function_identity() {
        let repo = seed_repo(&[("M", "f", 1), ("M", "g", 1)]);
        let correlated = CorrelatedQuery {
            query: QueryBuilder::find_functions()
                .where_field("module", QueryOp::Eq, "M")
                .build()
                .unwrap(),
            template: EventTemplate {
                include_count: true,
                ..Default::default()
            },
        };
        let rows = execute_correlated(&repo, &FakeEvents, &correlated).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.events.as_ref().unwrap().count == Some(42)));
    }

    #[test]
    fn test_missing_events_leave_none() {
        struct Silent;
        impl RuntimeEventSource for Silent {
            fn query_events(&self, _template: &EventTemplate) -> Vec<EventSummary> {
                Vec::new()
            }
        }
        let repo = seed_repo(&[("M", "f", 1)]);
        let correlated = CorrelatedQuery {
            query: QueryBuilder::find_functions().build().unwrap(),
            template: EventTemplate::default(),
        };
        let rows = execute_correlated(&repo, &Silent, &correlated).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].events.is_none());
    }
}
