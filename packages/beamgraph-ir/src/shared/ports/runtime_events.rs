//! Runtime-event bridge port
//!
//! Correlated queries join static analysis results against an external
//! runtime-event store keyed by function identity. Only the aggregates the
//! caller asked for come back over the bridge.

use crate::shared::models::FunctionKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which aggregates a correlated query wants per function
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventTemplate {
    pub functions: Vec<FunctionKey>,
    pub include_count: bool,
    pub include_error_count: bool,
    pub include_avg_duration: bool,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Aggregated runtime events for one function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSummary {
    pub function: FunctionKey,
    pub count: Option<u64>,
    pub error_count: Option<u64>,
    pub avg_duration_us: Option<f64>,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Bridge to an external runtime-event store
pub trait RuntimeEventSource: Send + Sync {
    fn query_events(&self, template: &EventTemplate) -> Vec<EventSummary>;
}
