//! File watcher port types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Kind of file system change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
}

/// One observed file change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    pub kind: FileChangeKind,
    pub file_path: PathBuf,
    pub observed_at: DateTime<Utc>,
}

impl FileChangeEvent {
    pub fn new(kind: FileChangeKind, file_path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            file_path: file_path.into(),
            observed_at: Utc::now(),
        }
    }
}

/// Watcher configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub root_path: PathBuf,
    pub recursive: bool,
    /// Events for the same path within this window collapse into one
    pub debounce: Duration,
    /// Extensions to watch (no dot), e.g. `ex`, `exs`
    pub extensions: Vec<String>,
    /// Path fragments to ignore, e.g. `_build/`, `deps/`
    pub ignore_fragments: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("."),
            recursive: true,
            debounce: Duration::from_millis(200),
            extensions: vec!["ex".to_string(), "exs".to_string()],
            ignore_fragments: vec!["_build/".to_string(), "deps/".to_string()],
        }
    }
}

/// Consumer of watcher events
pub trait FileEventHandler: Send {
    fn handle_event(&mut self, event: FileChangeEvent);
}
