//! Incremental synchronizer
//!
//! Applies file change batches against the repository: create/modify
//! re-analyses the file and replaces the module record; delete resolves the
//! module through the file-path index and cascades. Per-event failures are
//! captured in the batch result and never abort siblings; submission order
//! is preserved.

use crate::config::AnalysisConfig;
use crate::features::file_watcher::{FileChangeEvent, FileChangeKind, FileEventHandler};
use crate::features::repository::Repository;
use crate::pipeline::build_module_record;
use crate::shared::ports::SourceParser;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a successfully applied event did
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    Stored { module: String },
    Deleted { module: String },
}

/// Per-event outcome, in submission order
#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub file_path: String,
    pub kind: FileChangeKind,
    pub result: Result<SyncAction, String>,
}

/// Batch result
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub outcomes: Vec<EventOutcome>,
}

impl BatchResult {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Applies incremental changes against the repository
pub struct Synchronizer {
    parser: Arc<dyn SourceParser>,
    repo: Arc<Repository>,
    config: AnalysisConfig,
}

impl Synchronizer {
    pub fn new(parser: Arc<dyn SourceParser>, repo: Arc<Repository>, config: AnalysisConfig) -> Self {
        Self {
            parser,
            repo,
            config,
        }
    }

    /// Apply a batch of file change events in submission order.
    pub fn sync_batch(&self, events: &[FileChangeEvent]) -> BatchResult {
        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            let file_path = event.file_path.to_string_lossy().to_string();
            let result = match event.kind {
                FileChangeKind::Created | FileChangeKind::Modified => {
                    self.apply_upsert(&file_path)
                }
                FileChangeKind::Deleted => self.apply_delete(&file_path),
            };
            if let Err(error) = &result {
                warn!(%file_path, %error, "sync event failed");
            }
            outcomes.push(EventOutcome {
                file_path,
                kind: event.kind,
                result,
            });
        }
        BatchResult { outcomes }
    }

    fn apply_upsert(&self, file_path: &str) -> Result<SyncAction, String> {
        let source = std::fs::read_to_string(file_path)
            .map_err(|e| format!("read failed: {}", e))?;
        if source.len() > self.config.max_file_size {
            return Err(format!(
                "file exceeds max_file_size ({} > {} bytes)",
                source.len(),
                self.config.max_file_size
            ));
        }

        let ast = self
            .parser
            .parse(file_path, &source)
            .map_err(|e| e.to_string())?;
        let record = build_module_record(ast, file_path, &source, &self.config);
        let module = record.module_name.clone();

        // A rename leaves a stale record behind at the same path
        if let Ok(previous) = self.repo.get_module_by_filepath(file_path) {
            if previous.module_name != module {
                debug!(
                    old = %previous.module_name,
                    new = %module,
                    "module renamed, deleting prior record"
                );
                self.repo
                    .delete_module(&previous.module_name)
                    .map_err(|e| e.to_string())?;
            }
        }

        self.repo.store_module(record).map_err(|e| e.to_string())?;
        Ok(SyncAction::Stored { module })
    }

    fn apply_delete(&self, file_path: &str) -> Result<SyncAction, String> {
        let module = self
            .repo
            .get_module_by_filepath(file_path)
            .map_err(|e| e.to_string())?
            .module_name;
        self.repo.delete_module(&module).map_err(|e| e.to_string())?;
        Ok(SyncAction::Deleted { module })
    }
}

/// Watcher-side adapter: feeds each event into the synchronizer as a
/// single-element batch
pub struct SynchronizerHandler {
    synchronizer: Synchronizer,
}

impl SynchronizerHandler {
    pub fn new(synchronizer: Synchronizer) -> Self {
        Self { synchronizer }
    }
}

impl FileEventHandler for SynchronizerHandler {
    fn handle_event(&mut self, event: FileChangeEvent) {
        let _ = self.synchronizer.sync_batch(std::slice::from_ref(&event));
    }
}
