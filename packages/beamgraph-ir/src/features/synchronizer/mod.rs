//! Incremental synchronization
//!
//! Applies add/modify/delete batches from file events against the
//! repository.

pub mod synchronizer;

pub use synchronizer::{
    BatchResult, EventOutcome, SyncAction, Synchronizer, SynchronizerHandler,
};
