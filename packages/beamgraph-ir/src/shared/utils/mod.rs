//! Shared utilities

pub mod deadline;
pub mod hashing;

pub use deadline::{Deadline, DeadlineExceeded};
pub use hashing::{file_hash, short_hash};
