//! Analysis pipeline orchestration

pub mod populator;

pub use populator::{build_module_record, FileOutcome, ProjectPopulator};
