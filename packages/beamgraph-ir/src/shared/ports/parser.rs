//! Parser bridge port
//!
//! Source-file parsing is an external collaborator. Implementations lower
//! their language-native syntax tree into the shared [`ModuleAst`] shape;
//! the analysis core never sees the source encoding.

use crate::shared::models::ModuleAst;
use thiserror::Error;

/// Parse failure surfaced from a parser bridge
#[derive(Debug, Clone, Error, PartialEq)]
#[error("parse error in {file_path}: {reason}")]
pub struct ParseError {
    pub file_path: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(file_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            reason: reason.into(),
        }
    }
}

/// Bridge to an external source parser
pub trait SourceParser: Send + Sync {
    /// Parse `source` (read from `file_path`) into a module AST with
    /// position metadata on every node.
    fn parse(&self, file_path: &str, source: &str) -> Result<ModuleAst, ParseError>;
}
