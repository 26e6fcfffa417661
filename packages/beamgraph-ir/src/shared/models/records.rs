//! Function and module records stored by the repository

use super::ast::{FunctionDef, Literal};
use super::cfg::{ComplexityMetrics, ControlFlowGraph};
use super::cpg::CodePropertyGraph;
use super::dfg::DataFlowGraph;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Primary identity of a function: `(module, name, arity)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionKey {
    pub module: String,
    pub name: String,
    pub arity: u32,
}

impl FunctionKey {
    pub fn new(module: impl Into<String>, name: impl Into<String>, arity: u32) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            arity,
        }
    }
}

impl std::fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}/{}", self.module, self.name, self.arity)
    }
}

/// Per-function analysis record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub key: FunctionKey,
    pub ast: FunctionDef,
    pub cfg: Option<ControlFlowGraph>,
    pub dfg: Option<DataFlowGraph>,
    pub cpg: Option<CodePropertyGraph>,
    pub complexity: Option<ComplexityMetrics>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FunctionRecord {
    pub fn cyclomatic(&self) -> u32 {
        self.complexity.as_ref().map(|c| c.cyclomatic).unwrap_or(0)
    }

    /// Remote callees referenced by the CPG callee index
    pub fn callees(&self) -> Vec<String> {
        self.cpg
            .as_ref()
            .map(|cpg| cpg.indexes.by_callee.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// A function whose build failed; the module record keeps the evidence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedFunction {
    pub name: String,
    pub arity: u32,
    pub error: String,
}

/// Aggregate metrics over a module's successfully built functions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleMetrics {
    pub function_count: u32,
    pub total_cyclomatic: u32,
    pub avg_cyclomatic: f64,
    pub lines_of_code: u32,
}

/// Per-module record: functions plus module-level facts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub module_name: String,
    pub file_path: String,
    pub file_hash: String,
    pub functions: HashMap<FunctionKey, FunctionRecord>,
    /// Modules referenced by remote calls
    pub dependencies: Vec<String>,
    /// Public functions
    pub exports: Vec<FunctionKey>,
    pub attributes: Vec<(String, Literal)>,
    pub metrics: ModuleMetrics,
    /// Functions skipped because their build errored
    pub failed_functions: Vec<FailedFunction>,
}

impl ModuleRecord {
    pub fn function(&self, name: &str, arity: u32) -> Option<&FunctionRecord> {
        let key = FunctionKey::new(self.module_name.clone(), name, arity);
        self.functions.get(&key)
    }
}
