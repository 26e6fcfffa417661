//! In-memory repository
//!
//! Single-writer, many-reader store for module and function records plus
//! every secondary index. Writers serialise through a dedicated mutex and
//! commit all primary and index mutations under one table guard, so a read
//! either sees the whole write or none of it.

use super::errors::{RepoResult, RepositoryError};
use crate::shared::models::{CodePropertyGraph, FunctionKey, FunctionRecord, ModuleRecord};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Aggregate repository statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RepositoryStats {
    pub module_count: usize,
    pub function_count: usize,
    pub committed_writes: u64,
    pub estimated_bytes: usize,
}

/// Primary and secondary tables; mutated only under the write path
#[derive(Default)]
pub(crate) struct Tables {
    pub(crate) modules: HashMap<String, ModuleRecord>,
    pub(crate) functions: HashMap<FunctionKey, FunctionRecord>,
    pub(crate) ast_nodes: HashMap<String, Value>,
    pub(crate) cpgs: HashMap<FunctionKey, CodePropertyGraph>,
    /// file_path → module_name
    pub(crate) by_file_path: HashMap<String, String>,
    /// cyclomatic complexity → function keys (supports range seeding)
    pub(crate) by_complexity: BTreeMap<u32, BTreeSet<FunctionKey>>,
    /// canonical callee "Module.name/arity" → caller keys
    pub(crate) callers: HashMap<String, BTreeSet<FunctionKey>>,
    pub(crate) stats: RepositoryStats,
}

/// The in-memory repository service
pub struct Repository {
    tables: RwLock<Tables>,
    write_lock: Mutex<()>,
    max_memory_mb: Option<usize>,
}

impl Repository {
    pub fn new(max_memory_mb: Option<usize>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            write_lock: Mutex::new(()),
            max_memory_mb,
        }
    }

    /// Read access for the query executor
    pub(crate) fn read_tables(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read()
    }

    // ------------------------------------------------------------------
    // Module operations
    // ------------------------------------------------------------------

    /// Store (or replace) a module record and every index entry it owns.
    pub fn store_module(&self, record: ModuleRecord) -> RepoResult<()> {
        let _writer = self.write_lock.lock();
        let added = estimate_module_bytes(&record);

        let mut tables = self.tables.write();
        if let Some(limit_mb) = self.max_memory_mb {
            let projected = tables.stats.estimated_bytes + added;
            if projected > limit_mb * 1024 * 1024 {
                warn!(
                    module = %record.module_name,
                    limit_mb,
                    projected,
                    "write refused, repository memory limit exceeded"
                );
                return Err(RepositoryError::MemoryLimitExceeded { limit_mb });
            }
        }

        // Replace semantics: drop every trace of the prior record first
        remove_module_locked(&mut tables, &record.module_name);

        tables
            .by_file_path
            .insert(record.file_path.clone(), record.module_name.clone());
        for (key, function) in &record.functions {
            index_function_locked(&mut tables, key, function);
            tables.functions.insert(key.clone(), function.clone());
        }
        debug!(
            module = %record.module_name,
            functions = record.functions.len(),
            "module stored"
        );
        tables.stats.estimated_bytes += added;
        tables
            .modules
            .insert(record.module_name.clone(), record);
        refresh_counts(&mut tables);
        tables.stats.committed_writes += 1;
        Ok(())
    }

    pub fn get_module(&self, module_name: &str) -> RepoResult<ModuleRecord> {
        self.tables
            .read()
            .modules
            .get(module_name)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("module {}", module_name)))
    }

    pub fn get_module_by_filepath(&self, file_path: &str) -> RepoResult<ModuleRecord> {
        let tables = self.tables.read();
        let module_name = tables
            .by_file_path
            .get(file_path)
            .ok_or_else(|| RepositoryError::not_found(format!("file {}", file_path)))?;
        tables
            .modules
            .get(module_name)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("module {}", module_name)))
    }

    /// Delete a module, cascading to functions, CPGs, AST nodes and every
    /// index entry.
    pub fn delete_module(&self, module_name: &str) -> RepoResult<()> {
        let _writer = self.write_lock.lock();
        let mut tables = self.tables.write();
        remove_module_locked(&mut tables, module_name);
        refresh_counts(&mut tables);
        tables.stats.committed_writes += 1;
        debug!(module = %module_name, "module deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Function operations
    // ------------------------------------------------------------------

    pub fn store_function(&self, record: FunctionRecord) -> RepoResult<()> {
        let _writer = self.write_lock.lock();
        let mut tables = self.tables.write();

        deindex_function_locked(&mut tables, &record.key);
        index_function_locked(&mut tables, &record.key, &record);
        if let Some(module) = tables.modules.get_mut(&record.key.module) {
            module.functions.insert(record.key.clone(), record.clone());
        }
        tables.functions.insert(record.key.clone(), record);
        refresh_counts(&mut tables);
        tables.stats.committed_writes += 1;
        Ok(())
    }

    pub fn get_function(&self, key: &FunctionKey) -> RepoResult<FunctionRecord> {
        self.tables
            .read()
            .functions
            .get(key)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("function {}", key)))
    }

    pub fn get_functions_for_module(&self, module_name: &str) -> RepoResult<Vec<FunctionRecord>> {
        let tables = self.tables.read();
        let module = tables
            .modules
            .get(module_name)
            .ok_or_else(|| RepositoryError::not_found(format!("module {}", module_name)))?;
        let mut functions: Vec<FunctionRecord> = module.functions.values().cloned().collect();
        functions.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(functions)
    }

    /// Callers of `key`, served from the inverted call index.
    pub fn find_callers_of(&self, key: &FunctionKey) -> RepoResult<Vec<FunctionRecord>> {
        let tables = self.tables.read();
        let callee = format!("{}.{}/{}", key.module, key.name, key.arity);
        let mut callers = Vec::new();
        if let Some(keys) = tables.callers.get(&callee) {
            for caller_key in keys {
                if let Some(record) = tables.functions.get(caller_key) {
                    callers.push(record.clone());
                }
            }
        }
        Ok(callers)
    }

    // ------------------------------------------------------------------
    // Fine-grained storage
    // ------------------------------------------------------------------

    pub fn store_ast_node(&self, ast_node_id: &str, payload: Value) -> RepoResult<()> {
        let _writer = self.write_lock.lock();
        let mut tables = self.tables.write();
        tables.ast_nodes.insert(ast_node_id.to_string(), payload);
        tables.stats.committed_writes += 1;
        Ok(())
    }

    pub fn get_ast_node(&self, ast_node_id: &str) -> RepoResult<Value> {
        self.tables
            .read()
            .ast_nodes
            .get(ast_node_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("ast node {}", ast_node_id)))
    }

    pub fn store_cpg(&self, key: &FunctionKey, cpg: CodePropertyGraph) -> RepoResult<()> {
        let _writer = self.write_lock.lock();
        let mut tables = self.tables.write();
        tables.cpgs.insert(key.clone(), cpg);
        tables.stats.committed_writes += 1;
        Ok(())
    }

    pub fn get_cpg(&self, key: &FunctionKey) -> RepoResult<CodePropertyGraph> {
        let tables = self.tables.read();
        if let Some(cpg) = tables.cpgs.get(key) {
            return Ok(cpg.clone());
        }
        // Function records carry their CPG too
        tables
            .functions
            .get(key)
            .and_then(|f| f.cpg.clone())
            .ok_or_else(|| RepositoryError::not_found(format!("cpg for {}", key)))
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Empty every table and reset statistics.
    pub fn clear_all(&self) -> RepoResult<()> {
        let _writer = self.write_lock.lock();
        let mut tables = self.tables.write();
        *tables = Tables::default();
        Ok(())
    }

    pub fn stats(&self) -> RepositoryStats {
        self.tables.read().stats
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Canonical callee strings of one function, local calls qualified with the
/// caller's module
pub(crate) fn callees_of(key: &FunctionKey, record: &FunctionRecord) -> Vec<String> {
    let mut callees = Vec::new();
    if let Some(cfg) = &record.cfg {
        for node in &cfg.nodes {
            if let Some(callee) = node.metadata.get("callee").and_then(|v| v.as_str()) {
                let canonical = if callee.contains('.') {
                    callee.to_string()
                } else {
                    format!("{}.{}", key.module, callee)
                };
                callees.push(canonical);
            }
        }
    }
    callees.sort();
    callees.dedup();
    callees
}

fn index_function_locked(tables: &mut Tables, key: &FunctionKey, record: &FunctionRecord) {
    let cyclomatic = record.cyclomatic();
    tables
        .by_complexity
        .entry(cyclomatic)
        .or_default()
        .insert(key.clone());
    for callee in callees_of(key, record) {
        tables.callers.entry(callee).or_default().insert(key.clone());
    }
}

fn deindex_function_locked(tables: &mut Tables, key: &FunctionKey) {
    tables.by_complexity.retain(|_, keys| {
        keys.remove(key);
        !keys.is_empty()
    });
    tables.callers.retain(|_, keys| {
        keys.remove(key);
        !keys.is_empty()
    });
    tables.cpgs.remove(key);
}

fn remove_module_locked(tables: &mut Tables, module_name: &str) {
    if let Some(previous) = tables.modules.remove(module_name) {
        tables.by_file_path.remove(&previous.file_path);
        let keys: Vec<FunctionKey> = previous.functions.keys().cloned().collect();
        for key in keys {
            tables.functions.remove(&key);
            deindex_function_locked(tables, &key);
        }
        tables
            .ast_nodes
            .retain(|id, _| !id.starts_with(&format!("{}:", module_name)));
        let removed = estimate_module_bytes(&previous);
        tables.stats.estimated_bytes = tables.stats.estimated_bytes.saturating_sub(removed);
    }
}

fn refresh_counts(tables: &mut Tables) {
    tables.stats.module_count = tables.modules.len();
    tables.stats.function_count = tables.functions.len();
}

/// Rough per-module footprint; graphs dominate, so count their elements
fn estimate_module_bytes(record: &ModuleRecord) -> usize {
    let mut bytes = 1024;
    for function in record.functions.values() {
        if let Some(cfg) = &function.cfg {
            bytes += (cfg.node_count() + cfg.edge_count()) * 200;
        }
        if let Some(dfg) = &function.dfg {
            bytes += (dfg.node_count() + dfg.edges.len()) * 150;
        }
        if let Some(cpg) = &function.cpg {
            bytes += (cpg.node_count() + cpg.edge_count()) * 250;
        }
        bytes += 512;
    }
    bytes
}

/// Shared fixtures for repository and query-engine tests
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::features::flow_graph::{build_cfg, CfgBuildOpts};
    use crate::shared::models::{Expr, ExprKind, FunctionDef, Pattern};
    use chrono::Utc;
    use std::collections::BTreeMap;

    /// A stored-shape function record with the requested cyclomatic
    /// complexity (a chain of conditionals)
    pub(crate) fn stored_function(
        module: &str,
        name: &str,
        cyclomatic_target: u32,
    ) -> FunctionRecord {
        let mut body = Expr::var("x", 10);
        for i in 1..cyclomatic_target {
            body = Expr::new(
                ExprKind::If {
                    condition: Box::new(Expr::var("x", i)),
                    then_branch: Box::new(Expr::atom("t", i)),
                    else_branch: Some(Box::new(body)),
                },
                i,
            );
        }
        let def = FunctionDef::simple(name, vec![Pattern::var("x", 1)], None, body, 1);
        let cfg = build_cfg(&def, &CfgBuildOpts::default()).unwrap();
        let complexity = cfg.complexity.clone();
        FunctionRecord {
            key: FunctionKey::new(module, name, 1),
            ast: def,
            cfg: Some(cfg),
            dfg: None,
            cpg: None,
            complexity: Some(complexity),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn stored_module(
        module: &str,
        file_path: &str,
        functions: Vec<FunctionRecord>,
    ) -> ModuleRecord {
        let functions: HashMap<FunctionKey, FunctionRecord> = functions
            .into_iter()
            .map(|f| (f.key.clone(), f))
            .collect();
        ModuleRecord {
            module_name: module.to_string(),
            file_path: file_path.to_string(),
            file_hash: "deadbeef".to_string(),
            functions,
            dependencies: vec![],
            exports: vec![],
            attributes: vec![],
            metrics: Default::default(),
            failed_functions: vec![],
        }
    }

    /// Repository populated with `(module, function, cyclomatic)` specs
    pub(crate) fn seed_repo(specs: &[(&str, &str, u32)]) -> Repository {
        let mut by_module: BTreeMap<&str, Vec<FunctionRecord>> = BTreeMap::new();
        for (module, name, cyclomatic) in specs {
            by_module
                .entry(module)
                .or_default()
                .push(stored_function(module, name, *cyclomatic));
        }
        let repo = Repository::default();
        for (module, functions) in by_module {
            let path = format!("/{}.ex", module.to_lowercase());
            repo.store_module(stored_module(module, &path, functions))
                .expect("seed module stores");
        }
        repo
    }
}
