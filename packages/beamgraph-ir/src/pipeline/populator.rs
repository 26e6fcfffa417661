//! Project populator
//!
//! Glues parse → identify → build (CFG ∥ DFG → CPG) → store. Independent
//! files are analysed with a rayon pool sized by `parallel_workers`, each
//! unit bounded by a per-file deadline. A function whose build errors is
//! recorded in the module's failed-function list and never aborts its
//! siblings; the module write is a partial write in that case.

use crate::config::AnalysisConfig;
use crate::features::cpg::unify_graphs;
use crate::features::data_flow::{build_dfg, DfgBuildOpts};
use crate::features::flow_graph::{build_cfg, CfgBuildOpts};
use crate::features::node_identifier::assign_module_ids;
use crate::features::repository::Repository;
use crate::shared::models::{
    FailedFunction, FunctionDef, FunctionKey, FunctionRecord, ModuleAst, ModuleMetrics,
    ModuleRecord,
};
use crate::shared::ports::SourceParser;
use crate::shared::utils::{file_hash, Deadline};
use chrono::Utc;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of analysing one file
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file_path: String,
    pub result: Result<String, String>,
}

/// Drives parallel parse/build/store over a set of source files
pub struct ProjectPopulator<'a> {
    parser: &'a dyn SourceParser,
    repo: &'a Repository,
    config: AnalysisConfig,
}

impl<'a> ProjectPopulator<'a> {
    pub fn new(parser: &'a dyn SourceParser, repo: &'a Repository, config: AnalysisConfig) -> Self {
        Self {
            parser,
            repo,
            config,
        }
    }

    /// Analyse `files` (path, source) pairs and store the resulting module
    /// records. Outcomes preserve input order; one failure never aborts
    /// siblings.
    pub fn populate(&self, files: &[(String, String)]) -> Vec<FileOutcome> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers())
            .build();
        match pool {
            Ok(pool) => pool.install(|| self.populate_inner(files)),
            Err(error) => {
                warn!(%error, "falling back to the global rayon pool");
                self.populate_inner(files)
            }
        }
    }

    fn populate_inner(&self, files: &[(String, String)]) -> Vec<FileOutcome> {
        files
            .par_iter()
            .map(|(path, source)| FileOutcome {
                file_path: path.clone(),
                result: self.analyze_file(path, source),
            })
            .collect()
    }

    /// Parse, build and store one file; returns the module name.
    pub fn analyze_file(&self, file_path: &str, source: &str) -> Result<String, String> {
        if source.len() > self.config.max_file_size {
            return Err(format!(
                "file exceeds max_file_size ({} > {} bytes)",
                source.len(),
                self.config.max_file_size
            ));
        }

        let ast = self
            .parser
            .parse(file_path, source)
            .map_err(|e| e.to_string())?;
        let record = build_module_record(ast, file_path, source, &self.config);
        let module_name = record.module_name.clone();
        self.repo.store_module(record).map_err(|e| e.to_string())?;
        Ok(module_name)
    }
}

/// Build a module record from a parsed AST (identifier assignment included).
pub fn build_module_record(
    mut ast: ModuleAst,
    file_path: &str,
    source: &str,
    config: &AnalysisConfig,
) -> ModuleRecord {
    let synthesised = assign_module_ids(&mut ast);
    if synthesised > 0 {
        warn!(
            module = %ast.name,
            synthesised,
            "some nodes were missing position metadata"
        );
    }

    let mut functions: HashMap<FunctionKey, FunctionRecord> = HashMap::new();
    let mut failed: Vec<FailedFunction> = Vec::new();

    for def in &ast.functions {
        match build_function_record(&ast.name, def, config) {
            Ok(record) => {
                functions.insert(record.key.clone(), record);
            }
            Err(error) => {
                debug!(module = %ast.name, function = %def.name, %error, "function build failed");
                failed.push(FailedFunction {
                    name: def.name.clone(),
                    arity: def.arity(),
                    error,
                });
            }
        }
    }

    let dependencies = module_dependencies(&ast, &functions);
    let exports: Vec<FunctionKey> = ast
        .functions
        .iter()
        .filter(|def| !def.private)
        .map(|def| FunctionKey::new(ast.name.clone(), def.name.clone(), def.arity()))
        .collect();
    let metrics = module_metrics(&functions);

    ModuleRecord {
        module_name: ast.name.clone(),
        file_path: file_path.to_string(),
        file_hash: file_hash(source),
        functions,
        dependencies,
        exports,
        attributes: ast.attributes.clone(),
        metrics,
        failed_functions: failed,
    }
}

/// Build one function's graphs per the configured toggles.
///
/// A CFG failure skips the function; a DFG failure keeps the CFG but the
/// CPG is not built.
fn build_function_record(
    module: &str,
    def: &FunctionDef,
    config: &AnalysisConfig,
) -> Result<FunctionRecord, String> {
    let deadline = per_file_deadline(config);
    let key = FunctionKey::new(module, def.name.clone(), def.arity());

    let cfg = if config.generate_cfg || config.generate_cpg {
        let opts = CfgBuildOpts {
            path_analysis: config.path_analysis,
            deadline: Some(deadline),
        };
        Some(build_cfg(def, &opts).map_err(|e| e.to_string())?)
    } else {
        None
    };

    let dfg = if config.generate_dfg || config.generate_cpg {
        let opts = DfgBuildOpts {
            deadline: Some(deadline),
        };
        match build_dfg(def, &opts) {
            Ok(dfg) => Some(dfg),
            Err(error) => {
                // Function-local: keep the CFG, skip the data layer and CPG
                debug!(function = %key, %error, "DFG failed, CPG skipped");
                return Ok(FunctionRecord {
                    key,
                    ast: def.clone(),
                    complexity: cfg.as_ref().map(|c| c.complexity.clone()),
                    cfg: if config.generate_cfg { cfg } else { None },
                    dfg: None,
                    cpg: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                });
            }
        }
    } else {
        None
    };

    let cpg = match (config.generate_cpg, &cfg, &dfg) {
        (true, Some(cfg), Some(dfg)) => Some(unify_graphs(def, cfg, dfg)),
        _ => None,
    };

    Ok(FunctionRecord {
        key,
        ast: def.clone(),
        complexity: cfg.as_ref().map(|c| c.complexity.clone()),
        cfg: if config.generate_cfg { cfg } else { None },
        dfg: if config.generate_dfg { dfg } else { None },
        cpg,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    })
}

fn per_file_deadline(config: &AnalysisConfig) -> Deadline {
    match config.cpg_timeout_ms {
        Some(ms) => Deadline::after(Duration::from_millis(ms)),
        None => Deadline::after(Duration::from_secs(10)),
    }
}

/// Modules referenced by remote calls anywhere in the module
fn module_dependencies(
    ast: &ModuleAst,
    functions: &HashMap<FunctionKey, FunctionRecord>,
) -> Vec<String> {
    let mut dependencies: BTreeSet<String> = BTreeSet::new();
    for record in functions.values() {
        if let Some(cfg) = &record.cfg {
            for node in &cfg.nodes {
                if let Some(callee) = node.metadata.get("callee").and_then(|v| v.as_str()) {
                    if let Some((module, _)) = callee.rsplit_once('.') {
                        if module != ast.name {
                            dependencies.insert(module.to_string());
                        }
                    }
                }
            }
        }
    }
    dependencies.into_iter().collect()
}

fn module_metrics(functions: &HashMap<FunctionKey, FunctionRecord>) -> ModuleMetrics {
    let function_count = functions.len() as u32;
    let total_cyclomatic: u32 = functions.values().map(|f| f.cyclomatic()).sum();
    let lines_of_code: u32 = functions
        .values()
        .filter_map(|f| f.complexity.as_ref())
        .map(|c| c.lines_of_code)
        .sum();
    ModuleMetrics {
        function_count,
        total_cyclomatic,
        avg_cyclomatic: if function_count > 0 {
            total_cyclomatic as f64 / function_count as f64
        } else {
            0.0
        },
        lines_of_code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{Expr, Pattern};
    use crate::shared::ports::{ParseError, SourceParser};

    /// Parser bridge stub producing a one-function module per file
    struct StubParser;

    impl SourceParser for StubParser {
        fn parse(&self, file_path: &str, _source: &str) -> Result<ModuleAst, ParseError> {
            if file_path.ends_with("broken.ex") {
                return Err(ParseError::new(file_path, "syntax error"));
            }
            let module = file_path
                .trim_start_matches('/')
                .trim_end_matches(".ex")
                .to_uppercase();
            let body = Expr::call(Some("Helper"), "run", vec![Expr::var("x", 2)], 2);
            let def = FunctionDef::simple("go", vec![Pattern::var("x", 1)], None, body, 1);
            Ok(ModuleAst::new(module, vec![def]))
        }
    }

    #[test]
    fn test_populate_stores_modules() {
        let repo = Repository::default();
        let populator = ProjectPopulator::new(&StubParser, &repo, AnalysisConfig::default());
        let outcomes = populator.populate(&[
            ("/a.ex".to_string(), "defmodule A do end".to_string()),
            ("/b.ex".to_string(), "defmodule B do end".to_string()),
        ]);

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert!(repo.get_module("A").is_ok());
        assert!(repo.get_module_by_filepath("/b.ex").is_ok());
    }

    #[test]
    fn test_parse_failure_does_not_abort_siblings() {
        let repo = Repository::default();
        let populator = ProjectPopulator::new(&StubParser, &repo, AnalysisConfig::default());
        let outcomes = populator.populate(&[
            ("/broken.ex".to_string(), "nope".to_string()),
            ("/ok.ex".to_string(), "defmodule OK do end".to_string()),
        ]);

        assert!(outcomes[0].result.is_err());
        assert!(outcomes[1].result.is_ok());
        assert!(repo.get_module("OK").is_ok());
    }

    #[test]
    fn test_oversized_file_refused() {
        let repo = Repository::default();
        let config = AnalysisConfig {
            max_file_size: 4,
            ..AnalysisConfig::default()
        };
        let populator = ProjectPopulator::new(&StubParser, &repo, config);
        let outcome = populator.analyze_file("/a.ex", "defmodule A do end");
        assert!(outcome.is_err());
    }

    #[test]
    fn test_module_record_carries_dependencies_and_exports() {
        let body = Expr::call(Some("Helper"), "run", vec![Expr::var("x", 2)], 2);
        let def = FunctionDef::simple("go", vec![Pattern::var("x", 1)], None, body, 1);
        let ast = ModuleAst::new("M", vec![def]);
        let record =
            build_module_record(ast, "/m.ex", "source", &AnalysisConfig::default());

        assert_eq!(record.dependencies, vec!["Helper".to_string()]);
        assert_eq!(record.exports.len(), 1);
        assert_eq!(record.exports[0].name, "go");
        assert_eq!(record.metrics.function_count, 1);
        assert!(record.failed_functions.is_empty());
    }

    #[test]
    fn test_toggles_skip_graphs() {
        let def = FunctionDef::simple(
            "go",
            vec![Pattern::var("x", 1)],
            None,
            Expr::var("x", 2),
            1,
        );
        let ast = ModuleAst::new("M", vec![def]);
        let config = AnalysisConfig {
            generate_dfg: false,
            generate_cpg: false,
            ..AnalysisConfig::default()
        };
        let record = build_module_record(ast, "/m.ex", "source", &config);
        let function = record.functions.values().next().unwrap();
        assert!(function.cfg.is_some());
        assert!(function.dfg.is_none());
        assert!(function.cpg.is_none());
    }

    #[test]
    fn test_failed_function_recorded_as_partial_write() {
        // A same-scope assignment cycle fails the DFG; the CFG survives
        let body = Expr::block(
            vec![
                Expr::assign(
                    Pattern::var("x", 2),
                    Expr::binary_op("+", Expr::var("y", 2), Expr::int(1, 2), 2),
                    2,
                ),
                Expr::assign(
                    Pattern::var("y", 3),
                    Expr::binary_op("+", Expr::var("x", 3), Expr::int(1, 3), 3),
                    3,
                ),
            ],
            1,
        );
        let def = FunctionDef::simple("bad", vec![], None, body, 1);
        let ast = ModuleAst::new("M", vec![def]);
        let record =
            build_module_record(ast, "/m.ex", "source", &AnalysisConfig::default());

        let function = record.functions.values().next().unwrap();
        assert!(function.cfg.is_some());
        assert!(function.dfg.is_none());
        assert!(function.cpg.is_none());
    }
}
