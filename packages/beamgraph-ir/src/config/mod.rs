//! Typed configuration records
//!
//! Every recognised option is an explicit field with a serde default, so a
//! partial JSON config deserialises into a fully valid record.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Bounds for entry-to-exit path enumeration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathAnalysisConfig {
    /// Cap on total enumerated paths
    pub max_paths: usize,
    /// Maximum path depth
    pub max_depth: usize,
    /// Maximum fan-out followed per node
    pub max_fanout: usize,
}

impl Default for PathAnalysisConfig {
    fn default() -> Self {
        Self {
            max_paths: 100,
            max_depth: 20,
            max_fanout: 5,
        }
    }
}

/// Top-level analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Soft cap for repository data; writes beyond warn and may refuse
    pub max_memory_mb: Option<usize>,
    /// File globs for discovery
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Per-file input byte limit
    pub max_file_size: usize,
    /// Builder fan-out; 0 means the number of hardware threads
    pub parallel_workers: usize,
    pub generate_cfg: bool,
    pub generate_dfg: bool,
    pub generate_cpg: bool,
    /// Override of the complexity-derived CPG deadline
    pub cpg_timeout_ms: Option<u64>,
    pub path_analysis: PathAnalysisConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: None,
            include_patterns: vec!["**/*.ex".to_string(), "**/*.exs".to_string()],
            exclude_patterns: vec!["**/deps/**".to_string(), "**/_build/**".to_string()],
            max_file_size: 1024 * 1024,
            parallel_workers: 0,
            generate_cfg: true,
            generate_dfg: true,
            generate_cpg: true,
            cpg_timeout_ms: None,
            path_analysis: PathAnalysisConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Effective worker count (resolves 0 to the hardware thread count)
    pub fn workers(&self) -> usize {
        if self.parallel_workers == 0 {
            num_cpus::get()
        } else {
            self.parallel_workers
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_file_size",
                reason: "must be positive".to_string(),
            });
        }
        if self.path_analysis.max_paths == 0 {
            return Err(ConfigError::InvalidValue {
                field: "path_analysis.max_paths",
                reason: "must be positive".to_string(),
            });
        }
        if self.path_analysis.max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "path_analysis.max_depth",
                reason: "must be positive".to_string(),
            });
        }
        if self.path_analysis.max_fanout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "path_analysis.max_fanout",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"parallel_workers": 4}"#).unwrap();
        assert_eq!(config.parallel_workers, 4);
        assert!(config.generate_cfg);
        assert_eq!(config.path_analysis.max_paths, 100);
    }

    #[test]
    fn test_zero_depth_rejected() {
        let mut config = AnalysisConfig::default();
        config.path_analysis.max_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_workers_resolves_zero() {
        let config = AnalysisConfig::default();
        assert!(config.workers() >= 1);
    }
}
