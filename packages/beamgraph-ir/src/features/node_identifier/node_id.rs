//! Stable node identifier format
//!
//! Wire format: `module:function_arity_cK:path:hash` (ASCII, colon
//! separated, four fields). The path is a dotted sequence of child indices
//! from the clause root ending in a `<tag>_L<line>` fragment; the hash is an
//! 8-hex-char content hash stable under minor position shifts.

use crate::shared::models::FunctionKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier parse failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IdentifierError {
    #[error("malformed node identifier '{id}': {reason}")]
    Malformed { id: String, reason: String },
}

/// Parsed node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub module: String,
    pub function: String,
    pub arity: u32,
    pub clause_index: u32,
    pub path: String,
    pub hash: String,
}

impl NodeId {
    /// The enclosing function's key
    pub fn function_key(&self) -> FunctionKey {
        FunctionKey::new(self.module.clone(), self.function.clone(), self.arity)
    }

    /// Render to the wire format
    pub fn assemble(&self) -> String {
        format!(
            "{}:{}_{}_c{}:{}:{}",
            self.module, self.function, self.arity, self.clause_index, self.path, self.hash
        )
    }

    /// Parse the wire format back into its parts
    pub fn parse(id: &str) -> Result<NodeId, IdentifierError> {
        let malformed = |reason: &str| IdentifierError::Malformed {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = id.split(':').collect();
        if parts.len() != 4 {
            return Err(malformed("expected four colon-separated fields"));
        }
        let (module, function_field, path, hash) = (parts[0], parts[1], parts[2], parts[3]);
        if module.is_empty() {
            return Err(malformed("empty module field"));
        }
        if path.is_empty() {
            return Err(malformed("empty path field"));
        }

        // function_arity_cK, parsed from the right so names may contain '_'
        let mut segments = function_field.rsplitn(3, '_');
        let clause_segment = segments.next().ok_or_else(|| malformed("missing clause index"))?;
        let arity_segment = segments.next().ok_or_else(|| malformed("missing arity"))?;
        let function = segments.next().ok_or_else(|| malformed("missing function name"))?;
        if function.is_empty() {
            return Err(malformed("empty function name"));
        }

        let clause_index: u32 = clause_segment
            .strip_prefix('c')
            .ok_or_else(|| malformed("clause index must be cK"))?
            .parse()
            .map_err(|_| malformed("clause index must be a number"))?;
        let arity: u32 = arity_segment
            .parse()
            .map_err(|_| malformed("arity must be a number"))?;

        Ok(NodeId {
            module: module.to_string(),
            function: function.to_string(),
            arity,
            clause_index,
            path: path.to_string(),
            hash: hash.to_string(),
        })
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.assemble())
    }
}
