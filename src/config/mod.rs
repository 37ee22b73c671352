//! Configuration layer: YAML documents with anchors, aliases and the two
//! custom directives used by the experiment configs.
//!
//! - `!include_dataset <path>` substitutes the resolved content of another file.
//! - `!flatten_seq` collapses nested sequences into one level, depth-first.
//!
//! Everything here runs once at start-up. The resulting [`ConfigDocument`] is
//! immutable and cheap to clone.

mod alias;
pub mod flatten;
pub mod loader;

pub use flatten::flatten;
pub use loader::{LoadOptions, load, load_str, load_with};

use crate::error::{ConfigError, Result};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directive tag that pulls in another document.
pub const INCLUDE_DATASET: &str = "include_dataset";
/// Directive tag that flattens nested sequences.
pub const FLATTEN_SEQ: &str = "flatten_seq";

/// A fully resolved configuration document.
///
/// Aliases have been expanded and directives evaluated, so the tree only holds
/// plain YAML values.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    root: Arc<Value>,
    origin: PathBuf,
}

impl ConfigDocument {
    pub(crate) fn new(root: Value, origin: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root),
            origin: origin.into(),
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// File the document was loaded from.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Top-level section, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// Top-level section that must be present.
    pub fn section(&self, key: &str) -> Result<&Value> {
        self.get(key).ok_or_else(|| {
            ConfigError::parse(
                self.origin.display().to_string(),
                format!("missing top-level section `{}`", key),
            )
        })
    }

    /// Serialize the resolved tree back to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self.root.as_ref())
            .map_err(|e| ConfigError::parse(self.origin.display().to_string(), e))
    }
}

/// Short human-readable name of a YAML value kind, for error messages.
pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
