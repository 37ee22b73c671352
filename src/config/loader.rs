//! Document loading and directive resolution.

use super::alias::first_undefined_alias;
use super::{ConfigDocument, FLATTEN_SEQ, INCLUDE_DATASET, flatten, kind};
use crate::error::{ConfigError, Result};
use log::debug;
use serde_yaml::Value;
use serde_yaml::value::TaggedValue;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Options that affect how directives are resolved.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Base directory for relative `!include_dataset` paths.
    ///
    /// When unset, paths are relative to the file that contains the directive.
    pub include_root: Option<PathBuf>,
}

impl LoadOptions {
    pub fn with_include_root(root: impl Into<PathBuf>) -> Self {
        Self {
            include_root: Some(root.into()),
        }
    }
}

/// Load and resolve the document at `path` with default options.
pub fn load(path: impl AsRef<Path>) -> Result<ConfigDocument> {
    load_with(path, &LoadOptions::default())
}

pub fn load_with(path: impl AsRef<Path>, options: &LoadOptions) -> Result<ConfigDocument> {
    let path = path.as_ref();
    let mut resolver = Resolver::new(options);
    let root = resolver.load_file(path)?;
    Ok(ConfigDocument::new(root, path))
}

/// Resolve a document held in memory. `origin` names it in errors and anchors
/// relative includes.
pub fn load_str(text: &str, origin: impl AsRef<Path>, options: &LoadOptions) -> Result<ConfigDocument> {
    let origin = origin.as_ref();
    let mut resolver = Resolver::new(options);
    let root = resolver.parse_and_resolve(text, origin)?;
    Ok(ConfigDocument::new(root, origin))
}

/// Recursive-descent resolver. `stack` holds the chain of files currently
/// being included and is what detects include cycles.
struct Resolver<'a> {
    options: &'a LoadOptions,
    stack: Vec<PathBuf>,
}

impl<'a> Resolver<'a> {
    fn new(options: &'a LoadOptions) -> Self {
        Self {
            options,
            stack: Vec::new(),
        }
    }

    fn load_file(&mut self, path: &Path) -> Result<Value> {
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::ConfigNotFound {
                path: path.to_path_buf(),
            },
            _ => ConfigError::parse(path.display().to_string(), e),
        })?;

        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if let Some(start) = self.stack.iter().position(|p| *p == key) {
            let mut chain: Vec<String> = self.stack[start..]
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            chain.push(key.display().to_string());
            return Err(ConfigError::parse(
                path.display().to_string(),
                format!("include cycle: {}", chain.join(" -> ")),
            ));
        }

        self.stack.push(key);
        let resolved = self.parse_and_resolve(&text, path);
        self.stack.pop();
        resolved
    }

    fn parse_and_resolve(&mut self, text: &str, origin: &Path) -> Result<Value> {
        let raw: Value = serde_yaml::from_str(text).map_err(|e| {
            // The parser reports unknown aliases only by position.
            if e.to_string().starts_with("unknown anchor") {
                ConfigError::UnresolvedAlias {
                    path: origin.to_path_buf(),
                    alias: first_undefined_alias(text).unwrap_or_else(|| "?".to_string()),
                }
            } else {
                ConfigError::parse(origin.display().to_string(), e)
            }
        })?;

        let base = match &self.options.include_root {
            Some(root) => root.clone(),
            None => origin.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        self.resolve(raw, &base, origin)
    }

    fn resolve(&mut self, value: Value, base: &Path, origin: &Path) -> Result<Value> {
        match value {
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| self.resolve(item, base, origin))
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
            Value::Mapping(map) => {
                let mut out = serde_yaml::Mapping::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k, self.resolve(v, base, origin)?);
                }
                Ok(Value::Mapping(out))
            }
            Value::Tagged(tagged) => self.directive(*tagged, base, origin),
            scalar => Ok(scalar),
        }
    }

    fn directive(&mut self, tagged: TaggedValue, base: &Path, origin: &Path) -> Result<Value> {
        let TaggedValue { tag, value } = tagged;

        if tag == INCLUDE_DATASET {
            let Value::String(rel) = value else {
                return Err(ConfigError::parse(
                    origin.display().to_string(),
                    format!("!{} expects a path, found {}", INCLUDE_DATASET, kind(&value)),
                ));
            };
            let target = base.join(rel);
            debug!("{}: including {}", origin.display(), target.display());
            self.load_file(&target)
        } else if tag == FLATTEN_SEQ {
            match self.resolve(value, base, origin)? {
                Value::Sequence(items) => Ok(Value::Sequence(flatten(items))),
                other => Err(ConfigError::parse(
                    origin.display().to_string(),
                    format!("!{} expects a sequence, found {}", FLATTEN_SEQ, kind(&other)),
                )),
            }
        } else {
            Err(ConfigError::parse(
                origin.display().to_string(),
                format!("unknown directive {}", tag),
            ))
        }
    }
}
