//! Dataset manifest: the flat, ordered list of sequences to evaluate.

use crate::config::{ConfigDocument, flatten, kind};
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// One dataset entry. `type` selects the sequence loader; the remaining keys
/// are handed to it untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    #[serde(flatten)]
    pub args: Mapping,
}

/// Non-empty, ordered. Order is evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DatasetManifest {
    entries: Vec<DatasetDescriptor>,
}

impl DatasetManifest {
    /// Use the `Datas` section when present, otherwise treat the whole
    /// document as the dataset field (single-sequence files).
    pub fn from_document(doc: &ConfigDocument) -> Result<Self> {
        Self::resolve(doc.get("Datas").unwrap_or(doc.root()))
    }

    /// Build the manifest from an already loaded `Datas` value.
    ///
    /// Directives were evaluated by the loader; nested sequences coming from
    /// plain includes are flattened here as well.
    pub fn resolve(datas: &Value) -> Result<Self> {
        let items = match datas {
            Value::Null => Vec::new(),
            Value::Sequence(items) => flatten(items.clone()),
            Value::Mapping(_) => vec![datas.clone()],
            other => {
                return Err(ConfigError::parse(
                    "Datas",
                    format!("expected a sequence of datasets, found {}", kind(other)),
                ));
            }
        };

        let entries = items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| {
                let location = format!("Datas[{}]", idx);
                if !item.is_mapping() {
                    return Err(ConfigError::parse(
                        location,
                        format!("expected a dataset mapping, found {}", kind(&item)),
                    ));
                }
                serde_yaml::from_value(item).map_err(|e| ConfigError::parse(location, e))
            })
            .collect::<Result<Vec<DatasetDescriptor>>>()?;

        if entries.is_empty() {
            return Err(ConfigError::EmptyDatasetManifest);
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[DatasetDescriptor] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DatasetDescriptor> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for a resolved manifest.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a DatasetManifest {
    type Item = &'a DatasetDescriptor;
    type IntoIter = std::slice::Iter<'a, DatasetDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
