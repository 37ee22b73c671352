use crate::error::{ConfigError, Result};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;

/// The eight pipeline stages, in the order they are declared and built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Cov,
    Keypoint,
    Frontend,
    Motion,
    Outlier,
    Postprocess,
    Keyframe,
    Optimizer,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Cov,
        Stage::Keypoint,
        Stage::Frontend,
        Stage::Motion,
        Stage::Outlier,
        Stage::Postprocess,
        Stage::Keyframe,
        Stage::Optimizer,
    ];

    /// Key of the stage inside the `Odometry` section.
    pub fn key(self) -> &'static str {
        match self {
            Stage::Cov => "cov",
            Stage::Keypoint => "keypoint",
            Stage::Frontend => "frontend",
            Stage::Motion => "motion",
            Stage::Outlier => "outlier",
            Stage::Postprocess => "postprocess",
            Stage::Keyframe => "keyframe",
            Stage::Optimizer => "optimizer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// `{type, args}` pair selecting one registered implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    #[serde(rename = "type")]
    pub type_name: String,

    /// Constructor arguments. `args:` with no value means no arguments.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub args: Mapping,
}

impl StageSpec {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            args: Mapping::new(),
        }
    }

    pub fn with_arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.args.insert(Value::String(key.to_string()), value.into());
        self
    }

    /// Deserialize `args` into an implementation's typed argument struct.
    pub fn parse_args<T: DeserializeOwned>(&self) -> Result<T> {
        serde_yaml::from_value(Value::Mapping(self.args.clone()))
            .map_err(|e| ConfigError::invalid(format!("{}.args", self.type_name), e))
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Mapping, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Mapping>::deserialize(deserializer)?.unwrap_or_default())
}
