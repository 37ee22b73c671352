//! Error types for loading, assembling and running the odometry pipeline.

use crate::registry::Category;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration error. Every variant is fatal to the run.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("cannot parse {location}: {message}")]
    ConfigParse { location: String, message: String },

    #[error("alias *{alias} in {} references an undefined anchor", path.display())]
    UnresolvedAlias { path: PathBuf, alias: String },

    #[error("unknown {category} type `{type_name}` (registered: {})", known.join(", "))]
    UnknownComponentType {
        category: Category,
        type_name: String,
        known: Vec<String>,
    },

    #[error("cannot construct stage `{stage}`: {source}")]
    StageConstruction {
        stage: String,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("dataset manifest is empty after flattening")]
    EmptyDatasetManifest,

    #[error("invalid argument `{key}`: {message}")]
    InvalidArgument { key: String, message: String },

    #[error("missing required field `{key}`")]
    MissingField { key: String },

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn parse(location: impl Into<String>, message: impl ToString) -> Self {
        ConfigError::ConfigParse {
            location: location.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn invalid(key: impl Into<String>, message: impl ToString) -> Self {
        ConfigError::InvalidArgument {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Wrap `self` as the cause of a failed stage.
    pub(crate) fn in_stage(self, stage: impl Into<String>) -> Self {
        ConfigError::StageConstruction {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Stage that failed to build, if this is a construction error.
    pub fn failed_stage(&self) -> Option<&str> {
        match self {
            ConfigError::StageConstruction { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Failure while processing a single frame.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame {frame}: {stage} needs {what}, which the frame does not carry")]
    MissingInput {
        frame: usize,
        stage: &'static str,
        what: &'static str,
    },

    #[error("{type_name} needs an inference backend for weight {weight} on {device}")]
    ExternalModel {
        type_name: String,
        weight: String,
        device: String,
    },

    #[error("frame {frame}: {what} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        frame: usize,
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
}
