//! Configuration-driven composition of the MACVO visual odometry pipeline.
//!
//! A YAML experiment file names one implementation per stage; the loader
//! resolves anchors and directives, the registry maps type names to
//! constructors and [`pipeline::assemble`] builds the eight stages.

pub mod config;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod registry;
pub mod sandbox;
pub mod schema;
pub mod stages;

pub use config::{ConfigDocument, LoadOptions, load, load_with};
pub use error::{ConfigError, FrameError, Result};
pub use pipeline::{Pipeline, assemble};
pub use registry::{Category, Registry};
pub use schema::{DatasetDescriptor, DatasetManifest, PipelineConfig, Stage, StageSpec};
