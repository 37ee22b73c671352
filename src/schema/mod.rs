//! Schema layer: serde shapes of the `Odometry` and `Datas` sections plus the
//! validated in-memory views built from them.
//!
//! This module only knows about configuration values. Turning a
//! [`PipelineConfig`] into running stages is the job of `pipeline`.

pub mod dataset;
pub mod device;
pub mod odometry;
pub mod stage;

pub use dataset::{DatasetDescriptor, DatasetManifest};
pub use device::Device;
pub use odometry::{OdometryArgs, PipelineConfig};
pub use stage::{Stage, StageSpec};
