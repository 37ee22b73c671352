//! Capability traits, one per registry category, and the built-in
//! implementations.
//!
//! Every trait object is `Send + Sync` so an assembled pipeline can be moved
//! to, or read from, another thread once construction is done.

pub mod cov;
pub mod external;
pub mod frontend;
pub mod keyframe;
pub mod keypoint;
pub mod motion;
pub mod optimizer;
pub mod outlier;
pub mod postprocess;

use crate::error::FrameError;
use crate::frame::{FlowField, Frame, Observation, TrajectoryPose};
use nalgebra::{DMatrix, Isometry3, Point2};

/// Per-observation weight. Larger means more trusted.
pub trait Covariance: Send + Sync {
    fn weights(&self, observations: &[Observation]) -> Vec<f64>;
}

/// Chooses the pixels tracked into the next frame.
pub trait KeypointSelector: Send + Sync {
    fn select(&mut self, frame: &Frame, depth: &DMatrix<f32>) -> Vec<Point2<f32>>;
}

/// Depth of the reference image.
pub trait DepthEstimator: Send + Sync {
    fn estimate(&mut self, frame: &Frame) -> Result<DMatrix<f32>, FrameError>;
}

/// Optical flow from the previous frame to `frame`.
pub trait Matcher: Send + Sync {
    fn estimate(&mut self, frame: &Frame) -> Result<FlowField, FrameError>;
}

#[derive(Debug, Clone)]
pub struct FrontendOutput {
    pub depth: DMatrix<f32>,
    /// Only requested from the second frame on.
    pub flow: Option<FlowField>,
}

/// Depth and correspondence for one frame.
pub trait Frontend: Send + Sync {
    fn estimate(&mut self, frame: &Frame, with_flow: bool) -> Result<FrontendOutput, FrameError>;
}

/// Prior on the pose of `frame` relative to the previous frame.
pub trait MotionModel: Send + Sync {
    fn predict(&mut self, frame: &Frame) -> Isometry3<f64>;
}

/// `true` keeps the observation at the same index.
pub trait ObservationFilter: Send + Sync {
    fn keep(&self, observations: &[Observation]) -> Vec<bool>;
}

/// Runs once over the full trajectory when the sequence ends.
pub trait Postprocess: Send + Sync {
    fn process(&self, trajectory: &mut [TrajectoryPose]);
}

pub trait KeyframePolicy: Send + Sync {
    fn is_keyframe(&mut self, frame: &Frame) -> bool;
}

/// One refinement problem: a prior on the relative pose and the weighted
/// observations that constrain it. Owned so it can cross to a worker thread.
#[derive(Debug, Clone)]
pub struct OptimizationJob {
    pub prior: Isometry3<f64>,
    pub observations: Vec<Observation>,
    pub weights: Vec<f64>,
}

/// Refines the relative pose from weighted observations.
///
/// `submit` may return before the job is solved; `write_back` hands back the
/// result of the last submitted job, blocking until it is ready. `None` when
/// nothing is pending.
pub trait Optimizer: Send + Sync {
    fn submit(&mut self, job: OptimizationJob);

    fn write_back(&mut self) -> Option<Isometry3<f64>>;

    /// Stop any background work. Later jobs are solved in place.
    fn terminate(&mut self) {}
}
