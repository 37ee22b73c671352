//! Frontends: depth plus cross-frame correspondence.

use super::external::ExternalModel;
use super::{DepthEstimator, Frontend, FrontendOutput, Matcher};
use crate::error::{FrameError, Result};
use crate::frame::{FlowField, Frame};
use crate::registry::{Catalog, Registry};
use crate::schema::StageSpec;
use nalgebra::DMatrix;
use serde::Deserialize;

pub(crate) fn register(catalog: &mut Catalog<dyn Frontend>) {
    catalog.register("FrontendCompose", FrontendCompose::from_spec);
    catalog.register("FlowFormerCovFrontend", |spec, _| {
        Ok(Box::new(ExternalModel::from_spec("FlowFormerCovFrontend", spec)?))
    });
}

pub(crate) fn register_depth(catalog: &mut Catalog<dyn DepthEstimator>) {
    catalog.register("GTDepth", |_, _| Ok(Box::new(GTDepth)));
    catalog.register("FlowFormerDepth", |spec, _| {
        Ok(Box::new(ExternalModel::from_spec("FlowFormerDepth", spec)?))
    });
}

pub(crate) fn register_matcher(catalog: &mut Catalog<dyn Matcher>) {
    catalog.register("GTMatcher", |_, _| Ok(Box::new(GTMatcher)));
    catalog.register("FlowFormerMatcher", |spec, _| {
        Ok(Box::new(ExternalModel::from_spec("FlowFormerMatcher", spec)?))
    });
}

#[derive(Deserialize)]
struct ComposeArgs {
    depth: StageSpec,
    #[serde(rename = "match")]
    matcher: StageSpec,
}

/// Independent depth and matching sub-stages.
pub struct FrontendCompose {
    depth: Box<dyn DepthEstimator>,
    matcher: Box<dyn Matcher>,
}

impl FrontendCompose {
    pub fn new(depth: Box<dyn DepthEstimator>, matcher: Box<dyn Matcher>) -> Self {
        Self { depth, matcher }
    }

    fn from_spec(spec: &StageSpec, registry: &Registry) -> Result<Box<dyn Frontend>> {
        let args: ComposeArgs = spec.parse_args()?;
        let depth = registry.depth.build(&args.depth, registry)?;
        let matcher = registry.matcher.build(&args.matcher, registry)?;
        Ok(Box::new(Self::new(depth, matcher)))
    }
}

impl Frontend for FrontendCompose {
    fn estimate(&mut self, frame: &Frame, with_flow: bool) -> std::result::Result<FrontendOutput, FrameError> {
        let depth = self.depth.estimate(frame)?;
        let flow = if with_flow {
            Some(self.matcher.estimate(frame)?)
        } else {
            None
        };
        Ok(FrontendOutput { depth, flow })
    }
}

/// Depth taken from the frame's ground truth.
pub struct GTDepth;

impl DepthEstimator for GTDepth {
    fn estimate(&mut self, frame: &Frame) -> std::result::Result<DMatrix<f32>, FrameError> {
        let depth = frame.gt_depth.as_ref().ok_or(FrameError::MissingInput {
            frame: frame.index,
            stage: "GTDepth",
            what: "ground-truth depth",
        })?;
        check_shape(frame, "depth", depth.shape())?;
        Ok(depth.clone())
    }
}

/// Flow taken from the frame's ground truth.
pub struct GTMatcher;

impl Matcher for GTMatcher {
    fn estimate(&mut self, frame: &Frame) -> std::result::Result<FlowField, FrameError> {
        let flow = frame.gt_flow.as_ref().ok_or(FrameError::MissingInput {
            frame: frame.index,
            stage: "GTMatcher",
            what: "ground-truth flow",
        })?;
        check_shape(frame, "flow", flow.shape())?;
        Ok(flow.clone())
    }
}

fn check_shape(frame: &Frame, what: &'static str, actual: (usize, usize)) -> std::result::Result<(), FrameError> {
    let expected = (frame.height, frame.width);
    if actual != expected {
        return Err(FrameError::ShapeMismatch {
            frame: frame.index,
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
