//! Network-backed stages.
//!
//! The networks themselves live outside this crate. Here they are only
//! validated and described: the weight path is kept as written and the device
//! is checked for syntax. Running one without an inference backend fails the
//! frame.

use super::{DepthEstimator, Frontend, FrontendOutput, Matcher};
use crate::error::{ConfigError, FrameError, Result};
use crate::frame::{FlowField, Frame};
use crate::schema::{Device, StageSpec};
use log::info;
use nalgebra::DMatrix;
use serde::Deserialize;
use serde_yaml::Mapping;

#[derive(Deserialize)]
struct ExternalArgs {
    weight: String,
    device: Device,
    #[serde(flatten)]
    options: Mapping,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalModel {
    pub type_name: &'static str,
    pub weight: String,
    pub device: Device,
    /// Remaining arguments (`use_jit`, `dtype`, ...), passed through.
    pub options: Mapping,
}

impl ExternalModel {
    pub(crate) fn from_spec(type_name: &'static str, spec: &StageSpec) -> Result<Self> {
        let args: ExternalArgs = spec.parse_args()?;
        if args.weight.trim().is_empty() {
            return Err(ConfigError::invalid("weight", "must name a model file"));
        }
        info!("{} on {} with weight {}", type_name, args.device, args.weight);
        Ok(Self {
            type_name,
            weight: args.weight,
            device: args.device,
            options: args.options,
        })
    }

    fn unavailable(&self) -> FrameError {
        FrameError::ExternalModel {
            type_name: self.type_name.to_string(),
            weight: self.weight.clone(),
            device: self.device.to_string(),
        }
    }
}

impl DepthEstimator for ExternalModel {
    fn estimate(&mut self, _frame: &Frame) -> std::result::Result<DMatrix<f32>, FrameError> {
        Err(self.unavailable())
    }
}

impl Matcher for ExternalModel {
    fn estimate(&mut self, _frame: &Frame) -> std::result::Result<FlowField, FrameError> {
        Err(self.unavailable())
    }
}

impl Frontend for ExternalModel {
    fn estimate(&mut self, _frame: &Frame, _with_flow: bool) -> std::result::Result<FrontendOutput, FrameError> {
        Err(self.unavailable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;

    fn spec(text: &str) -> StageSpec {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn keeps_weight_device_and_options() {
        let model = ExternalModel::from_spec(
            "FlowFormerDepth",
            &spec("type: FlowFormerDepth\nargs:\n  weight: ./Model/MACVO_FrontendCov.pth\n  device: cuda\n  use_jit: true\n"),
        )
        .unwrap();
        assert_eq!(model.weight, "./Model/MACVO_FrontendCov.pth");
        assert_eq!(model.device, Device::Cuda(None));
        assert_eq!(model.options.get("use_jit").and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn device_is_required() {
        let err = ExternalModel::from_spec(
            "FlowFormerMatcher",
            &spec("type: FlowFormerMatcher\nargs:\n  weight: model.pth\n"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("device"), "{}", err);
    }

    #[test]
    fn running_without_backend_names_the_model() {
        let mut model = ExternalModel::from_spec(
            "FlowFormerDepth",
            &spec("type: FlowFormerDepth\nargs: {weight: model.pth, device: 'cuda:1'}\n"),
        )
        .unwrap();
        let frame = Frame::new(0, 4, 4, crate::frame::Intrinsics::new(1.0, 1.0, 2.0, 2.0));
        let err = DepthEstimator::estimate(&mut model, &frame).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("FlowFormerDepth") && msg.contains("model.pth") && msg.contains("cuda:1"), "{}", msg);
    }
}
