//! Keyframe policies.

use super::KeyframePolicy;
use crate::error::{ConfigError, Result};
use crate::frame::Frame;
use crate::registry::{Catalog, Registry};
use crate::schema::StageSpec;
use serde::Deserialize;

pub(crate) fn register(catalog: &mut Catalog<dyn KeyframePolicy>) {
    catalog.register("AllKeyframe", |_, _| Ok(Box::new(AllKeyframe)));
    catalog.register("UniformKeyframe", UniformKeyframe::from_spec);
}

/// Every frame is a keyframe.
pub struct AllKeyframe;

impl KeyframePolicy for AllKeyframe {
    fn is_keyframe(&mut self, _frame: &Frame) -> bool {
        true
    }
}

/// Every `keyframe_freq`-th frame, starting with frame 0.
#[derive(Debug, Deserialize)]
pub struct UniformKeyframe {
    pub keyframe_freq: usize,
}

impl UniformKeyframe {
    fn from_spec(spec: &StageSpec, _registry: &Registry) -> Result<Box<dyn KeyframePolicy>> {
        let policy: UniformKeyframe = spec.parse_args()?;
        if policy.keyframe_freq == 0 {
            return Err(ConfigError::invalid("keyframe_freq", "must be at least 1"));
        }
        Ok(Box::new(policy))
    }
}

impl KeyframePolicy for UniformKeyframe {
    fn is_keyframe(&mut self, frame: &Frame) -> bool {
        frame.index % self.keyframe_freq == 0
    }
}
