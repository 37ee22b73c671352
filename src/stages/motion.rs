//! Motion priors.

use super::MotionModel;
use crate::frame::Frame;
use crate::registry::Catalog;
use nalgebra::Isometry3;

pub(crate) fn register(catalog: &mut Catalog<dyn MotionModel>) {
    catalog.register("StaticMotionModel", |_, _| Ok(Box::new(StaticMotionModel)));
    catalog.register("GTMotionModel", |_, _| Ok(Box::new(GTMotionModel)));
}

/// Assumes the camera did not move.
pub struct StaticMotionModel;

impl MotionModel for StaticMotionModel {
    fn predict(&mut self, _frame: &Frame) -> Isometry3<f64> {
        Isometry3::identity()
    }
}

/// Ground-truth relative motion; identity when the frame carries none.
pub struct GTMotionModel;

impl MotionModel for GTMotionModel {
    fn predict(&mut self, frame: &Frame) -> Isometry3<f64> {
        frame.gt_motion.unwrap_or_else(Isometry3::identity)
    }
}
