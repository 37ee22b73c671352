//! Trajectory postprocessing.

use super::Postprocess;
use crate::frame::TrajectoryPose;
use crate::registry::Catalog;

pub(crate) fn register(catalog: &mut Catalog<dyn Postprocess>) {
    catalog.register("NaivePostprocess", |_, _| Ok(Box::new(NaivePostprocess)));
    catalog.register("DisplacementInterpolate", |_, _| Ok(Box::new(DisplacementInterpolate)));
}

/// Leaves the trajectory untouched.
pub struct NaivePostprocess;

impl Postprocess for NaivePostprocess {
    fn process(&self, _trajectory: &mut [TrajectoryPose]) {}
}

/// Re-estimates every non-keyframe pose between two keyframes by
/// interpolating linearly in translation and spherically in rotation.
///
/// Frames before the first keyframe take its pose, frames after the last
/// keyframe take the last one's. A trajectory without keyframes is left as
/// it is.
pub struct DisplacementInterpolate;

impl Postprocess for DisplacementInterpolate {
    fn process(&self, trajectory: &mut [TrajectoryPose]) {
        let keyframes: Vec<usize> = trajectory
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_keyframe)
            .map(|(i, _)| i)
            .collect();
        let (Some(&first), Some(&last)) = (keyframes.first(), keyframes.last()) else {
            return;
        };

        let head = trajectory[first].pose;
        for pose in &mut trajectory[..first] {
            pose.pose = head;
        }
        let tail = trajectory[last].pose;
        for pose in &mut trajectory[last + 1..] {
            pose.pose = tail;
        }

        for pair in keyframes.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if b - a < 2 {
                continue;
            }
            let start = trajectory[a].pose;
            let end = trajectory[b].pose;
            let by_index = trajectory[a..=b].windows(2).all(|w| w[0].index < w[1].index);
            let (origin, span) = if by_index {
                (trajectory[a].index as f64, (trajectory[b].index - trajectory[a].index) as f64)
            } else {
                (a as f64, (b - a) as f64)
            };
            for (offset, pose) in trajectory[a + 1..b].iter_mut().enumerate() {
                let at = if by_index { pose.index as f64 } else { (a + 1 + offset) as f64 };
                pose.pose = start.lerp_slerp(&end, (at - origin) / span);
            }
        }
    }
}
