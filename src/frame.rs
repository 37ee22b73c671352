//! Per-frame data flowing through an assembled pipeline.

use nalgebra::{DMatrix, Isometry3, Point2, Point3, Vector2};

/// Pinhole intrinsics of the reference (left) camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// 3D point in camera coordinates for pixel `(u, v)` at depth `z`.
    pub fn back_project(&self, pixel: Point2<f32>, z: f64) -> Point3<f64> {
        let x = (pixel.x as f64 - self.cx) / self.fx * z;
        let y = (pixel.y as f64 - self.cy) / self.fy * z;
        Point3::new(x, y, z)
    }
}

/// Dense optical flow, stored as two `height x width` matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    pub u: DMatrix<f32>,
    pub v: DMatrix<f32>,
}

impl FlowField {
    pub fn constant(height: usize, width: usize, u: f32, v: f32) -> Self {
        Self {
            u: DMatrix::from_element(height, width, u),
            v: DMatrix::from_element(height, width, v),
        }
    }

    /// `(height, width)`.
    pub fn shape(&self) -> (usize, usize) {
        self.u.shape()
    }

    pub fn at(&self, pixel: Point2<f32>) -> Option<Vector2<f32>> {
        Some(Vector2::new(sample(&self.u, pixel)?, sample(&self.v, pixel)?))
    }
}

/// Nearest-pixel lookup, `None` outside the matrix or for a non-finite pixel.
pub fn sample(map: &DMatrix<f32>, pixel: Point2<f32>) -> Option<f32> {
    if !(pixel.x.is_finite() && pixel.y.is_finite()) {
        return None;
    }
    let col = pixel.x.round();
    let row = pixel.y.round();
    if col < 0.0 || row < 0.0 {
        return None;
    }
    map.get((row as usize, col as usize)).copied()
}

/// One stereo frame as seen by the pipeline.
///
/// The `gt_*` fields carry ground truth for the `GT*` stages; stages backed
/// by external networks ignore them.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: usize,
    pub width: usize,
    pub height: usize,
    pub intrinsics: Intrinsics,
    /// Depth of the reference image, `height x width`.
    pub gt_depth: Option<DMatrix<f32>>,
    /// Flow from the previous frame to this one, indexed by previous pixels.
    pub gt_flow: Option<FlowField>,
    /// Pose of this frame expressed in the previous frame.
    pub gt_motion: Option<Isometry3<f64>>,
}

impl Frame {
    pub fn new(index: usize, width: usize, height: usize, intrinsics: Intrinsics) -> Self {
        Self {
            index,
            width,
            height,
            intrinsics,
            gt_depth: None,
            gt_flow: None,
            gt_motion: None,
        }
    }

    pub fn with_depth(mut self, depth: DMatrix<f32>) -> Self {
        self.gt_depth = Some(depth);
        self
    }

    pub fn with_flow(mut self, flow: FlowField) -> Self {
        self.gt_flow = Some(flow);
        self
    }

    pub fn with_motion(mut self, motion: Isometry3<f64>) -> Self {
        self.gt_motion = Some(motion);
        self
    }
}

/// A keypoint tracked from the previous frame into the current one.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub pixel_prev: Point2<f32>,
    pub pixel_cur: Point2<f32>,
    pub point_prev: Point3<f64>,
    pub point_cur: Point3<f64>,
}

impl Observation {
    pub fn depth_prev(&self) -> f64 {
        self.point_prev.z
    }

    pub fn depth_cur(&self) -> f64 {
        self.point_cur.z
    }
}

/// Result of feeding one frame to the pipeline.
#[derive(Debug, Clone)]
pub struct FrameUpdate {
    pub index: usize,
    pub is_keyframe: bool,
    /// Pose in the world (first frame) coordinates.
    pub pose: Isometry3<f64>,
    /// Pose relative to the previous frame.
    pub relative: Isometry3<f64>,
    pub observations: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPose {
    pub index: usize,
    pub pose: Isometry3<f64>,
    pub is_keyframe: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn back_project_principal_point() {
        let k = Intrinsics::new(100.0, 100.0, 32.0, 24.0);
        let p = k.back_project(Point2::new(32.0, 24.0), 2.0);
        assert_relative_eq!(p, Point3::new(0.0, 0.0, 2.0));

        let p = k.back_project(Point2::new(42.0, 24.0), 2.0);
        assert_relative_eq!(p.x, 0.2);
    }

    #[test]
    fn sample_rounds_and_bounds_checks() {
        let m = DMatrix::from_fn(3, 4, |r, c| (r * 10 + c) as f32);
        assert_eq!(sample(&m, Point2::new(1.4, 2.0)), Some(21.0));
        assert_eq!(sample(&m, Point2::new(3.6, 0.0)), None);
        assert_eq!(sample(&m, Point2::new(-0.7, 0.0)), None);
    }

    #[test]
    fn sample_rejects_non_finite_pixels() {
        let m = DMatrix::from_element(3, 4, 1.0f32);
        assert_eq!(sample(&m, Point2::new(f32::NAN, 1.0)), None);
        assert_eq!(sample(&m, Point2::new(0.0, f32::INFINITY)), None);

        let flow = FlowField::constant(3, 4, f32::NAN, 0.0);
        assert_eq!(flow.at(Point2::new(1.0, 1.0)).map(|d| d.x.is_nan()), Some(true));
        let moved = Point2::new(1.0, 1.0) + Vector2::new(f32::NAN, 0.0);
        assert_eq!(sample(&m, moved), None);
    }
}
