//! Keypoint selectors.
//!
//! Both selectors stay `mask_width` pixels away from the image border and
//! skip pixels without a usable depth.

use super::KeypointSelector;
use crate::error::{ConfigError, Result};
use crate::frame::Frame;
use crate::registry::{Catalog, Registry};
use crate::schema::StageSpec;
use nalgebra::{DMatrix, Point2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;

pub(crate) fn register(catalog: &mut Catalog<dyn KeypointSelector>) {
    catalog.register("RandomSelector", RandomSelector::from_spec);
    catalog.register("GridSelector", GridSelector::from_spec);
}

#[derive(Debug, Clone, Deserialize)]
struct SelectorArgs {
    num_point: usize,
    #[serde(default = "default_mask_width")]
    mask_width: usize,
    #[serde(default)]
    seed: u64,
}

fn default_mask_width() -> usize {
    32
}

impl SelectorArgs {
    fn parse(spec: &StageSpec) -> Result<Self> {
        let args: SelectorArgs = spec.parse_args()?;
        if args.num_point == 0 {
            return Err(ConfigError::invalid("num_point", "must be at least 1"));
        }
        Ok(args)
    }
}

/// Interior of a `width x height` image after removing a `margin` border,
/// as `(x0, y0, w, h)`.
fn interior(width: usize, height: usize, margin: usize) -> Option<(usize, usize, usize, usize)> {
    let w = width.checked_sub(2 * margin).filter(|w| *w > 0)?;
    let h = height.checked_sub(2 * margin).filter(|h| *h > 0)?;
    Some((margin, margin, w, h))
}

fn has_depth(depth: &DMatrix<f32>, x: usize, y: usize) -> bool {
    depth
        .get((y, x))
        .is_some_and(|z| z.is_finite() && *z > 0.0)
}

/// Up to `num_point` distinct pixels drawn uniformly from the interior.
pub struct RandomSelector {
    num_point: usize,
    mask_width: usize,
    rng: StdRng,
}

impl RandomSelector {
    pub fn new(num_point: usize, mask_width: usize, seed: u64) -> Self {
        Self {
            num_point,
            mask_width,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn from_spec(spec: &StageSpec, _registry: &Registry) -> Result<Box<dyn KeypointSelector>> {
        let args = SelectorArgs::parse(spec)?;
        Ok(Box::new(Self::new(args.num_point, args.mask_width, args.seed)))
    }
}

impl KeypointSelector for RandomSelector {
    fn select(&mut self, frame: &Frame, depth: &DMatrix<f32>) -> Vec<Point2<f32>> {
        let Some((x0, y0, w, h)) = interior(frame.width, frame.height, self.mask_width) else {
            return Vec::new();
        };
        let amount = self.num_point.min(w * h);
        rand::seq::index::sample(&mut self.rng, w * h, amount)
            .into_iter()
            .map(|i| (x0 + i % w, y0 + i / w))
            .filter(|&(x, y)| has_depth(depth, x, y))
            .map(|(x, y)| Point2::new(x as f32, y as f32))
            .collect()
    }
}

/// Regular grid with at most `num_point` nodes over the interior.
pub struct GridSelector {
    num_point: usize,
    mask_width: usize,
}

impl GridSelector {
    pub fn new(num_point: usize, mask_width: usize) -> Self {
        Self {
            num_point,
            mask_width,
        }
    }

    fn from_spec(spec: &StageSpec, _registry: &Registry) -> Result<Box<dyn KeypointSelector>> {
        let args = SelectorArgs::parse(spec)?;
        Ok(Box::new(Self::new(args.num_point, args.mask_width)))
    }
}

impl KeypointSelector for GridSelector {
    fn select(&mut self, frame: &Frame, depth: &DMatrix<f32>) -> Vec<Point2<f32>> {
        let Some((x0, y0, w, h)) = interior(frame.width, frame.height, self.mask_width) else {
            return Vec::new();
        };
        let area = (w * h) as f64;
        let step = ((area / self.num_point as f64).sqrt().ceil() as usize).max(1);

        let mut out = Vec::with_capacity(self.num_point);
        for y in (y0 + step / 2..y0 + h).step_by(step) {
            for x in (x0 + step / 2..x0 + w).step_by(step) {
                if out.len() == self.num_point {
                    return out;
                }
                if has_depth(depth, x, y) {
                    out.push(Point2::new(x as f32, y as f32));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Intrinsics;

    fn frame(width: usize, height: usize) -> Frame {
        Frame::new(0, width, height, Intrinsics::new(100.0, 100.0, 32.0, 24.0))
    }

    fn inside(p: &Point2<f32>, width: usize, height: usize, margin: usize) -> bool {
        let (x, y) = (p.x as usize, p.y as usize);
        x >= margin && x < width - margin && y >= margin && y < height - margin
    }

    #[test]
    fn random_selector_respects_budget_and_border() {
        let depth = DMatrix::from_element(48, 64, 2.0f32);
        let mut selector = RandomSelector::new(200, 8, 7);
        let points = selector.select(&frame(64, 48), &depth);
        assert_eq!(points.len(), 200);
        assert!(points.iter().all(|p| inside(p, 64, 48, 8)));

        let mut unique: Vec<_> = points.iter().map(|p| (p.x as usize, p.y as usize)).collect();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 200);
    }

    #[test]
    fn random_selector_is_seeded() {
        let depth = DMatrix::from_element(48, 64, 2.0f32);
        let a = RandomSelector::new(20, 4, 42).select(&frame(64, 48), &depth);
        let b = RandomSelector::new(20, 4, 42).select(&frame(64, 48), &depth);
        assert_eq!(a, b);
    }

    #[test]
    fn random_selector_skips_invalid_depth() {
        let depth = DMatrix::from_element(48, 64, f32::NAN);
        let mut selector = RandomSelector::new(50, 4, 0);
        assert!(selector.select(&frame(64, 48), &depth).is_empty());
    }

    #[test]
    fn border_wider_than_image_selects_nothing() {
        let depth = DMatrix::from_element(48, 64, 2.0f32);
        let mut selector = RandomSelector::new(50, 32, 0);
        assert!(selector.select(&frame(64, 48), &depth).is_empty());
        let mut grid = GridSelector::new(50, 32);
        assert!(grid.select(&frame(64, 48), &depth).is_empty());
    }

    #[test]
    fn grid_selector_spreads_points() {
        let depth = DMatrix::from_element(48, 64, 2.0f32);
        let mut selector = GridSelector::new(12, 8);
        let points = selector.select(&frame(64, 48), &depth);
        assert!(!points.is_empty() && points.len() <= 12, "{}", points.len());
        assert!(points.iter().all(|p| inside(p, 64, 48, 8)));
    }

    #[test]
    fn zero_points_is_rejected() {
        let registry = Registry::builtin();
        let spec = StageSpec::new("GridSelector").with_arg("num_point", 0);
        let err = registry.keypoint.build(&spec, &registry).err().unwrap();
        assert!(err.to_string().contains("num_point"), "{}", err);
    }
}
