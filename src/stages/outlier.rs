//! Observation filters.

use super::ObservationFilter;
use crate::error::{ConfigError, Result};
use crate::frame::Observation;
use crate::registry::{Catalog, Registry};
use crate::schema::StageSpec;
use log::debug;
use serde::Deserialize;

pub(crate) fn register(catalog: &mut Catalog<dyn ObservationFilter>) {
    catalog.register("SimpleDepthFilter", SimpleDepthFilter::from_spec);
    catalog.register("FilterCompose", FilterCompose::from_spec);
}

/// `max_depth` is either a number or `auto` (no upper bound).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum DepthBound {
    Value(f64),
    Keyword(String),
}

#[derive(Debug, Clone, Deserialize)]
struct DepthFilterArgs {
    #[serde(default)]
    min_depth: f64,
    #[serde(default)]
    max_depth: Option<DepthBound>,
}

/// Keeps observations whose depth lies in `[min_depth, max_depth]` in both
/// frames.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleDepthFilter {
    pub min_depth: f64,
    pub max_depth: Option<f64>,
}

impl SimpleDepthFilter {
    pub fn new(min_depth: f64, max_depth: Option<f64>) -> Result<Self> {
        if !(min_depth >= 0.0 && min_depth.is_finite()) {
            return Err(ConfigError::invalid("min_depth", format!("{} is not a finite depth >= 0", min_depth)));
        }
        if let Some(max) = max_depth {
            if !(max > min_depth) {
                return Err(ConfigError::invalid(
                    "max_depth",
                    format!("{} must be greater than min_depth {}", max, min_depth),
                ));
            }
        }
        Ok(Self {
            min_depth,
            max_depth,
        })
    }

    fn from_spec(spec: &StageSpec, _registry: &Registry) -> Result<Box<dyn ObservationFilter>> {
        let args: DepthFilterArgs = spec.parse_args()?;
        let max_depth = match args.max_depth {
            None => None,
            Some(DepthBound::Value(v)) => Some(v),
            Some(DepthBound::Keyword(k)) if k == "auto" => None,
            Some(DepthBound::Keyword(k)) => {
                return Err(ConfigError::invalid(
                    "max_depth",
                    format!("expected a number or `auto`, found `{}`", k),
                ));
            }
        };
        Ok(Box::new(Self::new(args.min_depth, max_depth)?))
    }

    fn accepts(&self, z: f64) -> bool {
        z >= self.min_depth && self.max_depth.is_none_or(|max| z <= max)
    }
}

impl ObservationFilter for SimpleDepthFilter {
    fn keep(&self, observations: &[Observation]) -> Vec<bool> {
        observations
            .iter()
            .map(|obs| self.accepts(obs.depth_prev()) && self.accepts(obs.depth_cur()))
            .collect()
    }
}

#[derive(Deserialize)]
struct ComposeArgs {
    #[serde(default)]
    filter_args: Vec<StageSpec>,
}

/// Chain of filters; an observation survives only if every filter keeps it.
pub struct FilterCompose {
    filters: Vec<Box<dyn ObservationFilter>>,
}

impl FilterCompose {
    pub fn new(filters: Vec<Box<dyn ObservationFilter>>) -> Self {
        Self { filters }
    }

    fn from_spec(spec: &StageSpec, registry: &Registry) -> Result<Box<dyn ObservationFilter>> {
        let args: ComposeArgs = spec.parse_args()?;
        let filters = args
            .filter_args
            .iter()
            .map(|child| registry.outlier.build(child, registry))
            .collect::<Result<Vec<_>>>()?;
        debug!("FilterCompose with {} filters", filters.len());
        Ok(Box::new(Self::new(filters)))
    }
}

impl ObservationFilter for FilterCompose {
    fn keep(&self, observations: &[Observation]) -> Vec<bool> {
        let mut keep = vec![true; observations.len()];
        for filter in &self.filters {
            for (k, f) in keep.iter_mut().zip(filter.keep(observations)) {
                *k &= f;
            }
        }
        keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point2, Point3};

    fn obs(z_prev: f64, z_cur: f64) -> Observation {
        Observation {
            pixel_prev: Point2::new(0.0, 0.0),
            pixel_cur: Point2::new(0.0, 0.0),
            point_prev: Point3::new(0.0, 0.0, z_prev),
            point_cur: Point3::new(0.0, 0.0, z_cur),
        }
    }

    fn build(text: &str) -> Result<Box<dyn ObservationFilter>> {
        let registry = Registry::builtin();
        let spec: StageSpec = serde_yaml::from_str(text).unwrap();
        registry.outlier.build(&spec, &registry)
    }

    #[test]
    fn auto_max_depth_is_unbounded() {
        let filter = build("type: SimpleDepthFilter\nargs: {min_depth: 0.05, max_depth: auto}\n")
            .ok()
            .unwrap();
        let kept = filter.keep(&[obs(0.01, 1.0), obs(1.0, 1.0), obs(1e6, 2e6)]);
        assert_eq!(kept, vec![false, true, true]);
    }

    #[test]
    fn numeric_max_depth_bounds_both_frames() {
        let filter = build("type: SimpleDepthFilter\nargs: {min_depth: 0.1, max_depth: 10}\n")
            .ok()
            .unwrap();
        let kept = filter.keep(&[obs(5.0, 11.0), obs(5.0, 9.0), obs(0.05, 1.0)]);
        assert_eq!(kept, vec![false, true, false]);
    }

    #[test]
    fn range_is_validated() {
        for args in [
            "{min_depth: -1.0}",
            "{min_depth: 2.0, max_depth: 1.0}",
            "{min_depth: 0.05, max_depth: far}",
        ] {
            let err = build(&format!("type: SimpleDepthFilter\nargs: {}\n", args))
                .err()
                .unwrap();
            assert!(matches!(err, ConfigError::InvalidArgument { .. }), "{}: {}", args, err);
        }
    }

    #[test]
    fn compose_is_a_logical_and() {
        let filter = build(
            "type: FilterCompose\nargs:\n  filter_args:\n\
             \x20   - {type: SimpleDepthFilter, args: {min_depth: 1.0}}\n\
             \x20   - {type: SimpleDepthFilter, args: {min_depth: 0.0, max_depth: 5.0}}\n",
        )
        .ok()
        .unwrap();
        let kept = filter.keep(&[obs(0.5, 0.5), obs(2.0, 2.0), obs(6.0, 2.0)]);
        assert_eq!(kept, vec![false, true, false]);
    }

    #[test]
    fn empty_compose_keeps_everything() {
        let filter = build("type: FilterCompose\nargs:\n").ok().unwrap();
        assert_eq!(filter.keep(&[obs(-1.0, 0.0)]), vec![true]);
    }

    #[test]
    fn compose_children_must_be_filters() {
        let err = build("type: FilterCompose\nargs:\n  filter_args:\n    - {type: AllKeyframe}\n")
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::UnknownComponentType { .. }), "{}", err);
    }
}
