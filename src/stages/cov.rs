//! Observation covariance models.

use super::Covariance;
use crate::error::{ConfigError, Result};
use crate::frame::Observation;
use crate::registry::{Catalog, Registry};
use crate::schema::StageSpec;
use serde::Deserialize;

pub(crate) fn register(catalog: &mut Catalog<dyn Covariance>) {
    catalog.register("NoCovariance", NoCovariance::from_spec);
    catalog.register("DepthCovariance", DepthCovariance::from_spec);
}

/// Every observation gets weight 1, which disables weighting downstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCovariance;

impl NoCovariance {
    fn from_spec(_spec: &StageSpec, _registry: &Registry) -> Result<Box<dyn Covariance>> {
        Ok(Box::new(NoCovariance))
    }
}

impl Covariance for NoCovariance {
    fn weights(&self, observations: &[Observation]) -> Vec<f64> {
        vec![1.0; observations.len()]
    }
}

/// Isotropic variance that grows with the square of the depth:
/// `depth_cov * z^2 + match_cov`. The weight is its inverse.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DepthCovariance {
    #[serde(default = "default_depth_cov")]
    pub depth_cov: f64,
    #[serde(default = "default_match_cov")]
    pub match_cov: f64,
}

fn default_depth_cov() -> f64 {
    0.01
}

fn default_match_cov() -> f64 {
    0.25
}

impl DepthCovariance {
    fn from_spec(spec: &StageSpec, _registry: &Registry) -> Result<Box<dyn Covariance>> {
        let cov: DepthCovariance = spec.parse_args()?;
        if !(cov.depth_cov >= 0.0 && cov.depth_cov.is_finite()) {
            return Err(ConfigError::invalid("depth_cov", "must be a finite value >= 0"));
        }
        if !(cov.match_cov > 0.0 && cov.match_cov.is_finite()) {
            return Err(ConfigError::invalid("match_cov", "must be a finite value > 0"));
        }
        Ok(Box::new(cov))
    }
}

impl Covariance for DepthCovariance {
    fn weights(&self, observations: &[Observation]) -> Vec<f64> {
        observations
            .iter()
            .map(|obs| {
                let z = obs.depth_cur();
                1.0 / (self.depth_cov * z * z + self.match_cov)
            })
            .collect()
    }
}
