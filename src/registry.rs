//! Component registry: type name -> factory, one table per category.
//!
//! All built-in implementations are registered in [`Registry::builtin`].
//! Extra implementations can be added with [`Catalog::register`] before the
//! pipeline is assembled.

use crate::error::{ConfigError, Result};
use crate::schema::{Stage, StageSpec};
use crate::stages::{
    Covariance, DepthEstimator, Frontend, KeyframePolicy, KeypointSelector, Matcher, MotionModel,
    ObservationFilter, Optimizer, Postprocess,
};
use std::collections::BTreeMap;
use std::fmt;

/// Registry category. The eight pipeline stages plus the two frontend
/// sub-stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Cov,
    Keypoint,
    Frontend,
    Depth,
    Match,
    Motion,
    Outlier,
    Postprocess,
    Keyframe,
    Optimizer,
}

impl Category {
    pub fn name(self) -> &'static str {
        match self {
            Category::Cov => "cov",
            Category::Keypoint => "keypoint",
            Category::Frontend => "frontend",
            Category::Depth => "depth",
            Category::Match => "match",
            Category::Motion => "motion",
            Category::Outlier => "outlier",
            Category::Postprocess => "postprocess",
            Category::Keyframe => "keyframe",
            Category::Optimizer => "optimizer",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Stage> for Category {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Cov => Category::Cov,
            Stage::Keypoint => Category::Keypoint,
            Stage::Frontend => Category::Frontend,
            Stage::Motion => Category::Motion,
            Stage::Outlier => Category::Outlier,
            Stage::Postprocess => Category::Postprocess,
            Stage::Keyframe => Category::Keyframe,
            Stage::Optimizer => Category::Optimizer,
        }
    }
}

/// Builds one implementation from its spec. Composite stages use the
/// registry to build their children.
pub type Factory<T> = fn(&StageSpec, &Registry) -> Result<Box<T>>;

/// Factories for a single category.
pub struct Catalog<T: ?Sized> {
    category: Category,
    factories: BTreeMap<String, Factory<T>>,
}

impl<T: ?Sized> Catalog<T> {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            factories: BTreeMap::new(),
        }
    }

    /// Register `factory` under `type_name`, returning the one it replaces.
    pub fn register(&mut self, type_name: &str, factory: Factory<T>) -> Option<Factory<T>> {
        self.factories.insert(type_name.to_string(), factory)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn resolve(&self, type_name: &str) -> Result<Factory<T>> {
        self.factories
            .get(type_name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownComponentType {
                category: self.category,
                type_name: type_name.to_string(),
                known: self.names(),
            })
    }

    /// Resolve `spec.type_name` and run its factory.
    pub fn build(&self, spec: &StageSpec, registry: &Registry) -> Result<Box<T>> {
        let factory = self.resolve(&spec.type_name)?;
        factory(spec, registry)
    }
}

pub struct Registry {
    pub cov: Catalog<dyn Covariance>,
    pub keypoint: Catalog<dyn KeypointSelector>,
    pub frontend: Catalog<dyn Frontend>,
    pub depth: Catalog<dyn DepthEstimator>,
    pub matcher: Catalog<dyn Matcher>,
    pub motion: Catalog<dyn MotionModel>,
    pub outlier: Catalog<dyn ObservationFilter>,
    pub postprocess: Catalog<dyn Postprocess>,
    pub keyframe: Catalog<dyn KeyframePolicy>,
    pub optimizer: Catalog<dyn Optimizer>,
}

impl Registry {
    /// Registry without any factory.
    pub fn empty() -> Self {
        Self {
            cov: Catalog::new(Category::Cov),
            keypoint: Catalog::new(Category::Keypoint),
            frontend: Catalog::new(Category::Frontend),
            depth: Catalog::new(Category::Depth),
            matcher: Catalog::new(Category::Match),
            motion: Catalog::new(Category::Motion),
            outlier: Catalog::new(Category::Outlier),
            postprocess: Catalog::new(Category::Postprocess),
            keyframe: Catalog::new(Category::Keyframe),
            optimizer: Catalog::new(Category::Optimizer),
        }
    }

    /// Registry holding every built-in implementation.
    pub fn builtin() -> Self {
        use crate::stages::*;

        let mut registry = Self::empty();
        cov::register(&mut registry.cov);
        keypoint::register(&mut registry.keypoint);
        frontend::register(&mut registry.frontend);
        frontend::register_depth(&mut registry.depth);
        frontend::register_matcher(&mut registry.matcher);
        motion::register(&mut registry.motion);
        outlier::register(&mut registry.outlier);
        postprocess::register(&mut registry.postprocess);
        keyframe::register(&mut registry.keyframe);
        optimizer::register(&mut registry.optimizer);
        registry
    }

    /// Registered names of `category`.
    pub fn names(&self, category: Category) -> Vec<String> {
        match category {
            Category::Cov => self.cov.names(),
            Category::Keypoint => self.keypoint.names(),
            Category::Frontend => self.frontend.names(),
            Category::Depth => self.depth.names(),
            Category::Match => self.matcher.names(),
            Category::Motion => self.motion.names(),
            Category::Outlier => self.outlier.names(),
            Category::Postprocess => self.postprocess.names(),
            Category::Keyframe => self.keyframe.names(),
            Category::Optimizer => self.optimizer.names(),
        }
    }

    /// Check that `type_name` is registered for `category`.
    pub fn ensure(&self, category: Category, type_name: &str) -> Result<()> {
        let known = self.names(category);
        if known.iter().any(|n| n == type_name) {
            Ok(())
        } else {
            Err(ConfigError::UnknownComponentType {
                category,
                type_name: type_name.to_string(),
                known,
            })
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use pretty_assertions::assert_eq;

    struct Never;

    impl KeyframePolicy for Never {
        fn is_keyframe(&mut self, _frame: &Frame) -> bool {
            false
        }
    }

    fn never(_: &StageSpec, _: &Registry) -> Result<Box<dyn KeyframePolicy>> {
        Ok(Box::new(Never))
    }

    #[test]
    fn builtin_names_per_category() {
        let registry = Registry::builtin();
        assert_eq!(
            registry.names(Category::Keyframe),
            vec!["AllKeyframe", "UniformKeyframe"]
        );
        assert_eq!(
            registry.names(Category::Cov),
            vec!["DepthCovariance", "NoCovariance"]
        );
        assert!(registry.depth.contains("FlowFormerDepth"));
        assert!(registry.matcher.contains("GTMatcher"));
        assert!(registry.optimizer.contains("PyPoseTwoFramePGO"));
    }

    #[test]
    fn unknown_type_names_its_category() {
        let registry = Registry::builtin();
        let err = registry
            .keypoint
            .build(&StageSpec::new("NotARealSelector"), &registry)
            .err()
            .unwrap();
        match err {
            ConfigError::UnknownComponentType {
                category,
                type_name,
                known,
            } => {
                assert_eq!(category, Category::Keypoint);
                assert_eq!(type_name, "NotARealSelector");
                assert!(known.contains(&"RandomSelector".to_string()));
            }
            other => panic!("unexpected error: {}", other),
        }

        assert!(registry.ensure(Category::Match, "GTMatcher").is_ok());
        assert!(registry.ensure(Category::Depth, "GTMatcher").is_err());
    }

    #[test]
    fn custom_factories_can_be_added() {
        let mut registry = Registry::builtin();
        assert!(registry.keyframe.register("NeverKeyframe", never).is_none());

        let spec = StageSpec::new("NeverKeyframe");
        let mut policy = registry.keyframe.build(&spec, &registry).unwrap();
        let frame = Frame::new(0, 4, 4, crate::frame::Intrinsics::new(1.0, 1.0, 2.0, 2.0));
        assert!(!policy.is_keyframe(&frame));
    }
}
