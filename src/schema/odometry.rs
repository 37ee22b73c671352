//! The `Odometry` section: run-wide arguments plus one `StageSpec` per stage.

use super::{Device, Stage, StageSpec};
use crate::config::{ConfigDocument, kind};
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// Scalars under `Odometry.args`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdometryArgs {
    /// Device directive for the whole system. Stages may override it.
    pub device: Device,

    #[serde(default)]
    pub mapping: bool,

    /// Profile the run (handled by the stages that support it).
    #[serde(default)]
    pub profile: bool,

    /// Every other scalar (`edgewidth`, `match_cov_default`, ...), kept in
    /// declaration order.
    #[serde(flatten)]
    pub extra: Mapping,
}

/// Validated `Odometry` section. All eight stages are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub args: OdometryArgs,
    pub cov: StageSpec,
    pub keypoint: StageSpec,
    pub frontend: StageSpec,
    pub motion: StageSpec,
    pub outlier: StageSpec,
    pub postprocess: StageSpec,
    pub keyframe: StageSpec,
    pub optimizer: StageSpec,
}

const EDGE_WIDTH: &str = "edgewidth";
const MASK_WIDTH: &str = "mask_width";

fn default_name() -> String {
    "MACVO".to_string()
}

impl PipelineConfig {
    /// Read the `Odometry` section of a loaded document.
    pub fn from_document(doc: &ConfigDocument) -> Result<Self> {
        Self::from_value(doc.section("Odometry")?)
    }

    pub fn from_value(odometry: &Value) -> Result<Self> {
        let section = odometry.as_mapping().ok_or_else(|| {
            ConfigError::parse(
                "Odometry",
                format!("expected a mapping, found {}", kind(odometry)),
            )
        })?;

        // Checked up front so a missing stage is reported as that stage's failure.
        for stage in Stage::ALL {
            if !section.contains_key(stage.key()) {
                return Err(ConfigError::MissingField {
                    key: format!("Odometry.{}", stage),
                }
                .in_stage(stage.key()));
            }
        }

        serde_yaml::from_value(odometry.clone()).map_err(|e| ConfigError::parse("Odometry", e))
    }

    pub fn stage(&self, stage: Stage) -> &StageSpec {
        match stage {
            Stage::Cov => &self.cov,
            Stage::Keypoint => &self.keypoint,
            Stage::Frontend => &self.frontend,
            Stage::Motion => &self.motion,
            Stage::Outlier => &self.outlier,
            Stage::Postprocess => &self.postprocess,
            Stage::Keyframe => &self.keyframe,
            Stage::Optimizer => &self.optimizer,
        }
    }

    /// Spec handed to the stage factory. Run-wide arguments fill in what
    /// the stage leaves unset: `edgewidth` becomes the keypoint `mask_width`.
    pub fn effective_stage(&self, stage: Stage) -> StageSpec {
        let mut spec = self.stage(stage).clone();
        if stage == Stage::Keypoint && !spec.args.contains_key(MASK_WIDTH) {
            if let Some(edge) = self.args.extra.get(EDGE_WIDTH) {
                spec.args.insert(Value::from(MASK_WIDTH), edge.clone());
            }
        }
        spec
    }

    /// Stages in declaration order.
    pub fn stages(&self) -> impl Iterator<Item = (Stage, &StageSpec)> + '_ {
        Stage::ALL.into_iter().map(move |s| (s, self.stage(s)))
    }

    /// Canonical YAML form (`Odometry:` at the top), loadable again.
    pub fn to_yaml(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Document<'a> {
            #[serde(rename = "Odometry")]
            odometry: &'a PipelineConfig,
        }

        serde_yaml::to_string(&Document { odometry: self })
            .map_err(|e| ConfigError::parse("Odometry", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoadOptions, load_str};
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = r#"
Odometry:
  name: tiny
  args:
    device: cpu
    edgewidth: 32
  cov: {type: NoCovariance}
  keypoint: {type: GridSelector, args: {num_point: 10}}
  frontend: {type: FrontendCompose, args: {depth: {type: GTDepth}, match: {type: GTMatcher}}}
  motion: {type: StaticMotionModel}
  outlier: {type: FilterCompose, args: {filter_args: []}}
  postprocess: {type: NaivePostprocess}
  keyframe: {type: AllKeyframe}
  optimizer: {type: PyPoseTwoFramePGO, args: {device: cpu}}
"#;

    fn parse(text: &str) -> Result<PipelineConfig> {
        let doc = load_str(text, "inline.yaml", &LoadOptions::default())?;
        PipelineConfig::from_document(&doc)
    }

    #[test]
    fn reads_all_stages_in_order() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.name, "tiny");
        assert_eq!(config.args.device, Device::Cpu);
        assert!(!config.args.mapping);
        assert_eq!(config.args.extra.get("edgewidth").and_then(Value::as_u64), Some(32));

        let types: Vec<_> = config.stages().map(|(_, s)| s.type_name.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "NoCovariance",
                "GridSelector",
                "FrontendCompose",
                "StaticMotionModel",
                "FilterCompose",
                "NaivePostprocess",
                "AllKeyframe",
                "PyPoseTwoFramePGO"
            ]
        );
    }

    #[test]
    fn missing_stage_names_the_stage() {
        let text = MINIMAL.replace("  keyframe: {type: AllKeyframe}\n", "");
        match parse(&text).unwrap_err() {
            ConfigError::StageConstruction { stage, source } => {
                assert_eq!(stage, "keyframe");
                assert!(matches!(*source, ConfigError::MissingField { .. }));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn missing_device_is_a_parse_error() {
        let text = MINIMAL.replace("    device: cpu\n    edgewidth: 32\n", "    edgewidth: 32\n");
        let err = parse(&text).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigParse { .. }), "{}", err);
        assert!(err.to_string().contains("device"), "{}", err);
    }

    #[test]
    fn edgewidth_fills_missing_mask_width() {
        let config = parse(MINIMAL).unwrap();
        let keypoint = config.effective_stage(Stage::Keypoint);
        assert_eq!(keypoint.args.get("mask_width").and_then(Value::as_u64), Some(32));
        // The declared stage itself is untouched.
        assert!(config.keypoint.args.get("mask_width").is_none());

        let text = MINIMAL.replace("{num_point: 10}", "{num_point: 10, mask_width: 4}");
        let config = parse(&text).unwrap();
        let keypoint = config.effective_stage(Stage::Keypoint);
        assert_eq!(keypoint.args.get("mask_width").and_then(Value::as_u64), Some(4));

        let text = MINIMAL.replace("    edgewidth: 32\n", "");
        let config = parse(&text).unwrap();
        assert!(config.effective_stage(Stage::Keypoint).args.get("mask_width").is_none());
    }

    #[test]
    fn yaml_round_trip_is_lossless() {
        let config = parse(MINIMAL).unwrap();
        let again = parse(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(again, config);
    }
}
