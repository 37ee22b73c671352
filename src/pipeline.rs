//! Pipeline assembly and the per-frame update loop.

use crate::error::{ConfigError, FrameError, Result};
use crate::frame::{FlowField, Frame, FrameUpdate, Intrinsics, Observation, TrajectoryPose, sample};
use crate::registry::{Catalog, Registry};
use crate::schema::{DatasetManifest, Device, PipelineConfig, Stage};
use crate::stages::{
    Covariance, Frontend, KeyframePolicy, KeypointSelector, MotionModel, ObservationFilter,
    OptimizationJob, Optimizer, Postprocess,
};
use log::{debug, info};
use nalgebra::{DMatrix, Isometry3, Point2};
use serde::Serialize;

/// Build every stage of `config`, in declaration order.
///
/// The first failing stage aborts assembly; no partial pipeline is returned.
pub fn assemble(config: &PipelineConfig, registry: &Registry) -> Result<Pipeline> {
    info!("assembling {} on {}", config.name, config.args.device);

    let pipeline = Pipeline {
        name: config.name.clone(),
        device: config.args.device,
        stage_types: config
            .stages()
            .map(|(stage, spec)| (stage, spec.type_name.clone()))
            .collect(),
        cov: build(&registry.cov, Stage::Cov, config, registry)?,
        keypoint: build(&registry.keypoint, Stage::Keypoint, config, registry)?,
        frontend: build(&registry.frontend, Stage::Frontend, config, registry)?,
        motion: build(&registry.motion, Stage::Motion, config, registry)?,
        outlier: build(&registry.outlier, Stage::Outlier, config, registry)?,
        postprocess: build(&registry.postprocess, Stage::Postprocess, config, registry)?,
        keyframe: build(&registry.keyframe, Stage::Keyframe, config, registry)?,
        optimizer: build(&registry.optimizer, Stage::Optimizer, config, registry)?,
        previous: None,
        trajectory: Vec::new(),
    };
    Ok(pipeline)
}

fn build<T: ?Sized>(
    catalog: &Catalog<T>,
    stage: Stage,
    config: &PipelineConfig,
    registry: &Registry,
) -> Result<Box<T>> {
    let spec = config.effective_stage(stage);
    let built = catalog
        .build(&spec, registry)
        .map_err(|e| e.in_stage(stage.key()))?;
    info!("  {:<12} {}", stage.key(), spec.type_name);
    Ok(built)
}

/// What the next frame needs from the current one.
struct Tracked {
    depth: DMatrix<f32>,
    keypoints: Vec<Point2<f32>>,
    intrinsics: Intrinsics,
}

/// Fully assembled odometry pipeline.
pub struct Pipeline {
    name: String,
    device: Device,
    stage_types: Vec<(Stage, String)>,
    cov: Box<dyn Covariance>,
    keypoint: Box<dyn KeypointSelector>,
    frontend: Box<dyn Frontend>,
    motion: Box<dyn MotionModel>,
    outlier: Box<dyn ObservationFilter>,
    postprocess: Box<dyn Postprocess>,
    keyframe: Box<dyn KeyframePolicy>,
    optimizer: Box<dyn Optimizer>,
    previous: Option<Tracked>,
    trajectory: Vec<TrajectoryPose>,
}

/// Serializable description of an assembled pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub name: String,
    pub device: String,
    pub stages: Vec<StageSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub stage: Stage,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Report printed by `check --json`.
#[derive(Debug, Serialize)]
pub struct CheckReport<'a> {
    pub pipeline: PipelineSummary,
    pub datasets: Option<&'a DatasetManifest>,
}

impl CheckReport<'_> {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::parse("check report", e))
    }
}

impl Pipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// `(stage, type)` for all eight stages, in declaration order.
    pub fn stage_types(&self) -> &[(Stage, String)] {
        &self.stage_types
    }

    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            name: self.name.clone(),
            device: self.device.to_string(),
            stages: self
                .stage_types
                .iter()
                .map(|(stage, type_name)| StageSummary {
                    stage: *stage,
                    type_name: type_name.clone(),
                })
                .collect(),
        }
    }

    /// Poses estimated so far, before postprocessing.
    pub fn trajectory(&self) -> &[TrajectoryPose] {
        &self.trajectory
    }

    /// Feed one frame through every stage.
    ///
    /// A failed frame leaves the pipeline as it was: the next frame is
    /// tracked against the last frame that succeeded.
    pub fn update(&mut self, frame: &Frame) -> std::result::Result<FrameUpdate, FrameError> {
        let is_keyframe = self.keyframe.is_keyframe(frame);
        let output = self.frontend.estimate(frame, self.previous.is_some())?;

        let mut relative = Isometry3::identity();
        let mut submitted = None;
        let (mut observations, mut rejected) = (0, 0);
        match (self.previous.as_ref(), output.flow.as_ref()) {
            (Some(previous), Some(flow)) => {
                let tracked = track(frame, previous, flow, &output.depth)?;
                let weights = self.cov.weights(&tracked);
                let keep = self.outlier.keep(&tracked);
                let total = tracked.len();

                let (kept, weights): (Vec<Observation>, Vec<f64>) = tracked
                    .into_iter()
                    .zip(weights)
                    .zip(keep)
                    .filter(|(_, k)| *k)
                    .map(|(pair, _)| pair)
                    .unzip();
                observations = kept.len();
                rejected = total - kept.len();

                let prior = self.motion.predict(frame);
                self.optimizer.submit(OptimizationJob {
                    prior,
                    observations: kept,
                    weights,
                });
                submitted = Some(prior);
            }
            (Some(_), None) => relative = self.motion.predict(frame),
            (None, _) => {}
        }

        // Runs while a parallel optimizer works on the submitted job.
        let keypoints = self.keypoint.select(frame, &output.depth);
        if let Some(prior) = submitted {
            relative = self.optimizer.write_back().unwrap_or(prior);
        }

        let pose = match self.trajectory.last() {
            Some(last) => last.pose * relative,
            None => Isometry3::identity(),
        };
        self.trajectory.push(TrajectoryPose {
            index: frame.index,
            pose,
            is_keyframe,
        });

        debug!(
            "frame {}: {} observations, {} rejected, {} new keypoints",
            frame.index,
            observations,
            rejected,
            keypoints.len()
        );
        self.previous = Some(Tracked {
            depth: output.depth,
            keypoints,
            intrinsics: frame.intrinsics,
        });

        Ok(FrameUpdate {
            index: frame.index,
            is_keyframe,
            pose,
            relative,
            observations,
            rejected,
        })
    }

    /// Stop background work, run the postprocessor and hand back the final
    /// trajectory.
    pub fn finish(mut self) -> Vec<TrajectoryPose> {
        self.optimizer.terminate();
        self.postprocess.process(&mut self.trajectory);
        self.trajectory
    }
}

/// Lift the previous keypoints and their flow-tracked positions to 3D.
/// Keypoints leaving the image are dropped.
fn track(
    frame: &Frame,
    previous: &Tracked,
    flow: &FlowField,
    depth: &DMatrix<f32>,
) -> std::result::Result<Vec<Observation>, FrameError> {
    if flow.shape() != previous.depth.shape() {
        return Err(FrameError::ShapeMismatch {
            frame: frame.index,
            what: "flow",
            expected: previous.depth.shape(),
            actual: flow.shape(),
        });
    }

    let observations = previous
        .keypoints
        .iter()
        .filter_map(|&kp| {
            let z_prev = sample(&previous.depth, kp)?;
            let cur = kp + flow.at(kp)?;
            let z_cur = sample(depth, cur)?;
            Some(Observation {
                pixel_prev: kp,
                pixel_cur: cur,
                point_prev: previous.intrinsics.back_project(kp, z_prev as f64),
                point_cur: frame.intrinsics.back_project(cur, z_cur as f64),
            })
        })
        .collect();
    Ok(observations)
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("device", &self.device)
            .field("stages", &self.stage_types)
            .field("frames", &self.trajectory.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoadOptions, load_str};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    const GT_PIPELINE: &str = r#"
Odometry:
  name: gt
  args: {device: cpu}
  cov: {type: NoCovariance}
  keypoint: {type: GridSelector, args: {num_point: 64, mask_width: 4}}
  frontend: {type: FrontendCompose, args: {depth: {type: GTDepth}, match: {type: GTMatcher}}}
  motion: {type: StaticMotionModel}
  outlier:
    type: FilterCompose
    args:
      filter_args:
        - {type: SimpleDepthFilter, args: {min_depth: 0.05, max_depth: auto}}
  postprocess: {type: NaivePostprocess}
  keyframe: {type: AllKeyframe}
  optimizer: {type: PyPoseTwoFramePGO, args: {device: cpu}}
"#;

    const WIDTH: usize = 64;
    const HEIGHT: usize = 48;

    fn config(text: &str) -> PipelineConfig {
        let doc = load_str(text, "inline.yaml", &LoadOptions::default()).unwrap();
        PipelineConfig::from_document(&doc).unwrap()
    }

    fn frame(index: usize) -> Frame {
        Frame::new(index, WIDTH, HEIGHT, Intrinsics::new(100.0, 100.0, 32.0, 24.0))
            .with_depth(DMatrix::from_element(HEIGHT, WIDTH, 2.0))
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn pipeline_is_send_and_sync() {
        assert_send_sync::<Pipeline>();
    }

    #[test]
    fn assembles_all_eight_stages() {
        let pipeline = assemble(&config(GT_PIPELINE), &Registry::builtin()).unwrap();
        assert_eq!(pipeline.stage_types().len(), 8);
        let stages: Vec<Stage> = pipeline.stage_types().iter().map(|(s, _)| *s).collect();
        assert_eq!(stages, Stage::ALL.to_vec());
        assert_eq!(pipeline.device(), Device::Cpu);
    }

    #[test]
    fn failing_stage_is_named() {
        let text = GT_PIPELINE.replace("GridSelector", "NotARealSelector");
        let err = assemble(&config(&text), &Registry::builtin()).unwrap_err();
        assert_eq!(err.failed_stage(), Some("keypoint"));
        match err {
            ConfigError::StageConstruction { source, .. } => {
                assert!(matches!(*source, ConfigError::UnknownComponentType { .. }))
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn recovers_lateral_translation_from_ground_truth() {
        let mut pipeline = assemble(&config(GT_PIPELINE), &Registry::builtin()).unwrap();

        let first = pipeline.update(&frame(0)).unwrap();
        assert_eq!(first.pose, Isometry3::identity());
        assert_eq!(first.observations, 0);

        // Camera moves 0.1 m along +x; at depth 2 the scene shifts 5 px left.
        let second = frame(1).with_flow(FlowField::constant(HEIGHT, WIDTH, -5.0, 0.0));
        let update = pipeline.update(&second).unwrap();
        assert!(update.observations >= 3, "{}", update.observations);
        assert_eq!(update.rejected, 0);
        assert_relative_eq!(update.pose.translation.vector, Vector3::new(0.1, 0.0, 0.0), epsilon = 1e-6);

        let third = frame(2).with_flow(FlowField::constant(HEIGHT, WIDTH, -5.0, 0.0));
        let update = pipeline.update(&third).unwrap();
        assert_relative_eq!(update.pose.translation.vector, Vector3::new(0.2, 0.0, 0.0), epsilon = 1e-6);

        let trajectory = pipeline.finish();
        assert_eq!(trajectory.len(), 3);
        assert!(trajectory.iter().all(|p| p.is_keyframe));
    }

    #[test]
    fn depth_filter_rejects_everything_too_close() {
        let text = GT_PIPELINE.replace("min_depth: 0.05", "min_depth: 3.0");
        let mut pipeline = assemble(&config(&text), &Registry::builtin()).unwrap();
        pipeline.update(&frame(0)).unwrap();
        let update = pipeline
            .update(&frame(1).with_flow(FlowField::constant(HEIGHT, WIDTH, -5.0, 0.0)))
            .unwrap();
        assert_eq!(update.observations, 0);
        assert!(update.rejected > 0);
        // StaticMotionModel prior survives.
        assert_eq!(update.relative, Isometry3::identity());
    }

    #[test]
    fn missing_flow_fails_the_frame() {
        let mut pipeline = assemble(&config(GT_PIPELINE), &Registry::builtin()).unwrap();
        pipeline.update(&frame(0)).unwrap();
        let err = pipeline.update(&frame(1)).unwrap_err();
        assert!(matches!(err, FrameError::MissingInput { .. }), "{}", err);
    }

    #[test]
    fn failed_frame_keeps_the_last_good_frame() {
        let mut pipeline = assemble(&config(GT_PIPELINE), &Registry::builtin()).unwrap();
        pipeline.update(&frame(0)).unwrap();

        let small = Frame::new(1, 32, 24, Intrinsics::new(50.0, 50.0, 16.0, 12.0))
            .with_depth(DMatrix::from_element(24, 32, 2.0))
            .with_flow(FlowField::constant(24, 32, -2.5, 0.0));
        let err = pipeline.update(&small).unwrap_err();
        assert!(matches!(err, FrameError::ShapeMismatch { .. }), "{}", err);
        assert_eq!(pipeline.trajectory().len(), 1);

        let update = pipeline
            .update(&frame(2).with_flow(FlowField::constant(HEIGHT, WIDTH, -5.0, 0.0)))
            .unwrap();
        assert!(update.observations >= 3, "{}", update.observations);
        assert_relative_eq!(update.relative.translation.vector, Vector3::new(0.1, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn invalid_flow_yields_no_observations() {
        let mut pipeline = assemble(&config(GT_PIPELINE), &Registry::builtin()).unwrap();
        pipeline.update(&frame(0)).unwrap();
        let update = pipeline
            .update(&frame(1).with_flow(FlowField::constant(HEIGHT, WIDTH, f32::NAN, 0.0)))
            .unwrap();
        assert_eq!(update.observations, 0);
        assert_eq!(update.rejected, 0);
        assert_eq!(update.relative, Isometry3::identity());
    }

    #[test]
    fn parallel_optimizer_gives_the_same_trajectory() {
        let run = |text: &str| {
            let mut pipeline = assemble(&config(text), &Registry::builtin()).unwrap();
            for i in 0..4 {
                let mut f = frame(i);
                if i > 0 {
                    f = f.with_flow(FlowField::constant(HEIGHT, WIDTH, -5.0, 1.0 * i as f32));
                }
                pipeline.update(&f).unwrap();
            }
            pipeline.finish()
        };

        let sequential = run(GT_PIPELINE);
        let parallel = run(&GT_PIPELINE.replace("args: {device: cpu}}", "args: {device: cpu, parallel: true}}"));
        assert!(GT_PIPELINE.contains("args: {device: cpu}}"));
        assert_eq!(sequential, parallel);
        assert_relative_eq!(parallel[1].pose.translation.vector.x, 0.1, epsilon = 1e-6);
    }

    #[test]
    fn check_report_serializes() {
        let pipeline = assemble(&config(GT_PIPELINE), &Registry::builtin()).unwrap();
        let datas: serde_yaml::Value = serde_yaml::from_str("- {type: TartanAir, name: a, root: /data}\n").unwrap();
        let manifest = DatasetManifest::resolve(&datas).unwrap();

        let json = CheckReport {
            pipeline: pipeline.summary(),
            datasets: Some(&manifest),
        }
        .to_json()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["pipeline"]["stages"][1]["stage"], "keypoint");
        assert_eq!(value["pipeline"]["stages"][1]["type"], "GridSelector");
        assert_eq!(value["datasets"][0]["root"], "/data");
    }

    #[test]
    fn check_report_rejects_keys_json_cannot_hold() {
        let pipeline = assemble(&config(GT_PIPELINE), &Registry::builtin()).unwrap();
        let datas: serde_yaml::Value =
            serde_yaml::from_str("- type: TartanAir\n  name: a\n  ? [1, 2]\n  : pair\n").unwrap();
        let manifest = DatasetManifest::resolve(&datas).unwrap();

        let err = CheckReport {
            pipeline: pipeline.summary(),
            datasets: Some(&manifest),
        }
        .to_json()
        .unwrap_err();
        assert!(matches!(err, ConfigError::ConfigParse { .. }), "{}", err);
    }
}
