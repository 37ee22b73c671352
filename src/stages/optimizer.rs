//! Two-frame pose refinement.

use super::{OptimizationJob, Optimizer};
use crate::error::{ConfigError, Result};
use crate::frame::Observation;
use crate::registry::{Catalog, Registry};
use crate::schema::{Device, StageSpec};
use log::{debug, info, warn};
use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::Deserialize;
use std::sync::{Mutex, mpsc};
use std::thread::{self, JoinHandle};

pub(crate) fn register(catalog: &mut Catalog<dyn Optimizer>) {
    catalog.register("PyPoseTwoFramePGO", TwoFramePGO::from_spec);
}

/// Fewer correspondences than this leave the motion prior untouched.
const MIN_OBSERVATIONS: usize = 3;

#[derive(Debug, Clone, Deserialize)]
struct PgoArgs {
    device: Device,
    #[serde(default)]
    vectorize: bool,
    #[serde(default)]
    parallel: bool,
}

/// Two-frame pose refinement.
///
/// Sequential mode solves each job inside `submit`. Parallel mode hands jobs
/// to a worker thread and only waits for the answer in `write_back`.
pub struct TwoFramePGO {
    pub device: Device,
    pub vectorize: bool,
    worker: Option<Worker>,
    /// Result of the last job solved in place.
    solved: Option<Isometry3<f64>>,
    /// A job is on the worker and its result has not been read yet.
    job_on_worker: bool,
}

impl TwoFramePGO {
    pub fn sequential(device: Device) -> Self {
        Self {
            device,
            vectorize: false,
            worker: None,
            solved: None,
            job_on_worker: false,
        }
    }

    pub fn parallel(device: Device) -> Result<Self> {
        Ok(Self {
            worker: Some(Worker::spawn()?),
            ..Self::sequential(device)
        })
    }

    pub fn is_parallel(&self) -> bool {
        self.worker.is_some()
    }

    fn from_spec(spec: &StageSpec, _registry: &Registry) -> Result<Box<dyn Optimizer>> {
        let args: PgoArgs = spec.parse_args()?;
        info!(
            "two-frame PGO on {} (vectorize={}, parallel={})",
            args.device, args.vectorize, args.parallel
        );
        let mut pgo = if args.parallel {
            Self::parallel(args.device)?
        } else {
            Self::sequential(args.device)
        };
        pgo.vectorize = args.vectorize;
        Ok(Box::new(pgo))
    }
}

impl Optimizer for TwoFramePGO {
    fn submit(&mut self, job: OptimizationJob) {
        let Some(worker) = &self.worker else {
            self.solved = Some(solve(&job));
            return;
        };
        // An unread result would be paired with the wrong job.
        if self.job_on_worker {
            debug!("discarding unread optimizer result");
            worker.recv();
        }
        match worker.send(job) {
            Ok(()) => self.job_on_worker = true,
            Err(job) => {
                warn!("optimizer worker is gone, solving in place");
                self.worker = None;
                self.solved = Some(solve(&job));
            }
        }
    }

    fn write_back(&mut self) -> Option<Isometry3<f64>> {
        if let Some(solved) = self.solved.take() {
            return Some(solved);
        }
        if !self.job_on_worker {
            return None;
        }
        self.job_on_worker = false;
        let result = self.worker.as_ref().and_then(Worker::recv);
        if result.is_none() {
            warn!("optimizer worker stopped before answering");
            self.worker = None;
        }
        result
    }

    fn terminate(&mut self) {
        if let Some(worker) = self.worker.take() {
            if self.job_on_worker {
                self.solved = worker.recv();
                self.job_on_worker = false;
            }
        }
    }
}

/// Background thread solving jobs in submission order. Dropping it closes
/// the job channel and joins the thread.
struct Worker {
    jobs: Option<mpsc::Sender<OptimizationJob>>,
    results: Mutex<mpsc::Receiver<Isometry3<f64>>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn() -> Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<OptimizationJob>();
        let (result_tx, result_rx) = mpsc::channel::<Isometry3<f64>>();

        let handle = thread::Builder::new()
            .name("pgo-worker".to_string())
            .spawn(move || {
                debug!("optimizer worker started");
                for job in job_rx {
                    if result_tx.send(solve(&job)).is_err() {
                        break;
                    }
                }
                debug!("optimizer worker stopped");
            })
            .map_err(|e| ConfigError::invalid("parallel", format!("cannot start optimizer worker: {}", e)))?;

        Ok(Self {
            jobs: Some(job_tx),
            results: Mutex::new(result_rx),
            handle: Some(handle),
        })
    }

    fn send(&self, job: OptimizationJob) -> std::result::Result<(), OptimizationJob> {
        match &self.jobs {
            Some(tx) => tx.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }

    fn recv(&self) -> Option<Isometry3<f64>> {
        self.results.lock().ok()?.recv().ok()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.jobs = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Weighted rigid alignment of current-frame points onto previous-frame
/// points. The result maps current camera coordinates into the previous
/// camera, i.e. it is the current pose relative to the previous one.
fn solve(job: &OptimizationJob) -> Isometry3<f64> {
    if job.observations.len() < MIN_OBSERVATIONS {
        return job.prior;
    }
    align(&job.observations, &job.weights).unwrap_or(job.prior)
}

/// Weighted Kabsch alignment. `None` for degenerate weights or a
/// non-finite solution.
fn align(observations: &[Observation], weights: &[f64]) -> Option<Isometry3<f64>> {
    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if !(total > 0.0) {
        return None;
    }

    let mut src_mean = Vector3::zeros();
    let mut dst_mean = Vector3::zeros();
    for (obs, &w) in observations.iter().zip(weights) {
        let w = w.max(0.0);
        src_mean += obs.point_cur.coords * w;
        dst_mean += obs.point_prev.coords * w;
    }
    src_mean /= total;
    dst_mean /= total;

    let mut cross = Matrix3::zeros();
    for (obs, &w) in observations.iter().zip(weights) {
        let w = w.max(0.0);
        cross += (obs.point_cur.coords - src_mean) * (obs.point_prev.coords - dst_mean).transpose() * w;
    }

    let svd = cross.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let v = v_t.transpose();
    let d = (v * u.transpose()).determinant().signum();
    let rotation = v * Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, d)) * u.transpose();
    let translation = dst_mean - rotation * src_mean;

    if !(rotation.iter().all(|x| x.is_finite()) && translation.iter().all(|x| x.is_finite())) {
        return None;
    }

    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
    Some(Isometry3::from_parts(Translation3::from(translation), rotation))
}
