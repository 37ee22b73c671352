//! Result directories for experiment runs.
//!
//! Layout: `<root>/<odometry>@<dataset>/run_NNN/config.yaml`. Run numbers
//! start at 0 and never reuse an existing directory.

use crate::error::{ConfigError, Result};
use crate::schema::{DatasetDescriptor, PipelineConfig};
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.yaml";
const RUN_PREFIX: &str = "run_";

/// `<odometry>@<dataset>`, with path separators replaced.
pub fn project_name(odometry: &str, dataset: &str) -> String {
    format!("{}@{}", odometry, dataset)
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}

/// Everything needed to reproduce one run, as written to `config.yaml`.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "Odometry")]
    pub odometry: PipelineConfig,
    #[serde(rename = "Data")]
    pub data: RunData,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunData {
    pub args: DatasetDescriptor,
    pub start_idx: i64,
    /// `-1` runs to the end of the sequence.
    pub end_idx: i64,
}

impl RunConfig {
    pub fn new(odometry: &PipelineConfig, dataset: &DatasetDescriptor, start_idx: i64, end_idx: i64) -> Self {
        Self {
            project: project_name(&odometry.name, &dataset.name),
            odometry: odometry.clone(),
            data: RunData {
                args: dataset.clone(),
                start_idx,
                end_idx,
            },
        }
    }
}

#[derive(Debug)]
pub struct Sandbox {
    folder: PathBuf,
    autoremove: bool,
}

impl Sandbox {
    /// Create the next free `run_NNN` directory under `root/project`.
    pub fn create(root: &Path, project: &str) -> Result<Self> {
        let project_dir = root.join(project);
        fs::create_dir_all(&project_dir).map_err(|source| ConfigError::Io {
            path: project_dir.clone(),
            source,
        })?;

        let next = next_run(&project_dir)?;
        let folder = project_dir.join(format!("{}{:03}", RUN_PREFIX, next));
        fs::create_dir(&folder).map_err(|source| ConfigError::Io {
            path: folder.clone(),
            source,
        })?;
        info!("sandbox {}", folder.display());
        Ok(Self {
            folder,
            autoremove: false,
        })
    }

    /// Delete the run directory when the sandbox is dropped, whether the run
    /// finished or unwound.
    pub fn set_autoremove(&mut self) {
        self.autoremove = true;
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn config_path(&self) -> PathBuf {
        self.folder.join(CONFIG_FILE)
    }

    pub fn write_config(&self, config: &RunConfig) -> Result<PathBuf> {
        let path = self.config_path();
        let text = serde_yaml::to_string(config)
            .map_err(|e| ConfigError::parse(path.display().to_string(), e))?;
        fs::write(&path, text).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if !self.autoremove {
            return;
        }
        match fs::remove_dir_all(&self.folder) {
            Ok(()) => info!("removed sandbox {}", self.folder.display()),
            Err(e) => warn!("cannot remove sandbox {}: {}", self.folder.display(), e),
        }
    }
}

fn next_run(project_dir: &Path) -> Result<u32> {
    let entries = fs::read_dir(project_dir).map_err(|source| ConfigError::Io {
        path: project_dir.to_path_buf(),
        source,
    })?;

    let last = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()?
                .strip_prefix(RUN_PREFIX)?
                .parse::<u32>()
                .ok()
        })
        .max();
    Ok(last.map_or(0, |n| n + 1))
}
