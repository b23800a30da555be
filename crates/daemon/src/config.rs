// SPDX-License-Identifier: MIT

//! Daemon configuration: paths rooted at a single state directory plus the
//! `loom-scheduler`/`loom-pipeline` option sets, using fixed well-known
//! paths under one state root rather than a scattered set of flags.

use loom_pipeline::PipelineConfig;
use loom_scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory for the WAL, snapshot, and lock file.
    pub state_dir: PathBuf,
    pub scheduler: SchedulerConfig,
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self { state_dir: PathBuf::from("./loomd-state"), scheduler: SchedulerConfig::default(), pipeline: PipelineConfig::default() }
    }
}

impl Config {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self { state_dir: state_dir.into(), ..Default::default() }
    }

    /// Load a TOML config file, falling back to defaults for any field it
    /// omits (`#[serde(default)]` on every struct in the chain).
    pub fn load(path: &Path) -> Result<Self, crate::error::LifecycleError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("loomd.pid")
    }
}
