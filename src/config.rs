//! Generation configuration.
//!
//! One explicit object replaces process-wide tunables. It can be loaded from
//! JSON (camelCase keys), overridden from the command line, and is validated
//! before any generation starts.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coordinator::CoordinatorSettings;
use crate::error::{Result, TerrainError};
use crate::fault::{FaultKind, FaultParams};
use crate::grid::check_dimensions;
use crate::hydrology::MoistureMode;
use crate::seeds::GenerationSeeds;
use crate::worker::WorkerBackend;

/// Settings for one terrain session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Map width in cells
    pub width: usize,
    /// Map height in cells
    pub height: usize,
    /// Total fault count across all workers
    pub iterations: usize,
    /// Parallel shares, the local one included
    pub worker_count: usize,
    /// Target submerged fraction (0.67 leaves about a third of the map dry)
    pub land_percent: f64,
    /// Rivers simulated for the moisture map
    pub moisture_iterations: usize,
    pub moisture_mode: MoistureMode,
    pub fault_shape: FaultKind,
    pub worker_timeout_secs: u64,
    /// Rerun unresponsive shares locally instead of failing
    pub fallback_to_local: bool,
    /// Run shares in `fault_worker` processes instead of threads
    pub worker_program: Option<PathBuf>,
    /// Fixed master seed (random when absent)
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 256,
            iterations: 1000,
            worker_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            land_percent: 0.67,
            moisture_iterations: 2000,
            moisture_mode: MoistureMode::Rivers,
            fault_shape: FaultKind::Disk,
            worker_timeout_secs: 60,
            fallback_to_local: true,
            worker_program: None,
            seed: None,
        }
    }
}

impl GenerationConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn validate(&self) -> Result<()> {
        check_dimensions(self.width, self.height)?;
        if self.iterations == 0 {
            return Err(TerrainError::InvalidArgument("iterations must be positive".into()));
        }
        if self.worker_count == 0 {
            return Err(TerrainError::InvalidArgument("workerCount must be positive".into()));
        }
        check_land_percent(self.land_percent)?;
        if self.worker_timeout_secs == 0 {
            return Err(TerrainError::InvalidArgument("workerTimeoutSecs must be positive".into()));
        }
        Ok(())
    }

    pub fn backend(&self) -> WorkerBackend {
        match &self.worker_program {
            Some(program) => WorkerBackend::subprocess(program.clone()),
            None => WorkerBackend::InProcess,
        }
    }

    pub fn fault_params(&self) -> FaultParams {
        FaultParams {
            kind: self.fault_shape,
            ..FaultParams::default()
        }
    }

    /// Coordinator settings for one elevation build.
    pub fn coordinator_settings(&self, seeds: GenerationSeeds) -> CoordinatorSettings {
        CoordinatorSettings {
            width: self.width,
            height: self.height,
            iterations: self.iterations,
            worker_count: self.worker_count,
            fault: self.fault_params(),
            backend: self.backend(),
            worker_timeout: Duration::from_secs(self.worker_timeout_secs),
            fallback_to_local: self.fallback_to_local,
            seeds,
        }
    }
}

pub(crate) fn check_land_percent(percent: f64) -> Result<()> {
    if !(0.0..1.0).contains(&percent) {
        return Err(TerrainError::InvalidArgument(format!(
            "landPercent must be in [0, 1), got {}",
            percent
        )));
    }
    Ok(())
}
