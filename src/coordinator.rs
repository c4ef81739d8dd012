//! Parallel elevation builds.
//!
//! The total fault budget is split into one share per worker. Share 0 runs on
//! the coordinating thread, every other share goes to an isolated worker with
//! its own zeroed grid. Deltas are merged into the base grid with clamping as
//! they complete, always on the coordinating thread, so no grid is ever
//! shared while workers run.
//!
//! The local share only starts once every remote worker has reported
//! `Status`, so the remote workers are already busy when the coordinating
//! thread commits to its own work.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, TerrainError};
use crate::fault::{FaultGenerator, FaultParams};
use crate::grid::{check_dimensions, Grid, ELEVATION_RANGE};
use crate::protocol::{WorkerCommand, WorkerReply};
use crate::seeds::{rng_for, GenerationSeeds};
use crate::worker::{spawn_worker, WorkerBackend, WorkerEvent, WorkerEventKind, WorkerHandle};

pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(60);

/// Progress signals, each delivered exactly once per build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinatorStatus {
    /// Every remote worker has started (immediately when there are none).
    AllStarted,
    /// Every share, local ones included, has been merged.
    AllMerged,
}

/// Everything one elevation build needs
#[derive(Clone, Debug)]
pub struct CoordinatorSettings {
    pub width: usize,
    pub height: usize,
    /// Total faults across all shares
    pub iterations: usize,
    /// Number of shares, including the local one
    pub worker_count: usize,
    pub fault: FaultParams,
    pub backend: WorkerBackend,
    /// How long remote workers get before their shares are reclaimed
    pub worker_timeout: Duration,
    /// Run unavailable shares locally instead of failing the build
    pub fallback_to_local: bool,
    pub seeds: GenerationSeeds,
}

impl CoordinatorSettings {
    pub fn new(width: usize, height: usize, iterations: usize, worker_count: usize) -> Self {
        Self {
            width,
            height,
            iterations,
            worker_count,
            fault: FaultParams::default(),
            backend: WorkerBackend::InProcess,
            worker_timeout: DEFAULT_WORKER_TIMEOUT,
            fallback_to_local: true,
            seeds: GenerationSeeds::default(),
        }
    }
}

/// A merged elevation grid plus how it was produced
#[derive(Clone, Debug)]
pub struct ElevationBuild {
    pub grid: Grid<f32>,
    /// Iterations per share, share 0 being local
    pub shares: Vec<usize>,
    /// Remote shares that had to be rerun locally
    pub fallbacks: usize,
    pub elapsed: Duration,
}

/// Split `total` iterations into `workers` shares.
///
/// Remote shares get `round(total / workers)` (capped so they never exceed
/// the total); share 0 absorbs whatever is left.
pub fn partition_iterations(total: usize, workers: usize) -> Result<Vec<usize>> {
    if total == 0 {
        return Err(TerrainError::InvalidArgument("iteration count must be positive".into()));
    }
    if workers == 0 {
        return Err(TerrainError::InvalidArgument("worker count must be positive".into()));
    }
    if workers == 1 {
        return Ok(vec![total]);
    }

    let remote = workers - 1;
    let share = ((total as f64 / workers as f64).round() as usize).min(total / remote);
    let mut shares = vec![share; workers];
    shares[0] = total - share * remote;
    Ok(shares)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ShareState {
    Dispatched,
    Started,
    Merged,
}

/// Bookkeeping for one build, owned by the coordinating thread.
struct Round<'a, F> {
    settings: &'a CoordinatorSettings,
    shares: Vec<usize>,
    states: Vec<ShareState>,
    /// Process handles per share; dropping the round kills stragglers
    handles: Vec<WorkerHandle>,
    base: Grid<f32>,
    started: usize,
    merged: usize,
    fallbacks: usize,
    on_status: F,
}

impl<'a, F: FnMut(CoordinatorStatus)> Round<'a, F> {
    fn new(settings: &'a CoordinatorSettings, shares: Vec<usize>, on_status: F) -> Self {
        let mut states = vec![ShareState::Dispatched; shares.len()];
        states[0] = ShareState::Started;
        let handles = (0..shares.len()).map(|_| WorkerHandle::default()).collect();
        Self {
            settings,
            shares,
            handles,
            states,
            base: Grid::new_with(settings.width, settings.height, 0.0),
            started: 0,
            merged: 0,
            fallbacks: 0,
            on_status,
        }
    }

    fn remote_count(&self) -> usize {
        self.shares.len() - 1
    }

    fn all_started(&self) -> bool {
        self.started == self.remote_count()
    }

    fn is_complete(&self) -> bool {
        self.merged == self.shares.len()
    }

    fn pending_remote(&self) -> Vec<usize> {
        (1..self.shares.len())
            .filter(|&w| self.states[w] != ShareState::Merged)
            .collect()
    }

    fn mark_started(&mut self, worker: usize) {
        if self.states[worker] != ShareState::Dispatched {
            return;
        }
        self.states[worker] = ShareState::Started;
        self.started += 1;
        debug!(worker, started = self.started, "worker started");
        if self.all_started() {
            (self.on_status)(CoordinatorStatus::AllStarted);
        }
    }

    fn merge(&mut self, worker: usize, delta: &Grid<f32>) -> Result<()> {
        self.base.add_clamped(delta, ELEVATION_RANGE)?;
        self.states[worker] = ShareState::Merged;
        self.merged += 1;
        debug!(worker, merged = self.merged, total = self.shares.len(), "share merged");
        if self.is_complete() {
            (self.on_status)(CoordinatorStatus::AllMerged);
        }
        Ok(())
    }

    /// Build share `worker` on the coordinating thread and merge it.
    fn run_locally(&mut self, worker: usize) -> Result<()> {
        let settings = self.settings;
        let mut generator = FaultGenerator::new(settings.width, settings.height, settings.fault)?;
        let mut rng = rng_for(settings.seeds.share(worker));
        generator.regenerate(self.shares[worker], &mut rng);
        self.merge(worker, generator.grid())
    }

    /// Worker `worker` will not deliver; reclaim its share or give up.
    fn reclaim(&mut self, worker: usize, reason: String) -> Result<()> {
        self.handles[worker].kill();
        if !self.settings.fallback_to_local {
            return Err(TerrainError::WorkerUnavailable { worker, reason });
        }
        warn!(
            worker,
            %reason,
            iterations = self.shares[worker],
            "worker unavailable, running share locally"
        );
        self.mark_started(worker);
        self.fallbacks += 1;
        self.run_locally(worker)
    }

    fn handle(&mut self, event: WorkerEvent) -> Result<()> {
        let worker = event.worker;
        if self.states[worker] == ShareState::Merged {
            debug!(worker, "ignoring message from finished worker");
            return Ok(());
        }

        match event.kind {
            WorkerEventKind::Reply(WorkerReply::Status) => {
                self.mark_started(worker);
                Ok(())
            }
            WorkerEventKind::Reply(WorkerReply::Result { data }) => {
                self.mark_started(worker);
                match Grid::from_rows(data) {
                    Ok(delta) if delta.same_shape(&self.base) => self.merge(worker, &delta),
                    Ok(delta) => self.reclaim(
                        worker,
                        format!(
                            "returned a {}x{} grid, expected {}x{}",
                            delta.width, delta.height, self.settings.width, self.settings.height
                        ),
                    ),
                    Err(err) => self.reclaim(worker, format!("malformed result: {}", err)),
                }
            }
            WorkerEventKind::Lost(reason) => self.reclaim(worker, reason),
        }
    }
}

/// Drives one elevation build across all shares.
pub struct Coordinator {
    settings: CoordinatorSettings,
}

impl Coordinator {
    pub fn new(settings: CoordinatorSettings) -> Result<Self> {
        check_dimensions(settings.width, settings.height)?;
        partition_iterations(settings.iterations, settings.worker_count)?;
        if settings.worker_timeout.is_zero() {
            return Err(TerrainError::InvalidArgument("worker timeout must be positive".into()));
        }
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Build the merged elevation grid, reporting progress to `on_status`.
    pub fn build_elevation<F: FnMut(CoordinatorStatus)>(
        &self,
        on_status: F,
    ) -> Result<ElevationBuild> {
        let start = Instant::now();
        let shares = partition_iterations(self.settings.iterations, self.settings.worker_count)?;
        info!(
            workers = shares.len(),
            iterations = self.settings.iterations,
            "building elevation"
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_time()
            .build()
            .map_err(|e| TerrainError::Runtime(e.to_string()))?;

        let round = Round::new(&self.settings, shares, on_status);
        let outcome = runtime.block_on(coordinate(round));

        // Abandoned workers may still be running; don't wait for them.
        runtime.shutdown_background();

        let (grid, shares, fallbacks) = outcome?;
        let elapsed = start.elapsed();
        info!(?elapsed, fallbacks, "elevation merged");
        Ok(ElevationBuild { grid, shares, fallbacks, elapsed })
    }
}

async fn coordinate<F: FnMut(CoordinatorStatus)>(
    mut round: Round<'_, F>,
) -> Result<(Grid<f32>, Vec<usize>, usize)> {
    let settings = round.settings;
    let (tx, mut rx) = mpsc::unbounded_channel();

    for worker in 1..round.shares.len() {
        let command = WorkerCommand::BuildElevationMap {
            iterations: round.shares[worker],
            width: settings.width,
            height: settings.height,
            seed: Some(settings.seeds.share(worker)),
            fault: settings.fault,
        };
        debug!(worker, iterations = round.shares[worker], "dispatching share");
        round.handles[worker] = spawn_worker(&settings.backend, worker, command, tx.clone());
    }
    drop(tx);

    if round.remote_count() == 0 {
        (round.on_status)(CoordinatorStatus::AllStarted);
    }

    let deadline = tokio::time::Instant::now() + settings.worker_timeout;
    let mut local_done = false;

    while !round.is_complete() {
        if !local_done && round.all_started() {
            round.run_locally(0)?;
            local_done = true;
            continue;
        }

        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(event)) => round.handle(event)?,
            Ok(None) => {
                // Every worker hung up; whoever has not delivered never will.
                for worker in round.pending_remote() {
                    round.reclaim(worker, "worker exited without a result".into())?;
                }
            }
            Err(_) => {
                for worker in round.pending_remote() {
                    let reason = format!("no result within {:?}", settings.worker_timeout);
                    round.reclaim(worker, reason)?;
                }
            }
        }
    }

    Ok((round.base, round.shares, round.fallbacks))
}
