//! Moisture from simulated rainfall.
//!
//! Each river starts at a random cell above the water line, drops a rain
//! budget there and walks downhill, depositing a shrinking amount at every
//! cell it enters:
//! 1. Start on a random land cell, deposit `RAIN_BUDGET`
//! 2. Move to the neighbor with the lowest `height + moisture`; water
//!    already on a cell pushes later rivers elsewhere
//! 3. Deposit the remaining budget, then decrease it by one
//! 4. Stop at a local minimum, at the sea, or when the budget runs out
//!
//! Deposits may exceed `MAX_MOISTURE` while rivers run; the region is only
//! clamped at the end, so busy river mouths saturate.
//!
//! `latitude_gradient` is the degraded alternative: a static band that
//! ignores terrain entirely.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TerrainError};
use crate::grid::{check_dimensions, Grid, MAX_MOISTURE, MOISTURE_RANGE};

/// Rain dropped at each river source, above `MAX_MOISTURE`.
pub const RAIN_BUDGET: f32 = MAX_MOISTURE + 200.0;

/// How moisture is produced
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MoistureMode {
    /// Downhill rain-flow simulation
    #[default]
    Rivers,
    /// Static gradient, independent of terrain
    Gradient,
}

impl std::fmt::Display for MoistureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rivers => write!(f, "rivers"),
            Self::Gradient => write!(f, "gradient"),
        }
    }
}

/// Half-open rectangle `[min_x, max_x) x [min_y, max_y)` of a grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl Region {
    pub fn new(min_x: usize, min_y: usize, max_x: usize, max_y: usize) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> usize {
        self.max_x.saturating_sub(self.min_x)
    }

    pub fn height(&self) -> usize {
        self.max_y.saturating_sub(self.min_y)
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.min_x && x < self.max_x && y >= self.min_y && y < self.max_y
    }

    /// True when the region covers all of `grid`, so flow may wrap.
    pub fn covers<T>(&self, grid: &Grid<T>) -> bool {
        self.min_x == 0 && self.min_y == 0 && self.max_x == grid.width && self.max_y == grid.height
    }

    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.min_y..self.max_y).flat_map(move |y| (self.min_x..self.max_x).map(move |x| (x, y)))
    }

    fn validate<T>(&self, grid: &Grid<T>) -> Result<()> {
        let empty = self.width() == 0 || self.height() == 0;
        if empty || self.max_x > grid.width || self.max_y > grid.height {
            return Err(TerrainError::InvalidArgument(format!(
                "region {:?} does not fit a {}x{} grid",
                self, grid.width, grid.height
            )));
        }
        Ok(())
    }
}

/// Why a river stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiverOutcome {
    /// No neighbor was lower than the current cell
    LocalMinimum,
    /// The next cell was at or below the water level
    ReachedSea,
    /// Rain budget used up
    Exhausted,
}

/// Summary of one simulated river.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RiverRun {
    pub start: (usize, usize),
    pub end: (usize, usize),
    pub steps: usize,
    pub outcome: RiverOutcome,
}

/// Aggregate statistics for one hydrology pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HydrologyStats {
    pub rivers: usize,
    pub total_steps: usize,
    pub longest: usize,
    pub reached_sea: usize,
    pub local_minima: usize,
    pub exhausted: usize,
}

impl HydrologyStats {
    fn record(&mut self, run: &RiverRun) {
        self.rivers += 1;
        self.total_steps += run.steps;
        self.longest = self.longest.max(run.steps);
        match run.outcome {
            RiverOutcome::LocalMinimum => self.local_minima += 1,
            RiverOutcome::ReachedSea => self.reached_sea += 1,
            RiverOutcome::Exhausted => self.exhausted += 1,
        }
    }
}

fn check_pair(height: &Grid<f32>, moisture: &Grid<f32>) -> Result<()> {
    check_dimensions(height.width, height.height)?;
    if !height.same_shape(moisture) {
        return Err(TerrainError::InvalidDimensions {
            width: moisture.width,
            height: moisture.height,
        });
    }
    Ok(())
}

/// Walk one river from `start`, depositing into `moisture`.
///
/// The current cell competes with its bare height, neighbors with
/// `height + moisture`; ties keep the river where it is. Outside a
/// full-grid region, neighbors beyond the region are ignored.
pub fn trace_river(
    height: &Grid<f32>,
    moisture: &mut Grid<f32>,
    start: (usize, usize),
    water_level: f32,
    region: &Region,
) -> RiverRun {
    let wraps = region.covers(height);
    let (mut x, mut y) = start;
    let mut budget = RAIN_BUDGET;
    let mut steps = 0;

    *moisture.get_mut(x, y) += budget;

    let outcome = loop {
        if budget <= 0.0 {
            break RiverOutcome::Exhausted;
        }

        let mut best = (x, y);
        let mut best_potential = *height.get(x, y);
        for (nx, ny) in height.neighbors_8(x, y) {
            if !wraps && !region.contains(nx, ny) {
                continue;
            }
            let potential = *height.get(nx, ny) + *moisture.get(nx, ny);
            if potential < best_potential {
                best = (nx, ny);
                best_potential = potential;
            }
        }

        if best == (x, y) {
            break RiverOutcome::LocalMinimum;
        }
        if *height.get(best.0, best.1) <= water_level {
            break RiverOutcome::ReachedSea;
        }

        (x, y) = best;
        *moisture.get_mut(x, y) += budget;
        budget -= 1.0;
        steps += 1;
    };

    RiverRun { start, end: (x, y), steps, outcome }
}

/// Simulate `iterations` rivers over `region` of `moisture`.
///
/// The region is zeroed first and clamped to `[0, MAX_MOISTURE]` at the end.
/// Sources are drawn uniformly from region cells at or above `water_level`;
/// if there are none the pass ends with no rivers.
pub fn generate<R: Rng + ?Sized>(
    height: &Grid<f32>,
    moisture: &mut Grid<f32>,
    iterations: usize,
    water_level: f32,
    region: &Region,
    rng: &mut R,
) -> Result<HydrologyStats> {
    check_pair(height, moisture)?;
    region.validate(height)?;

    for (x, y) in region.cells() {
        moisture.set(x, y, 0.0);
    }

    let sources: Vec<(usize, usize)> = region
        .cells()
        .filter(|&(x, y)| *height.get(x, y) >= water_level)
        .collect();

    let mut stats = HydrologyStats::default();
    if sources.is_empty() {
        debug!(water_level, "no land above water level, skipping rivers");
    } else {
        for _ in 0..iterations {
            let start = sources[rng.gen_range(0..sources.len())];
            let run = trace_river(height, moisture, start, water_level, region);
            stats.record(&run);
        }
    }

    clamp_region(moisture, region);
    debug!(
        rivers = stats.rivers,
        longest = stats.longest,
        reached_sea = stats.reached_sea,
        "rivers simulated"
    );
    Ok(stats)
}

fn clamp_region(moisture: &mut Grid<f32>, region: &Region) {
    if region.covers(moisture) {
        moisture.clamp_all(MOISTURE_RANGE);
        return;
    }
    for (x, y) in region.cells() {
        let v = moisture.get_mut(x, y);
        *v = MOISTURE_RANGE.clamp(*v);
    }
}

/// Fill `region` with a static moisture band that ignores terrain.
///
/// Moisture rises linearly from the left edge to `max_x / 2`, then falls
/// back towards `max_x`.
pub fn latitude_gradient(moisture: &mut Grid<f32>, region: &Region) -> Result<()> {
    region.validate(moisture)?;
    if region.width() < 2 {
        return Err(TerrainError::InvalidDimensions {
            width: region.width(),
            height: region.height(),
        });
    }

    let half = region.max_x as f32 / 2.0;
    for x in region.min_x..region.max_x {
        let xf = x as f32;
        let level = if xf < half {
            xf / half * MAX_MOISTURE
        } else {
            (region.max_x as f32 - xf) / half * MAX_MOISTURE
        };
        let level = MOISTURE_RANGE.clamp(level);
        for y in region.min_y..region.max_y {
            moisture.set(x, y, level);
        }
    }
    Ok(())
}

/// Build a fresh moisture grid for `height` using `mode`.
pub fn generate_moisture<R: Rng + ?Sized>(
    height: &Grid<f32>,
    water_level: f32,
    mode: MoistureMode,
    iterations: usize,
    rng: &mut R,
) -> Result<(Grid<f32>, HydrologyStats)> {
    let mut moisture = Grid::new_with(height.width, height.height, 0.0f32);
    let region = Region::full(height.width, height.height);
    let stats = match mode {
        MoistureMode::Rivers => {
            generate(height, &mut moisture, iterations, water_level, &region, rng)?
        }
        MoistureMode::Gradient => {
            latitude_gradient(&mut moisture, &region)?;
            HydrologyStats::default()
        }
    };
    Ok((moisture, stats))
}
