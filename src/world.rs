//! Terrain generation pipeline.
//!
//! Phases run strictly in order, each one a hard barrier for the next:
//! 1. Elevation: fault shares built by the coordinator and merged
//! 2. Water level: calibrated from the merged elevation
//! 3. Moisture: rivers (or the latitude gradient) over the calibrated map
//!
//! `TerrainSession` keeps the last good `Terrain`. A regeneration builds new
//! grids privately and only replaces the stored terrain once every phase has
//! succeeded.

use std::time::{Duration, Instant};

use tracing::info;

use crate::calibrate::{calibrate, submerged_fraction};
use crate::config::{check_land_percent, GenerationConfig};
use crate::coordinator::{Coordinator, CoordinatorStatus};
use crate::error::Result;
use crate::grid::{Grid, GridSummary};
use crate::hydrology::{generate_moisture, HydrologyStats};
use crate::seeds::{rng_for, GenerationSeeds};

/// Progress notifications, in the order they fire.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GenerationEvent {
    /// Every remote worker has acknowledged its share
    WorkersStarted,
    /// All shares are merged into the elevation grid
    ElevationMerged,
    /// The water level for the requested land fraction
    WaterLevelComputed(f32),
    MoistureSimulated,
    /// The session now holds the new terrain
    Complete,
}

/// Bookkeeping from one generation.
#[derive(Clone, Debug)]
pub struct GenerationStats {
    pub elevation: GridSummary,
    pub moisture: GridSummary,
    /// Iterations per share, local share first
    pub shares: Vec<usize>,
    /// Shares rerun locally after a worker failed
    pub fallbacks: usize,
    pub hydrology: HydrologyStats,
    pub elevation_time: Duration,
    pub calibration_time: Duration,
    pub moisture_time: Duration,
}

/// One generated map: elevation, moisture and the water line between them.
#[derive(Clone, Debug)]
pub struct Terrain {
    pub elevation: Grid<f32>,
    pub moisture: Grid<f32>,
    pub water_level: f32,
    /// Requested submerged fraction the water level was calibrated for
    pub land_percent: f64,
    pub seeds: GenerationSeeds,
    pub stats: GenerationStats,
}

impl Terrain {
    pub fn width(&self) -> usize {
        self.elevation.width
    }

    pub fn height(&self) -> usize {
        self.elevation.height
    }

    pub fn is_land(&self, x: usize, y: usize) -> bool {
        *self.elevation.get(x, y) >= self.water_level
    }

    /// Fraction of cells actually below the water level.
    pub fn submerged_fraction(&self) -> f64 {
        submerged_fraction(&self.elevation, self.water_level)
    }
}

/// Run every phase for `config`.
///
/// Emits every event except `Complete`, which belongs to whoever stores the
/// result.
pub fn generate_terrain<F: FnMut(GenerationEvent)>(
    config: &GenerationConfig,
    seeds: GenerationSeeds,
    mut on_event: F,
) -> Result<Terrain> {
    config.validate()?;
    info!(
        width = config.width,
        height = config.height,
        iterations = config.iterations,
        workers = config.worker_count,
        seed = seeds.master,
        "generating terrain"
    );

    // Phase 1: elevation
    let coordinator = Coordinator::new(config.coordinator_settings(seeds))?;
    let build = coordinator.build_elevation(|status| match status {
        CoordinatorStatus::AllStarted => on_event(GenerationEvent::WorkersStarted),
        CoordinatorStatus::AllMerged => on_event(GenerationEvent::ElevationMerged),
    })?;

    // Phase 2: water level
    let start = Instant::now();
    let water_level = calibrate(&build.grid, config.land_percent)?;
    let calibration_time = start.elapsed();
    on_event(GenerationEvent::WaterLevelComputed(water_level));

    // Phase 3: moisture
    let start = Instant::now();
    let mut rng = rng_for(seeds.hydrology);
    let (moisture, hydrology) = generate_moisture(
        &build.grid,
        water_level,
        config.moisture_mode,
        config.moisture_iterations,
        &mut rng,
    )?;
    let moisture_time = start.elapsed();
    on_event(GenerationEvent::MoistureSimulated);

    info!(
        water_level,
        rivers = hydrology.rivers,
        reached_sea = hydrology.reached_sea,
        "terrain generated"
    );

    let stats = GenerationStats {
        elevation: build.grid.summary(),
        moisture: moisture.summary(),
        shares: build.shares,
        fallbacks: build.fallbacks,
        hydrology,
        elevation_time: build.elapsed,
        calibration_time,
        moisture_time,
    };

    Ok(Terrain {
        elevation: build.grid,
        moisture,
        water_level,
        land_percent: config.land_percent,
        seeds,
        stats,
    })
}

/// Owns the configuration and the current terrain between regenerations.
pub struct TerrainSession {
    config: GenerationConfig,
    terrain: Option<Terrain>,
}

impl TerrainSession {
    pub fn new(config: GenerationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, terrain: None })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Last successfully generated terrain, if any.
    pub fn terrain(&self) -> Option<&Terrain> {
        self.terrain.as_ref()
    }

    /// Replace the configuration used by the next regeneration.
    pub fn reconfigure(&mut self, config: GenerationConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Build a new terrain; on error the previous one is kept.
    pub fn regenerate<F: FnMut(GenerationEvent)>(&mut self, mut on_event: F) -> Result<&Terrain> {
        let seeds = GenerationSeeds::from_option(self.config.seed);
        let terrain = generate_terrain(&self.config, seeds, &mut on_event)?;
        on_event(GenerationEvent::Complete);
        Ok(self.terrain.insert(terrain))
    }

    /// Recalibrate the water level for a new land fraction.
    ///
    /// Elevation is kept. Moisture depends on the water line, so it is
    /// simulated again with the same hydrology seed. Without a terrain only
    /// the configuration changes.
    pub fn set_land_percent<F: FnMut(GenerationEvent)>(
        &mut self,
        percent: f64,
        mut on_event: F,
    ) -> Result<Option<f32>> {
        check_land_percent(percent)?;

        let Some(current) = &self.terrain else {
            self.config.land_percent = percent;
            return Ok(None);
        };

        let start = Instant::now();
        let water_level = calibrate(&current.elevation, percent)?;
        let calibration_time = start.elapsed();
        on_event(GenerationEvent::WaterLevelComputed(water_level));

        let start = Instant::now();
        let mut rng = rng_for(current.seeds.hydrology);
        let (moisture, hydrology) = generate_moisture(
            &current.elevation,
            water_level,
            self.config.moisture_mode,
            self.config.moisture_iterations,
            &mut rng,
        )?;
        let moisture_time = start.elapsed();
        on_event(GenerationEvent::MoistureSimulated);

        info!(percent, water_level, "water level recalibrated");

        if let Some(terrain) = self.terrain.as_mut() {
            terrain.stats.moisture = moisture.summary();
            terrain.stats.hydrology = hydrology;
            terrain.stats.calibration_time = calibration_time;
            terrain.stats.moisture_time = moisture_time;
            terrain.moisture = moisture;
            terrain.water_level = water_level;
            terrain.land_percent = percent;
        }
        self.config.land_percent = percent;
        on_event(GenerationEvent::Complete);
        Ok(Some(water_level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TerrainError;
    use crate::grid::{ELEVATION_RANGE, MOISTURE_RANGE};
    use crate::hydrology::MoistureMode;

    fn small_config() -> GenerationConfig {
        GenerationConfig {
            width: 48,
            height: 32,
            iterations: 120,
            worker_count: 3,
            moisture_iterations: 60,
            seed: Some(7),
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn test_events_fire_in_phase_order() {
        let mut session = TerrainSession::new(small_config()).unwrap();
        let mut events = Vec::new();
        let terrain = session.regenerate(|event| events.push(event)).unwrap();

        let level = terrain.water_level;
        assert_eq!(
            events,
            vec![
                GenerationEvent::WorkersStarted,
                GenerationEvent::ElevationMerged,
                GenerationEvent::WaterLevelComputed(level),
                GenerationEvent::MoistureSimulated,
                GenerationEvent::Complete,
            ]
        );
    }

    #[test]
    fn test_terrain_respects_ranges_and_land_split() {
        let config = small_config();
        let terrain = generate_terrain(&config, GenerationSeeds::from_master(3), |_| {}).unwrap();

        assert_eq!((terrain.width(), terrain.height()), (48, 32));
        assert!(terrain.elevation.in_range(ELEVATION_RANGE));
        assert!(terrain.moisture.in_range(MOISTURE_RANGE));
        assert_eq!(terrain.stats.shares.iter().sum::<usize>(), 120);
        assert_eq!(terrain.stats.fallbacks, 0);
        // Ties at the level can only leave fewer cells submerged
        assert!(terrain.submerged_fraction() <= config.land_percent + 1e-9);
    }

    #[test]
    fn test_moisture_stays_on_land_cells() {
        let seeds = GenerationSeeds::from_master(11);
        let terrain = generate_terrain(&small_config(), seeds, |_| {}).unwrap();
        for (x, y, &m) in terrain.moisture.iter() {
            if !terrain.is_land(x, y) {
                assert_eq!(m, 0.0, "water cell ({}, {}) got moisture", x, y);
            }
        }
    }

    #[test]
    fn test_gradient_mode_skips_rivers() {
        let config = GenerationConfig {
            moisture_mode: MoistureMode::Gradient,
            ..small_config()
        };
        let terrain = generate_terrain(&config, GenerationSeeds::from_master(5), |_| {}).unwrap();
        assert_eq!(terrain.stats.hydrology.rivers, 0);
        assert_eq!(*terrain.moisture.get(0, 0), 0.0);
        assert!(terrain.stats.moisture.max > 0.0);
    }

    #[test]
    fn test_failed_regeneration_keeps_previous_terrain() {
        let mut session = TerrainSession::new(small_config()).unwrap();
        let before = session.regenerate(|_| {}).unwrap().elevation.clone();

        session
            .reconfigure(GenerationConfig {
                worker_program: Some("/nonexistent/fault_worker".into()),
                fallback_to_local: false,
                ..small_config()
            })
            .unwrap();

        let mut events = Vec::new();
        let result = session.regenerate(|event| events.push(event));
        assert!(matches!(result, Err(TerrainError::WorkerUnavailable { .. })));
        assert!(!events.contains(&GenerationEvent::Complete));
        assert_eq!(session.terrain().unwrap().elevation, before);
    }

    #[test]
    fn test_set_land_percent_keeps_elevation() {
        let mut session = TerrainSession::new(small_config()).unwrap();
        let first = session.regenerate(|_| {}).unwrap().clone();

        let level = session.set_land_percent(0.3, |_| {}).unwrap().unwrap();
        let terrain = session.terrain().unwrap();

        assert_eq!(terrain.elevation, first.elevation);
        assert_eq!(terrain.water_level, level);
        assert!(level <= first.water_level);
        assert_eq!(terrain.land_percent, 0.3);
        assert_eq!(session.config().land_percent, 0.3);
    }

    #[test]
    fn test_failed_recalibration_keeps_land_percent() {
        let mut session = TerrainSession::new(small_config()).unwrap();
        session.regenerate(|_| {}).unwrap();
        if let Some(terrain) = session.terrain.as_mut() {
            terrain.elevation = Grid::new_with(0, 0, 0.0);
        }

        let mut events = Vec::new();
        assert!(session.set_land_percent(0.3, |event| events.push(event)).is_err());
        assert!(events.is_empty());
        assert_eq!(session.config().land_percent, 0.67);
        assert_eq!(session.terrain().unwrap().land_percent, 0.67);
    }

    #[test]
    fn test_set_land_percent_without_terrain() {
        let mut session = TerrainSession::new(small_config()).unwrap();
        assert_eq!(session.set_land_percent(0.5, |_| {}).unwrap(), None);
        assert!(session.set_land_percent(1.0, |_| {}).is_err());
        assert_eq!(session.config().land_percent, 0.5);
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let config = GenerationConfig { width: 1, ..small_config() };
        assert!(matches!(
            TerrainSession::new(config),
            Err(TerrainError::InvalidDimensions { .. })
        ));
    }
}
