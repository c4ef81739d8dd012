//! Fault-perturbation terrain synthesis.
//!
//! Each fault raises one region of the map and lowers the rest, with a
//! linear falloff band of `threshold` cells around the boundary:
//! - **Disk faults** (default): a circle of radius `min(W, H) / k` placed on
//!   the torus. Distances wrap, so features cross the seams unclipped.
//! - **Line faults** (deprecated): an infinite line with a random slope. The
//!   line does not wrap and leaves visible seams on a torus.
//!
//! Rows are updated in parallel since every cell only depends on itself.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::grid::{check_dimensions, Grid, ValueRange, ELEVATION_RANGE};

/// Width of the falloff band in grid units.
pub const FAULT_THRESHOLD: f32 = 7.0;

/// Disk radius is `min(width, height) / FEATURE_DIVISOR`.
pub const FEATURE_DIVISOR: f32 = 5.0;

/// Which fault geometry to generate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FaultKind {
    #[default]
    Disk,
    /// Superseded by disk faults.
    Line,
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disk => write!(f, "disk"),
            Self::Line => write!(f, "line"),
        }
    }
}

/// Parameters shared by every fault of one generation run
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FaultParams {
    pub kind: FaultKind,
    /// Feature size constant `k`; larger values give smaller disks
    pub feature_divisor: f32,
    /// Falloff band width
    pub threshold: f32,
    /// Range cells are clamped into after every fault
    pub range: ValueRange,
}

impl Default for FaultParams {
    fn default() -> Self {
        Self {
            kind: FaultKind::Disk,
            feature_divisor: FEATURE_DIVISOR,
            threshold: FAULT_THRESHOLD,
            range: ELEVATION_RANGE,
        }
    }
}

/// Geometry of a single fault.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FaultShape {
    Disk { radius: f32 },
    Line { slope: f32, intercept: f32 },
}

/// One perturbation event. Built, applied once, dropped.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fault {
    pub center_x: f32,
    pub center_y: f32,
    /// +1 raises the inside (or the side above the line), -1 lowers it
    pub sign: f32,
    pub threshold: f32,
    pub shape: FaultShape,
}

impl Fault {
    pub fn disk(center_x: f32, center_y: f32, radius: f32, sign: f32) -> Self {
        Self {
            center_x,
            center_y,
            sign,
            threshold: FAULT_THRESHOLD,
            shape: FaultShape::Disk { radius },
        }
    }

    /// Line through `(center_x, center_y)` with the given slope.
    pub fn line(center_x: f32, center_y: f32, slope: f32, sign: f32) -> Self {
        Self {
            center_x,
            center_y,
            sign,
            threshold: FAULT_THRESHOLD,
            shape: FaultShape::Line {
                slope,
                intercept: center_y - slope * center_x,
            },
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sample a random fault for a `width` x `height` map.
    pub fn random<R: Rng + ?Sized>(
        width: usize,
        height: usize,
        params: &FaultParams,
        rng: &mut R,
    ) -> Self {
        let w = width as f32;
        let h = height as f32;
        let center_x = rng.gen::<f32>() * w;
        let center_y = rng.gen::<f32>() * h;

        let fault = match params.kind {
            FaultKind::Disk => {
                let sign = random_sign(rng);
                Self::disk(center_x, center_y, w.min(h) / params.feature_divisor, sign)
            }
            FaultKind::Line => {
                let mut slope = rng.gen_range(f32::EPSILON..10.0);
                let orientation = rng.gen::<f32>();
                if orientation < 0.5 {
                    slope = 1.0 / slope;
                }
                if orientation < 0.25 || orientation >= 0.75 {
                    slope = -slope;
                }
                let sign = random_sign(rng);
                Self::line(center_x, center_y, slope, sign)
            }
        };
        fault.with_threshold(params.threshold)
    }

    /// Apply this fault to every cell, clamping into `range`.
    ///
    /// An empty grid is left as it is.
    pub fn apply(&self, grid: &mut Grid<f32>, range: ValueRange) {
        if grid.is_empty() {
            return;
        }
        let width = grid.width;
        let w = grid.width as f32;
        let h = grid.height as f32;
        let threshold = self.threshold;
        let sign = self.sign;
        let (cx, cy) = (self.center_x, self.center_y);

        match self.shape {
            FaultShape::Disk { radius } => {
                let radius_sq = radius * radius;
                let reach = radius + threshold;

                grid.as_mut_slice()
                    .par_chunks_mut(width)
                    .enumerate()
                    .for_each(|(y, row)| {
                        let dy = wrapped_offset(y as f32, cy, reach, h);
                        for (x, cell) in row.iter_mut().enumerate() {
                            let dx = wrapped_offset(x as f32, cx, reach, w);
                            let dist_sq = dx * dx + dy * dy;
                            let falloff = (dist_sq.sqrt() - radius).abs().min(threshold);
                            let change = if dist_sq < radius_sq {
                                sign * falloff
                            } else {
                                -sign * falloff
                            };
                            *cell = range.clamp(*cell + change);
                        }
                    });
            }
            FaultShape::Line { slope, intercept } => {
                let divisor = (1.0 + slope * slope).sqrt();

                grid.as_mut_slice()
                    .par_chunks_mut(width)
                    .enumerate()
                    .for_each(|(y, row)| {
                        let y = y as f32;
                        for (x, cell) in row.iter_mut().enumerate() {
                            let line_y = slope * x as f32 + intercept;
                            let falloff = ((line_y - y).abs() / divisor).min(threshold);
                            let change = if line_y < y { sign * falloff } else { -sign * falloff };
                            *cell = range.clamp(*cell + change);
                        }
                    });
            }
        }
    }
}

fn random_sign<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    if rng.gen_bool(0.5) { 1.0 } else { -1.0 }
}

/// Offset from `center` to `pos` along one axis, taking the wrapped path
/// when the direct one is beyond the fault's reach.
#[inline]
fn wrapped_offset(pos: f32, center: f32, reach: f32, size: f32) -> f32 {
    let mut test = pos;
    if (pos - center).abs() > reach {
        if pos > center {
            test -= size;
        } else {
            test += size;
        }
    }
    test - center
}

/// Apply one random fault to `grid` in place.
pub fn apply_fault<R: Rng + ?Sized>(
    grid: &mut Grid<f32>,
    params: &FaultParams,
    rng: &mut R,
) -> Result<()> {
    check_dimensions(grid.width, grid.height)?;
    Fault::random(grid.width, grid.height, params, rng).apply(grid, params.range);
    Ok(())
}

/// Zero `grid`, then apply `iterations` independent faults.
pub fn regenerate_into<R: Rng + ?Sized>(
    grid: &mut Grid<f32>,
    iterations: usize,
    params: &FaultParams,
    rng: &mut R,
) -> Result<()> {
    check_dimensions(grid.width, grid.height)?;
    grid.fill(0.0);
    for _ in 0..iterations {
        Fault::random(grid.width, grid.height, params, rng).apply(grid, params.range);
    }
    Ok(())
}

/// A fault engine that owns its private grid.
///
/// Workers each hold one of these so no state is shared while they run.
pub struct FaultGenerator {
    grid: Grid<f32>,
    params: FaultParams,
}

impl FaultGenerator {
    pub fn new(width: usize, height: usize, params: FaultParams) -> Result<Self> {
        check_dimensions(width, height)?;
        Ok(Self {
            grid: Grid::new_with(width, height, 0.0),
            params,
        })
    }

    /// Reset the private grid and build it up from `iterations` faults.
    pub fn regenerate<R: Rng + ?Sized>(&mut self, iterations: usize, rng: &mut R) -> &Grid<f32> {
        self.grid.fill(0.0);
        for _ in 0..iterations {
            Fault::random(self.grid.width, self.grid.height, &self.params, rng)
                .apply(&mut self.grid, self.params.range);
        }
        &self.grid
    }

    pub fn grid(&self) -> &Grid<f32> {
        &self.grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{MAX_ELEVATION, MIN_ELEVATION, MOISTURE_RANGE};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_single_disk_fault_on_small_grid() {
        let mut grid = Grid::new_with(10, 10, 0.0f32);
        let radius = 10.0 / FEATURE_DIVISOR;
        let fault = Fault::disk(5.0, 5.0, radius, 1.0);
        fault.apply(&mut grid, ELEVATION_RANGE);

        for (x, y, &v) in grid.iter() {
            let dx = x as f32 - 5.0;
            let dy = y as f32 - 5.0;
            let dist_sq = dx * dx + dy * dy;

            if dist_sq < radius * radius {
                assert!(v > 0.0, "interior cell ({}, {}) should rise, got {}", x, y, v);
            } else if dist_sq > radius * radius {
                assert!(v < 0.0, "exterior cell ({}, {}) should sink, got {}", x, y, v);
            }
            assert!(v.abs() <= FAULT_THRESHOLD);
            assert!(v >= MIN_ELEVATION && v <= MAX_ELEVATION);
        }

        // Center sits `radius` away from the boundary
        assert!((*grid.get(5, 5) - radius).abs() < 1e-5);
    }

    #[test]
    fn test_negative_sign_inverts_fault() {
        let mut raised = Grid::new_with(20, 20, 0.0f32);
        let mut lowered = Grid::new_with(20, 20, 0.0f32);
        Fault::disk(10.0, 10.0, 4.0, 1.0).apply(&mut raised, ELEVATION_RANGE);
        Fault::disk(10.0, 10.0, 4.0, -1.0).apply(&mut lowered, ELEVATION_RANGE);

        for ((_, _, a), (_, _, b)) in raised.iter().zip(lowered.iter()) {
            assert!((a + b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_range_invariant_after_many_faults() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut grid = Grid::new_with(32, 24, 0.0f32);
        let params = FaultParams::default();
        regenerate_into(&mut grid, 400, &params, &mut rng).unwrap();
        assert!(grid.in_range(ELEVATION_RANGE));

        // A narrow range forces clamping on most faults
        let narrow = FaultParams {
            range: ValueRange::new(-10.0, 10.0),
            ..FaultParams::default()
        };
        regenerate_into(&mut grid, 200, &narrow, &mut rng).unwrap();
        assert!(grid.in_range(narrow.range));
    }

    #[test]
    fn test_moisture_variant_stays_non_negative() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let params = FaultParams {
            range: MOISTURE_RANGE,
            ..FaultParams::default()
        };
        let mut generator = FaultGenerator::new(40, 40, params).unwrap();
        let grid = generator.regenerate(150, &mut rng);
        assert!(grid.in_range(MOISTURE_RANGE));
    }

    #[test]
    fn test_fault_wraps_across_seam() {
        let (width, height) = (64, 48);
        let radius = width.min(height) as f32 / FEATURE_DIVISOR;

        let mut at_zero = Grid::new_with(width, height, 0.0f32);
        let mut at_width = Grid::new_with(width, height, 0.0f32);
        Fault::disk(0.0, 20.0, radius, 1.0).apply(&mut at_zero, ELEVATION_RANGE);
        Fault::disk(width as f32, 20.0, radius, 1.0).apply(&mut at_width, ELEVATION_RANGE);

        for ((x, y, a), (_, _, b)) in at_zero.iter().zip(at_width.iter()) {
            assert!((a - b).abs() < 1e-4, "mismatch at ({}, {}): {} vs {}", x, y, a, b);
        }

        // Mirror image across the seam
        for y in 0..height {
            for offset in 1..10 {
                let left = *at_zero.get(offset, y);
                let right = *at_zero.get(width - offset, y);
                assert!((left - right).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_line_fault_splits_plane() {
        let mut grid = Grid::new_with(20, 20, 0.0f32);
        Fault::line(0.0, 0.0, 1.0, 1.0).apply(&mut grid, ELEVATION_RANGE);

        // Below the diagonal in grid coordinates (y > x) rises
        assert!((*grid.get(0, 10) - FAULT_THRESHOLD).abs() < 1e-5);
        assert!((*grid.get(10, 0) + FAULT_THRESHOLD).abs() < 1e-5);
        assert_eq!(*grid.get(5, 5), 0.0);
    }

    #[test]
    fn test_random_faults_respect_params() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let params = FaultParams::default();
        for _ in 0..50 {
            let fault = Fault::random(100, 50, &params, &mut rng);
            assert!(fault.center_x >= 0.0 && fault.center_x < 100.0);
            assert!(fault.center_y >= 0.0 && fault.center_y < 50.0);
            assert!(fault.sign == 1.0 || fault.sign == -1.0);
            assert_eq!(fault.shape, FaultShape::Disk { radius: 10.0 });
        }

        let line = FaultParams { kind: FaultKind::Line, ..params };
        let fault = Fault::random(100, 50, &line, &mut rng);
        assert!(matches!(fault.shape, FaultShape::Line { slope, .. } if slope.is_finite()));
    }

    #[test]
    fn test_regenerate_resets_grid() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut generator = FaultGenerator::new(16, 16, FaultParams::default()).unwrap();
        generator.regenerate(20, &mut rng);
        let grid = generator.regenerate(0, &mut rng);
        assert!(grid.iter().all(|(_, _, &v)| v == 0.0));
    }

    #[test]
    fn test_degenerate_grid_rejected() {
        assert!(FaultGenerator::new(1, 1, FaultParams::default()).is_err());
        let mut grid = Grid::new_with(1, 8, 0.0f32);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(apply_fault(&mut grid, &FaultParams::default(), &mut rng).is_err());
    }

    #[test]
    fn test_injected_fault_on_empty_grid_is_noop() {
        let fault = Fault::disk(1.0, 1.0, 2.0, 1.0);
        for (width, height) in [(0, 4), (4, 0), (0, 0)] {
            let mut grid = Grid::new_with(width, height, 0.0f32);
            fault.apply(&mut grid, ELEVATION_RANGE);
            assert!(grid.is_empty());
        }
    }
}
