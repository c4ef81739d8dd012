//! Water-level calibration.
//!
//! Picks the elevation below which a requested fraction of the map is
//! submerged. This sorts every cell, so it runs once per regeneration (or per
//! explicit land/water request), never per frame.

use rayon::prelude::*;

use crate::error::{Result, TerrainError};
use crate::grid::Grid;

/// Elevation at the `percent` quantile of `grid`.
///
/// Returns the value at index `floor(W * H * percent)` of the ascending
/// sorted cells. `percent` must lie in `[0, 1)`.
pub fn calibrate(grid: &Grid<f32>, percent: f64) -> Result<f32> {
    if !(0.0..1.0).contains(&percent) {
        return Err(TerrainError::InvalidArgument(format!(
            "submerged fraction must be in [0, 1), got {}",
            percent
        )));
    }
    if grid.is_empty() {
        return Err(TerrainError::InvalidDimensions {
            width: grid.width,
            height: grid.height,
        });
    }

    let mut values: Vec<f32> = grid.values().copied().collect();
    values.par_sort_unstable_by(|a, b| a.total_cmp(b));

    let index = (values.len() as f64 * percent).floor() as usize;
    Ok(values[index.min(values.len() - 1)])
}

/// Fraction of cells strictly below `level`.
pub fn submerged_fraction(grid: &Grid<f32>, level: f32) -> f64 {
    if grid.is_empty() {
        return 0.0;
    }
    let below = grid.as_slice().par_iter().filter(|&&v| v < level).count();
    below as f64 / grid.len() as f64
}
