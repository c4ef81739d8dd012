//! Dense 2D grids with toroidal (wraparound) addressing.
//!
//! Both the elevation map and the moisture map are `Grid<f32>`. Storage is
//! row-major, and every coordinate wraps on both axes, so the right edge is
//! adjacent to the left edge and the top edge to the bottom edge.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};

// =============================================================================
// VALUE RANGES
// =============================================================================

pub const MIN_ELEVATION: f32 = -500.0;
pub const MAX_ELEVATION: f32 = 500.0;
pub const MAX_MOISTURE: f32 = 1000.0;

/// Smallest width or height the fault and flow math is defined for.
pub const MIN_GRID_DIMENSION: usize = 2;

/// Closed interval every cell of a grid must stay inside.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const ELEVATION_RANGE: ValueRange = ValueRange::new(MIN_ELEVATION, MAX_ELEVATION);
pub const MOISTURE_RANGE: ValueRange = ValueRange::new(0.0, MAX_MOISTURE);

/// Reject grids too small for the toroidal distance math.
pub fn check_dimensions(width: usize, height: usize) -> Result<()> {
    if width < MIN_GRID_DIMENSION || height < MIN_GRID_DIMENSION {
        return Err(TerrainError::InvalidDimensions { width, height });
    }
    Ok(())
}

// =============================================================================
// GRID
// =============================================================================

/// A 2D grid that wraps on both axes.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    pub width: usize,
    pub height: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> Grid<T> {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![T::default(); width * height],
        }
    }
}

impl<T: Clone> Grid<T> {
    pub fn new_with(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Index into the data array, wrapping both coordinates.
    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        (y % self.height) * self.width + (x % self.width)
    }

    /// Wrap signed coordinates onto the torus.
    #[inline]
    pub fn wrap(&self, x: i64, y: i64) -> (usize, usize) {
        (
            x.rem_euclid(self.width as i64) as usize,
            y.rem_euclid(self.height as i64) as usize,
        )
    }

    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[self.index(x, y)]
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        let idx = self.index(x, y);
        &mut self.data[idx]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    pub fn get_wrapped(&self, x: i64, y: i64) -> &T {
        let (x, y) = self.wrap(x, y);
        self.get(x, y)
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn same_shape<U>(&self, other: &Grid<U>) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// The 8 toroidal neighbors, clockwise from north.
    pub fn neighbors_8(&self, x: usize, y: usize) -> [(usize, usize); 8] {
        let (x, y) = (x as i64, y as i64);
        [
            self.wrap(x, y - 1),
            self.wrap(x + 1, y - 1),
            self.wrap(x + 1, y),
            self.wrap(x + 1, y + 1),
            self.wrap(x, y + 1),
            self.wrap(x - 1, y + 1),
            self.wrap(x - 1, y),
            self.wrap(x - 1, y - 1),
        ]
    }

    /// Iterate over all cells with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        let width = self.width;
        self.data.iter().enumerate().map(move |(idx, val)| (idx % width, idx / width, val))
    }

    /// Iterate mutably over all cells with their coordinates.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, usize, &mut T)> {
        let width = self.width;
        self.data.iter_mut().enumerate().map(move |(idx, val)| (idx % width, idx / width, val))
    }

    /// Nested-array form: one inner vector per row `y`, each `width` long.
    pub fn to_rows(&self) -> Vec<Vec<T>> {
        self.data.chunks(self.width.max(1)).map(|row| row.to_vec()).collect()
    }

    /// Rebuild a grid from its nested-array form.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if width == 0 || rows.iter().any(|row| row.len() != width) {
            return Err(TerrainError::InvalidDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            data: rows.into_iter().flatten().collect(),
        })
    }
}

// =============================================================================
// NUMERIC HELPERS
// =============================================================================

/// Distribution summary used in logs and statistical checks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GridSummary {
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    pub variance: f64,
}

impl Grid<f32> {
    /// Clamp every cell into `range`.
    pub fn clamp_all(&mut self, range: ValueRange) {
        self.data.par_iter_mut().for_each(|v| *v = range.clamp(*v));
    }

    /// Add `delta` cell by cell, clamping each sum into `range`.
    pub fn add_clamped(&mut self, delta: &Grid<f32>, range: ValueRange) -> Result<()> {
        if !self.same_shape(delta) {
            return Err(TerrainError::InvalidDimensions {
                width: delta.width,
                height: delta.height,
            });
        }
        self.data
            .par_iter_mut()
            .zip(delta.data.par_iter())
            .for_each(|(base, d)| *base = range.clamp(*base + d));
        Ok(())
    }

    /// Smallest and largest cell.
    pub fn min_max(&self) -> (f32, f32) {
        let summary = self.summary();
        (summary.min, summary.max)
    }

    pub fn in_range(&self, range: ValueRange) -> bool {
        self.data.iter().all(|&v| range.contains(v))
    }

    pub fn summary(&self) -> GridSummary {
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        let mut sum = 0.0f64;
        for &v in &self.data {
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
        }
        let n = self.data.len().max(1) as f64;
        let mean = sum / n;
        let variance = self
            .data
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        GridSummary { min, max, mean, variance }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_wrap_on_both_axes() {
        let mut grid = Grid::new_with(4, 3, 0.0f32);
        grid.set(0, 0, 7.0);

        assert_eq!(*grid.get(4, 3), 7.0);
        assert_eq!(*grid.get_wrapped(-4, -3), 7.0);
        assert_eq!(grid.wrap(-1, -1), (3, 2));
        assert_eq!(grid.wrap(5, 7), (1, 1));
    }

    #[test]
    fn test_neighbors_wrap_at_corner() {
        let grid: Grid<f32> = Grid::new(5, 4);
        let neighbors = grid.neighbors_8(0, 0);

        assert!(neighbors.contains(&(4, 3)));
        assert!(neighbors.contains(&(0, 3)));
        assert!(neighbors.contains(&(4, 0)));
        assert!(neighbors.contains(&(1, 1)));
        assert!(!neighbors.contains(&(0, 0)));
    }

    #[test]
    fn test_rows_keep_layout() {
        let mut grid: Grid<f32> = Grid::new(3, 2);
        grid.set(2, 1, 5.0);

        let rows = grid.to_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![0.0, 0.0, 5.0]);

        let rebuilt = Grid::from_rows(rows).unwrap();
        assert_eq!(rebuilt, grid);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let rows = vec![vec![1.0f32, 2.0], vec![3.0]];
        assert!(matches!(
            Grid::from_rows(rows),
            Err(TerrainError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_add_clamped_respects_range() {
        let mut base = Grid::new_with(2, 2, 450.0f32);
        let delta = Grid::new_with(2, 2, 100.0f32);
        base.add_clamped(&delta, ELEVATION_RANGE).unwrap();
        assert!(base.iter().all(|(_, _, &v)| v == MAX_ELEVATION));

        let wrong = Grid::new_with(3, 2, 0.0f32);
        assert!(base.add_clamped(&wrong, ELEVATION_RANGE).is_err());
    }

    #[test]
    fn test_min_max_and_values() {
        let grid = Grid::from_rows(vec![vec![3.0f32, -7.5], vec![12.0, 0.0]]).unwrap();
        assert_eq!(grid.min_max(), (-7.5, 12.0));
        assert_eq!(grid.values().copied().sum::<f32>(), 7.5);
    }

    #[test]
    fn test_dimension_check() {
        assert!(check_dimensions(1, 10).is_err());
        assert!(check_dimensions(10, 1).is_err());
        assert!(check_dimensions(2, 2).is_ok());
    }
}
