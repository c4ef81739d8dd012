//! Debug exports: JSON grid dumps and grayscale PNG previews.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::{GrayImage, ImageBuffer, Luma};
use serde::Serialize;

use crate::error::Result;
use crate::grid::{Grid, GridSummary, ValueRange, ELEVATION_RANGE, MOISTURE_RANGE};
use crate::hydrology::HydrologyStats;
use crate::seeds::GenerationSeeds;
use crate::world::Terrain;

/// JSON form of a `Terrain`; grids use the row-major nested-array layout of
/// the worker protocol.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerrainDump<'a> {
    pub width: usize,
    pub height: usize,
    pub water_level: f32,
    pub land_percent: f64,
    pub seeds: &'a GenerationSeeds,
    pub elevation_summary: &'a GridSummary,
    pub hydrology: &'a HydrologyStats,
    pub elevation: Vec<Vec<f32>>,
    pub moisture: Vec<Vec<f32>>,
}

impl<'a> TerrainDump<'a> {
    pub fn new(terrain: &'a Terrain) -> Self {
        Self {
            width: terrain.width(),
            height: terrain.height(),
            water_level: terrain.water_level,
            land_percent: terrain.land_percent,
            seeds: &terrain.seeds,
            elevation_summary: &terrain.stats.elevation,
            hydrology: &terrain.stats.hydrology,
            elevation: terrain.elevation.to_rows(),
            moisture: terrain.moisture.to_rows(),
        }
    }
}

/// Write the whole terrain as JSON.
pub fn export_json(terrain: &Terrain, path: impl AsRef<Path>) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, &TerrainDump::new(terrain))?;
    Ok(())
}

/// Map `grid` linearly onto 0..=255 over `range`.
pub fn grayscale(grid: &Grid<f32>, range: ValueRange) -> GrayImage {
    let span = (range.max - range.min).max(f32::EPSILON);
    ImageBuffer::from_fn(grid.width as u32, grid.height as u32, |x, y| {
        let t = (range.clamp(*grid.get(x as usize, y as usize)) - range.min) / span;
        Luma([(t * 255.0).round() as u8])
    })
}

/// White land, black water.
pub fn land_mask(terrain: &Terrain) -> GrayImage {
    ImageBuffer::from_fn(terrain.width() as u32, terrain.height() as u32, |x, y| {
        if terrain.is_land(x as usize, y as usize) {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Write `{prefix}_elevation.png`, `{prefix}_moisture.png` and
/// `{prefix}_land.png`, returning the paths written.
pub fn export_pngs(terrain: &Terrain, prefix: &str) -> Result<Vec<PathBuf>> {
    let outputs = [
        ("elevation", grayscale(&terrain.elevation, ELEVATION_RANGE)),
        ("moisture", grayscale(&terrain.moisture, MOISTURE_RANGE)),
        ("land", land_mask(terrain)),
    ];

    let mut written = Vec::with_capacity(outputs.len());
    for (name, image) in outputs {
        let path = PathBuf::from(format!("{}_{}.png", prefix, name));
        image.save(&path)?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::world::generate_terrain;

    fn terrain() -> Terrain {
        let config = GenerationConfig {
            width: 20,
            height: 12,
            iterations: 40,
            worker_count: 2,
            moisture_iterations: 10,
            ..GenerationConfig::default()
        };
        generate_terrain(&config, GenerationSeeds::from_master(21), |_| {}).unwrap()
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("fault_terrain_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_grayscale_maps_range_ends() {
        let mut grid = Grid::new_with(3, 2, 0.0f32);
        grid.set(0, 0, -500.0);
        grid.set(1, 0, 500.0);
        grid.set(2, 1, 9_999.0);

        let image = grayscale(&grid, ELEVATION_RANGE);
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(0, 0).0, [0]);
        assert_eq!(image.get_pixel(1, 0).0, [255]);
        assert_eq!(image.get_pixel(2, 0).0, [128]);
        assert_eq!(image.get_pixel(2, 1).0, [255]);
    }

    #[test]
    fn test_land_mask_matches_water_level() {
        let terrain = terrain();
        let mask = land_mask(&terrain);
        for (x, y, _) in terrain.elevation.iter() {
            let expected = if terrain.is_land(x, y) { 255 } else { 0 };
            assert_eq!(mask.get_pixel(x as u32, y as u32).0, [expected]);
        }
    }

    #[test]
    fn test_json_dump_shape() {
        let terrain = terrain();
        let path = temp_path("dump.json");
        export_json(&terrain, &path).unwrap();

        let json = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(value["width"], 20);
        assert_eq!(value["height"], 12);
        assert_eq!(value["elevation"].as_array().unwrap().len(), 12);
        assert_eq!(value["moisture"][0].as_array().unwrap().len(), 20);
        assert_eq!(value["seeds"]["master"], 21);
        assert!(value["waterLevel"].is_number());
    }

    #[test]
    fn test_png_export_writes_three_files() {
        let terrain = terrain();
        let prefix = temp_path("preview");
        let written = export_pngs(&terrain, &prefix.to_string_lossy()).unwrap();

        assert_eq!(written.len(), 3);
        for path in written {
            let image = image::open(&path).unwrap();
            assert_eq!((image.width(), image.height()), (20, 12));
            std::fs::remove_file(&path).ok();
        }
    }
}
