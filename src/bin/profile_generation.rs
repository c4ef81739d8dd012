//! Profiling tool for the generation phases

use std::time::{Duration, Instant};

use fault_terrain::calibrate::calibrate;
use fault_terrain::coordinator::{Coordinator, CoordinatorSettings};
use fault_terrain::hydrology::{generate_moisture, MoistureMode};
use fault_terrain::seeds::{rng_for, GenerationSeeds};
use fault_terrain::{init_logging, Result};

fn percent(part: Duration, total: Duration) -> f64 {
    100.0 * part.as_secs_f64() / total.as_secs_f64().max(f64::EPSILON)
}

fn main() -> Result<()> {
    init_logging();

    let width = 512;
    let height = 256;
    let iterations = 1000;
    let rivers = 2000;
    let land_percent = 0.67;
    let seeds = GenerationSeeds::from_master(1337);
    let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);

    println!("=== Performance Profiling ===");
    println!("Map size: {}x{} ({} cells)", width, height, width * height);
    println!("Faults: {}, rivers: {}", iterations, rivers);
    println!();

    // Profile elevation on the coordinating thread alone
    let single = Coordinator::new(CoordinatorSettings {
        seeds,
        ..CoordinatorSettings::new(width, height, iterations, 1)
    })?;
    let start = Instant::now();
    single.build_elevation(|_| {})?;
    let single_time = start.elapsed();
    println!("Elevation (1 worker): {:?}", single_time);

    // Profile elevation across all cores
    let parallel = Coordinator::new(CoordinatorSettings {
        seeds,
        ..CoordinatorSettings::new(width, height, iterations, workers)
    })?;
    let start = Instant::now();
    let build = parallel.build_elevation(|_| {})?;
    let elevation_time = start.elapsed();
    println!("Elevation ({} workers): {:?}", workers, elevation_time);
    println!("  Shares: {:?}", build.shares);
    let (low, high) = build.grid.min_max();
    println!("  Range: {:.1} to {:.1}", low, high);

    // Profile water level calibration
    let start = Instant::now();
    let water_level = calibrate(&build.grid, land_percent)?;
    let calibration_time = start.elapsed();
    println!("Water level calibration: {:?} (level {:.1})", calibration_time, water_level);

    // Profile hydrology
    let start = Instant::now();
    let mut rng = rng_for(seeds.hydrology);
    let (_moisture, stats) =
        generate_moisture(&build.grid, water_level, MoistureMode::Rivers, rivers, &mut rng)?;
    let moisture_time = start.elapsed();
    println!("Hydrology: {:?}", moisture_time);
    println!("  Steps: {} (longest river {})", stats.total_steps, stats.longest);

    // Summary
    let total = elevation_time + calibration_time + moisture_time;
    println!("\n=== Summary ===");
    println!("Elevation:   {:>8.2}% ({:?})", percent(elevation_time, total), elevation_time);
    println!("Calibration: {:>8.2}% ({:?})", percent(calibration_time, total), calibration_time);
    println!("Hydrology:   {:>8.2}% ({:?})", percent(moisture_time, total), moisture_time);
    println!("─────────────────────────────────");
    println!("Total:       {:?}", total);
    println!(
        "Parallel speedup: {:.2}x",
        single_time.as_secs_f64() / elevation_time.as_secs_f64().max(f64::EPSILON)
    );
    Ok(())
}
