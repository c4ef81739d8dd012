use std::path::PathBuf;
use std::process;

use clap::Parser;

use fault_terrain::export::{export_json, export_pngs};
use fault_terrain::fault::FaultKind;
use fault_terrain::hydrology::MoistureMode;
use fault_terrain::{init_logging, GenerationConfig, GenerationEvent, Result, TerrainSession};

#[derive(Parser, Debug)]
#[command(name = "fault_terrain")]
#[command(about = "Generate wraparound fault terrain with rivers")]
struct Args {
    /// JSON configuration file (flags below override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Width of the map in cells
    #[arg(short = 'W', long)]
    width: Option<usize>,

    /// Height of the map in cells
    #[arg(short = 'H', long)]
    height: Option<usize>,

    /// Total number of faults
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Parallel shares, including the local one
    #[arg(short, long)]
    workers: Option<usize>,

    /// Fraction of the map below water (0.0 to <1.0)
    #[arg(short, long)]
    land_percent: Option<f64>,

    /// Number of rivers for the moisture map
    #[arg(long)]
    moisture_iterations: Option<usize>,

    #[arg(long, value_enum)]
    moisture_mode: Option<MoistureMode>,

    #[arg(long, value_enum)]
    fault_shape: Option<FaultKind>,

    /// Random seed (uses random seed if not specified)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Run shares in this `fault_worker` executable instead of threads
    #[arg(long)]
    worker_program: Option<PathBuf>,

    /// Seconds to wait for each worker
    #[arg(long)]
    worker_timeout: Option<u64>,

    /// Fail instead of rerunning unresponsive shares locally
    #[arg(long)]
    no_fallback: bool,

    /// Write the terrain as JSON to this path
    #[arg(long)]
    export_json: Option<PathBuf>,

    /// Write grayscale PNG previews as PREFIX_elevation.png etc.
    #[arg(long)]
    export_png: Option<String>,
}

impl Args {
    fn to_config(&self) -> Result<GenerationConfig> {
        let mut config = match &self.config {
            Some(path) => GenerationConfig::from_json_file(path)?,
            None => GenerationConfig::default(),
        };

        config.width = self.width.unwrap_or(config.width);
        config.height = self.height.unwrap_or(config.height);
        config.iterations = self.iterations.unwrap_or(config.iterations);
        config.worker_count = self.workers.unwrap_or(config.worker_count);
        config.land_percent = self.land_percent.unwrap_or(config.land_percent);
        config.moisture_iterations = self.moisture_iterations.unwrap_or(config.moisture_iterations);
        config.moisture_mode = self.moisture_mode.unwrap_or(config.moisture_mode);
        config.fault_shape = self.fault_shape.unwrap_or(config.fault_shape);
        config.worker_timeout_secs = self.worker_timeout.unwrap_or(config.worker_timeout_secs);
        config.seed = self.seed.or(config.seed);
        config.worker_program = self.worker_program.clone().or(config.worker_program.take());
        if self.no_fallback {
            config.fallback_to_local = false;
        }

        config.validate()?;
        Ok(config)
    }
}

fn run(args: &Args) -> Result<()> {
    let config = args.to_config()?;
    println!("Map size: {}x{}", config.width, config.height);
    println!(
        "Faults: {} ({} shape) across {} workers",
        config.iterations, config.fault_shape, config.worker_count
    );

    let mut session = TerrainSession::new(config)?;
    let terrain = session.regenerate(|event| match event {
        GenerationEvent::WorkersStarted => println!("Workers started, building elevation..."),
        GenerationEvent::ElevationMerged => println!("Elevation merged"),
        GenerationEvent::WaterLevelComputed(level) => println!("Water level: {:.1}", level),
        GenerationEvent::MoistureSimulated => println!("Moisture simulated"),
        GenerationEvent::Complete => println!("Generation complete"),
    })?;

    let stats = &terrain.stats;
    println!("\n=== Summary ===");
    println!("Seed: {}", terrain.seeds.master);
    println!(
        "Elevation: {:.1} to {:.1} (mean {:.1})",
        stats.elevation.min, stats.elevation.max, stats.elevation.mean
    );
    println!(
        "Submerged: {:.1}% (requested {:.1}%)",
        100.0 * terrain.submerged_fraction(),
        100.0 * terrain.land_percent
    );
    println!(
        "Rivers: {} ({} reached the sea, {} pooled, {} ran dry), longest {} cells",
        stats.hydrology.rivers,
        stats.hydrology.reached_sea,
        stats.hydrology.local_minima,
        stats.hydrology.exhausted,
        stats.hydrology.longest
    );
    if stats.fallbacks > 0 {
        println!("Shares rerun locally: {}", stats.fallbacks);
    }
    println!(
        "Timings: elevation {:?}, water level {:?}, moisture {:?}",
        stats.elevation_time, stats.calibration_time, stats.moisture_time
    );

    if let Some(path) = &args.export_json {
        export_json(terrain, path)?;
        println!("Wrote {}", path.display());
    }
    if let Some(prefix) = &args.export_png {
        for path in export_pngs(terrain, prefix)? {
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn main() {
    init_logging();
    let args = Args::parse();

    if let Err(err) = run(&args) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}
