//! Fault-perturbation terrain library
//!
//! Builds a wraparound elevation map from many random faults spread over
//! parallel workers, calibrates a water level for a requested land fraction
//! and derives moisture by running rivers downhill.

pub mod calibrate;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod export;
pub mod fault;
pub mod grid;
pub mod hydrology;
pub mod protocol;
pub mod seeds;
pub mod worker;
pub mod world;

pub use config::GenerationConfig;
pub use error::{Result, TerrainError};
pub use grid::Grid;
pub use world::{generate_terrain, GenerationEvent, Terrain, TerrainSession};

use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber used by every binary.
///
/// `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
