//! Error taxonomy for terrain generation.

use thiserror::Error;

/// Everything that can abort a generation pass.
#[derive(Error, Debug)]
pub enum TerrainError {
    /// Grid (or region) too small for the distance math.
    #[error("Invalid dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    /// Caller supplied an out-of-range parameter.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A dispatched share never produced a usable result.
    #[error("Worker {worker} unavailable: {reason}")]
    WorkerUnavailable { worker: usize, reason: String },

    #[error("Async runtime error: {0}")]
    Runtime(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, TerrainError>;
