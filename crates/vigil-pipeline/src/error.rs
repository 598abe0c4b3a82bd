//! Error types for the detection pipeline.

use thiserror::Error;
use vigil_media::MediaError;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur inside a stream pipeline.
///
/// Most failures are handled locally (a dropped sample, a skipped clip);
/// only errors that make the whole channel unusable bubble out of the
/// controller task.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Tile worker panicked: {0}")]
    TileWorker(String),

    #[error("Tile result set incomplete: expected {expected}, got {got}")]
    IncompleteSample { expected: usize, got: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Create a tile worker failure.
    pub fn tile_worker(message: impl Into<String>) -> Self {
        Self::TileWorker(message.into())
    }
}
