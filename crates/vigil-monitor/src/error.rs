//! Error types for the monitor.

use thiserror::Error;

/// Result type for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors that can occur while supervising the pipelines.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] vigil_pipeline::PipelineError),

    #[error("Media error: {0}")]
    Media(#[from] vigil_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
