//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while handling frames and video streams.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("Invalid frame buffer: {0}")]
    InvalidFrame(String),

    #[error("Empty crop region for rect ({x}, {y}, {w}, {h})")]
    EmptyRegion { x: i64, y: i64, w: i64, h: i64 },

    #[error("Tile detection failed: {0}")]
    DetectionFailed(String),

    #[error("Writer closed: {0}")]
    WriterClosed(PathBuf),

    #[error("Stream ended")]
    StreamEnded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encode error: {0}")]
    ImageEncode(#[from] image::ImageError),
}

impl MediaError {
    /// Create an invalid frame error.
    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame(message.into())
    }

    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            exit_code,
        }
    }
}
