//! Video I/O interfaces and FFmpeg CLI implementations.
//!
//! The pipeline consumes frames through [`FrameSource`] and emits clips
//! through [`VideoWriter`]; both are trait objects so tests can substitute
//! in-memory fakes. The production implementations shell out to FFmpeg
//! with raw RGB24 pipes.

mod ffmpeg;
mod source;

pub use ffmpeg::{FfmpegVideoWriter, FfmpegWriterFactory};
pub use source::{FfmpegFrameSource, FfmpegSourceFactory};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use vigil_models::ChannelConfig;

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Default clip frame rate.
pub const CLIP_FPS: f64 = 24.0;

/// Produces decoded frames at the configured sample cadence.
///
/// Returns `Ok(None)` on end of stream. The dispatcher assigns its own
/// indices regardless of any source-side counting.
#[async_trait]
pub trait FrameSource: Send {
    async fn next(&mut self) -> MediaResult<Option<Frame>>;
}

/// An open clip file accepting frames in display order.
#[async_trait]
pub trait VideoWriter: Send {
    /// Append one frame.
    async fn write(&mut self, frame: &Frame) -> MediaResult<()>;

    /// Flush and close the container. The writer is unusable afterwards.
    async fn finish(&mut self) -> MediaResult<()>;

    /// Frames appended so far.
    fn frames_written(&self) -> u64;

    /// Destination path.
    fn path(&self) -> &Path;
}

/// Opens clip writers; injected into render tasks.
#[async_trait]
pub trait WriterFactory: Send + Sync {
    async fn open(
        &self,
        path: &Path,
        fps: f64,
        size: (u32, u32),
    ) -> MediaResult<Box<dyn VideoWriter>>;
}

/// Opens the frame source for one channel.
#[async_trait]
pub trait SourceFactory: Send + Sync {
    async fn open(&self, cfg: &ChannelConfig) -> MediaResult<Box<dyn FrameSource>>;
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}
