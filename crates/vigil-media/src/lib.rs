#![deny(unreachable_patterns)]
//! Frame buffers, tile geometry, and FFmpeg CLI video I/O.
//!
//! This crate provides:
//! - ndarray-backed RGB frame buffers with clamped cropping and resizing
//! - Tile grid geometry and bounding-box expansion helpers
//! - Box drawing and RGB histogram cosine similarity
//! - The external-collaborator interfaces (frame source, tile detector,
//!   classifier, video writer) and FFmpeg-CLI-backed implementations

pub mod detection;
pub mod draw;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod hist;
pub mod video;

pub use detection::{
    Classifier, DetectionResult, LuminanceClassifier, ThresholdDetector, TileBlock, TileDetect,
    TileParams, Verdict,
};
pub use draw::{draw_boundary, draw_rectangle, random_color};
pub use error::{MediaError, MediaResult};
pub use frame::{preprocess, Frame};
pub use geometry::{bbox_points, crop_by_rect, crop_center, TileGeometry};
pub use hist::hist_cosine_similarity;
pub use video::{
    check_ffmpeg, FfmpegFrameSource, FfmpegSourceFactory, FfmpegVideoWriter, FfmpegWriterFactory,
    FrameSource, SourceFactory, VideoWriter, WriterFactory, CLIP_FPS,
};
