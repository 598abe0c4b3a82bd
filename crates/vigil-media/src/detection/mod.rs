//! Detection interfaces: tile kernels and the candidate classifier.
//!
//! The pipeline core treats both as injected collaborators. A tile kernel
//! is a pure function of one tile block; the classifier turns a candidate
//! patch into a hit/miss verdict. [`ThresholdDetector`] is the built-in
//! luminance kernel for streams with a dark, stable background.

mod threshold;

pub use threshold::{LuminanceClassifier, ThresholdDetector};

use ndarray::Array2;
use vigil_models::{FrameIndex, Rect};

use crate::error::MediaResult;
use crate::frame::Frame;
use crate::geometry::TileGeometry;

/// One cropped tile submitted to a detector.
#[derive(Debug, Clone)]
pub struct TileBlock {
    /// Index of the source frame.
    pub frame_index: FrameIndex,
    /// The cropped tile region.
    pub tile: Frame,
    /// Shape of the full source frame (height, width).
    pub frame_shape: (u32, u32),
}

/// Static parameters of one tile position.
#[derive(Debug, Clone, Copy)]
pub struct TileParams {
    /// Channel the grid belongs to (for logging only).
    pub channel: u32,
    pub row: u32,
    pub col: u32,
    pub geometry: TileGeometry,
}

/// Output of one tile kernel run.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub frame_index: FrameIndex,
    pub row: u32,
    pub col: u32,
    /// Binary foreground mask of the tile.
    pub binary: Array2<u8>,
    /// Candidate rectangles in tile-local coordinates.
    pub rects: Vec<Rect>,
}

/// A per-tile detection kernel. Stateless and side-effect-free, safe to
/// call from any worker.
pub trait TileDetect: Send + Sync {
    fn detect(&self, block: &TileBlock, params: &TileParams) -> MediaResult<DetectionResult>;
}

/// Classifier verdict on a candidate patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Hit,
    Miss,
}

/// Binary classifier over candidate patches.
pub trait Classifier: Send + Sync {
    fn predict(&self, patch: &Frame) -> MediaResult<Verdict>;
}
