//! Tile grid geometry and bounding-box expansion.

use vigil_models::{ChannelConfig, Rect, TileRoutine};

use crate::error::MediaResult;
use crate::frame::Frame;

/// Side length of classifier label crops.
pub const LABEL_CROP_SIZE: i64 = 224;

/// Pixel geometry of the `rows × cols` tile grid for one channel.
///
/// Step sizes use integer division of the configured frame shape, so a
/// remainder strip on the right/bottom edge is never dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    pub rows: u32,
    pub cols: u32,
    pub tile_h: u32,
    pub tile_w: u32,
}

impl TileGeometry {
    /// Derive the grid from a frame shape (height, width) and routine.
    pub fn new(shape: (u32, u32), routine: TileRoutine) -> Self {
        Self {
            rows: routine.rows,
            cols: routine.cols,
            tile_h: shape.0 / routine.rows,
            tile_w: shape.1 / routine.cols,
        }
    }

    /// Derive the grid from a channel configuration.
    pub fn from_config(cfg: &ChannelConfig) -> Self {
        Self::new(cfg.shape, cfg.routine)
    }

    pub fn tiles(&self) -> usize {
        (self.rows * self.cols) as usize
    }

    /// Top-left pixel of a tile.
    pub fn origin(&self, row: u32, col: u32) -> (i64, i64) {
        ((row * self.tile_h) as i64, (col * self.tile_w) as i64)
    }

    /// Crop one tile out of a frame.
    pub fn crop_tile(&self, frame: &Frame, row: u32, col: u32) -> MediaResult<Frame> {
        let (y0, x0) = self.origin(row, col);
        frame.region(
            y0,
            y0 + self.tile_h as i64,
            x0,
            x0 + self.tile_w as i64,
        )
    }

    /// Translate a tile-local rectangle into full-frame coordinates.
    pub fn translate(&self, rect: Rect, row: u32, col: u32) -> Rect {
        let (y0, x0) = self.origin(row, col);
        rect.offset(x0, y0)
    }
}

/// Expanded, clamped corner points for drawing a rectangle.
///
/// `p1 = clamp((x+dx − pad, y+dy − pad))`, `p2 = clamp((x+dx+w+pad, y+dy+h+pad))`,
/// both clamped to the frame shape.
pub fn bbox_points(
    pad: i64,
    rect: Rect,
    shape: (u32, u32),
    dx: i64,
    dy: i64,
) -> ((u32, u32), (u32, u32)) {
    let max_x = shape.1.saturating_sub(1) as i64;
    let max_y = shape.0.saturating_sub(1) as i64;
    let p1 = (
        (rect.x + dx - pad).clamp(0, max_x) as u32,
        (rect.y + dy - pad).clamp(0, max_y) as u32,
    );
    let p2 = (
        (rect.right() + dx + pad).clamp(0, max_x) as u32,
        (rect.bottom() + dy + pad).clamp(0, max_y) as u32,
    );
    (p1, p2)
}

/// Crop the expanded bounds of a rectangle out of a frame.
pub fn crop_by_rect(pad: i64, rect: Rect, frame: &Frame) -> MediaResult<Frame> {
    let ((x1, y1), (x2, y2)) = bbox_points(pad, rect, frame.shape(), 0, 0);
    frame.region(y1 as i64, y2 as i64 + 1, x1 as i64, x2 as i64 + 1)
}

/// Crop a square label patch centered on the rectangle, clamped to bounds.
///
/// The window is shifted (not shrunk) when the center sits near an edge, so
/// the result keeps the full label size whenever the frame allows it.
pub fn crop_center(frame: &Frame, rect: Rect) -> MediaResult<Frame> {
    let (cx, cy) = rect.center();
    let h = frame.height() as i64;
    let w = frame.width() as i64;
    let side_y = LABEL_CROP_SIZE.min(h);
    let side_x = LABEL_CROP_SIZE.min(w);
    let y0 = (cy - side_y / 2).clamp(0, h - side_y);
    let x0 = (cx - side_x / 2).clamp(0, w - side_x);
    frame.region(y0, y0 + side_y, x0, x0 + side_x)
}
