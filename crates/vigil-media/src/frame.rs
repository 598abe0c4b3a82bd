//! ndarray-backed RGB frame buffers.

use ndarray::{s, Array2, Array3};
use vigil_models::ChannelConfig;

use crate::error::{MediaError, MediaResult};

/// A decoded video frame: H×W×3 `u8`, RGB channel order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Array3<u8>,
}

impl Frame {
    /// Wrap an existing buffer. The innermost axis must hold 3 channels.
    pub fn new(data: Array3<u8>) -> MediaResult<Self> {
        if data.shape()[2] != 3 {
            return Err(MediaError::invalid_frame(format!(
                "expected 3 channels, got {}",
                data.shape()[2]
            )));
        }
        Ok(Self { data })
    }

    /// All-black frame of the given shape.
    pub fn zeros(height: u32, width: u32) -> Self {
        Self {
            data: Array3::zeros((height as usize, width as usize, 3)),
        }
    }

    /// Build a frame from packed RGB24 bytes, row-major.
    pub fn from_raw(height: u32, width: u32, bytes: Vec<u8>) -> MediaResult<Self> {
        let expected = height as usize * width as usize * 3;
        if bytes.len() != expected {
            return Err(MediaError::invalid_frame(format!(
                "raw buffer holds {} bytes, {}x{} frame needs {}",
                bytes.len(),
                width,
                height,
                expected
            )));
        }
        let data = Array3::from_shape_vec((height as usize, width as usize, 3), bytes)
            .map_err(|e| MediaError::invalid_frame(e.to_string()))?;
        Ok(Self { data })
    }

    pub fn height(&self) -> u32 {
        self.data.shape()[0] as u32
    }

    pub fn width(&self) -> u32 {
        self.data.shape()[1] as u32
    }

    /// Shape as (height, width).
    pub fn shape(&self) -> (u32, u32) {
        (self.height(), self.width())
    }

    pub fn data(&self) -> &Array3<u8> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<u8> {
        &mut self.data
    }

    /// Crop `[y0, y1) × [x0, x1)`, clamped to the frame bounds.
    ///
    /// Fails when the clamped window is empty.
    pub fn region(&self, y0: i64, y1: i64, x0: i64, x1: i64) -> MediaResult<Frame> {
        let h = self.height() as i64;
        let w = self.width() as i64;
        let cy0 = y0.clamp(0, h) as usize;
        let cy1 = y1.clamp(0, h) as usize;
        let cx0 = x0.clamp(0, w) as usize;
        let cx1 = x1.clamp(0, w) as usize;
        if cy1 <= cy0 || cx1 <= cx0 {
            return Err(MediaError::EmptyRegion {
                x: x0,
                y: y0,
                w: x1 - x0,
                h: y1 - y0,
            });
        }
        Ok(Frame {
            data: self.data.slice(s![cy0..cy1, cx0..cx1, ..]).to_owned(),
        })
    }

    /// Nearest-neighbor resize.
    pub fn resize_nearest(&self, height: u32, width: u32) -> Frame {
        let (sh, sw) = (self.height() as usize, self.width() as usize);
        let (dh, dw) = (height as usize, width as usize);
        let mut out = Array3::zeros((dh, dw, 3));
        for y in 0..dh {
            let sy = (y * sh / dh).min(sh - 1);
            for x in 0..dw {
                let sx = (x * sw / dw).min(sw - 1);
                for c in 0..3 {
                    out[[y, x, c]] = self.data[[sy, sx, c]];
                }
            }
        }
        Frame { data: out }
    }

    /// Single-channel luminance plane (integer BT.601 weights).
    pub fn gray(&self) -> Array2<u8> {
        let (h, w) = (self.height() as usize, self.width() as usize);
        let mut out = Array2::zeros((h, w));
        for y in 0..h {
            for x in 0..w {
                let r = self.data[[y, x, 0]] as u32;
                let g = self.data[[y, x, 1]] as u32;
                let b = self.data[[y, x, 2]] as u32;
                out[[y, x]] = ((r * 299 + g * 587 + b * 114) / 1000) as u8;
            }
        }
        out
    }

    /// Packed RGB24 bytes, row-major.
    pub fn to_raw(&self) -> Vec<u8> {
        self.data.as_standard_layout().iter().copied().collect()
    }

    /// Convert to an `image` buffer for PNG encoding.
    pub fn to_image(&self) -> image::RgbImage {
        let (h, w) = self.shape();
        // shape is validated on construction, so from_raw cannot fail here
        image::RgbImage::from_raw(w, h, self.to_raw()).unwrap_or_else(|| {
            image::RgbImage::new(w, h)
        })
    }
}

/// Normalize an incoming frame to the channel's configured shape.
///
/// Frames already matching the configured shape pass through untouched.
pub fn preprocess(frame: &Frame, cfg: &ChannelConfig) -> Frame {
    if frame.shape() == cfg.shape {
        frame.clone()
    } else {
        frame.resize_nearest(cfg.height(), cfg.width())
    }
}
