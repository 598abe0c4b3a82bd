//! Built-in luminance-threshold tile kernel.

use ndarray::Array2;
use vigil_models::Rect;

use super::{DetectionResult, TileBlock, TileDetect, TileParams};
use crate::error::MediaResult;

/// Threshold kernel: foreground is everything brighter than `threshold`,
/// candidates are the bounding boxes of 4-connected foreground components
/// covering at least `min_area` pixels.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdDetector {
    pub threshold: u8,
    pub min_area: usize,
}

impl Default for ThresholdDetector {
    fn default() -> Self {
        Self {
            threshold: 180,
            min_area: 16,
        }
    }
}

impl TileDetect for ThresholdDetector {
    fn detect(&self, block: &TileBlock, params: &TileParams) -> MediaResult<DetectionResult> {
        let gray = block.tile.gray();
        let binary = gray.mapv(|v| if v > self.threshold { 255u8 } else { 0u8 });
        let rects = components(&binary, self.min_area);
        Ok(DetectionResult {
            frame_index: block.frame_index,
            row: params.row,
            col: params.col,
            binary,
            rects,
        })
    }
}

/// Companion classifier for the threshold kernel: a candidate patch is a
/// hit when its mean luminance clears the same brightness bar.
#[derive(Debug, Clone, Copy)]
pub struct LuminanceClassifier {
    pub min_mean: u8,
}

impl Default for LuminanceClassifier {
    fn default() -> Self {
        Self { min_mean: 60 }
    }
}

impl super::Classifier for LuminanceClassifier {
    fn predict(&self, patch: &crate::frame::Frame) -> MediaResult<super::Verdict> {
        let gray = patch.gray();
        let total: u64 = gray.iter().map(|v| *v as u64).sum();
        let mean = total / gray.len().max(1) as u64;
        if mean >= self.min_mean as u64 {
            Ok(super::Verdict::Hit)
        } else {
            Ok(super::Verdict::Miss)
        }
    }
}

/// Bounding rectangles of 4-connected foreground components.
fn components(binary: &Array2<u8>, min_area: usize) -> Vec<Rect> {
    let (h, w) = binary.dim();
    let mut visited = Array2::<bool>::default((h, w));
    let mut rects = Vec::new();
    let mut stack = Vec::new();

    for sy in 0..h {
        for sx in 0..w {
            if binary[[sy, sx]] == 0 || visited[[sy, sx]] {
                continue;
            }
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (sx, sy, sx, sy);
            let mut area = 0usize;
            visited[[sy, sx]] = true;
            stack.push((sy, sx));
            while let Some((y, x)) = stack.pop() {
                area += 1;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
                let mut push = |ny: usize, nx: usize, visited: &mut Array2<bool>| {
                    if binary[[ny, nx]] != 0 && !visited[[ny, nx]] {
                        visited[[ny, nx]] = true;
                        stack.push((ny, nx));
                    }
                };
                if y > 0 {
                    push(y - 1, x, &mut visited);
                }
                if y + 1 < h {
                    push(y + 1, x, &mut visited);
                }
                if x > 0 {
                    push(y, x - 1, &mut visited);
                }
                if x + 1 < w {
                    push(y, x + 1, &mut visited);
                }
            }
            if area >= min_area {
                rects.push(Rect::new(
                    min_x as i64,
                    min_y as i64,
                    (max_x - min_x + 1) as i64,
                    (max_y - min_y + 1) as i64,
                ));
            }
        }
    }
    rects
}
