//! RGB histogram cosine similarity.
//!
//! Used by the continuous-detection filter to decide whether a fresh
//! candidate is the same object drifting through the scene. Histogram
//! comparison tolerates the rotation and mild scale changes a drifting
//! object goes through between nearby frames.

use crate::frame::Frame;

/// Bins per color channel.
const BINS: usize = 32;

const BIN_WIDTH: usize = 256 / BINS;

/// Per-channel color histogram, concatenated into one vector.
fn rgb_histogram(frame: &Frame) -> [f64; BINS * 3] {
    let mut hist = [0.0; BINS * 3];
    let data = frame.data();
    for y in 0..frame.height() as usize {
        for x in 0..frame.width() as usize {
            for c in 0..3 {
                hist[c * BINS + data[[y, x, c]] as usize / BIN_WIDTH] += 1.0;
            }
        }
    }
    hist
}

/// Cosine similarity of the RGB histograms of two patches.
///
/// Returns 0.0 when either patch is degenerate (all-empty histogram).
pub fn hist_cosine_similarity(a: &Frame, b: &Frame) -> f64 {
    let ha = rgb_histogram(a);
    let hb = rgb_histogram(b);
    let dot: f64 = ha.iter().zip(hb.iter()).map(|(x, y)| x * y).sum();
    let na: f64 = ha.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb: f64 = hb.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(r: u8, g: u8, b: u8) -> Frame {
        let mut frame = Frame::zeros(16, 16);
        for y in 0..16 {
            for x in 0..16 {
                frame.data_mut()[[y, x, 0]] = r;
                frame.data_mut()[[y, x, 1]] = g;
                frame.data_mut()[[y, x, 2]] = b;
            }
        }
        frame
    }

    #[test]
    fn test_identical_patches_are_similar() {
        let a = solid(120, 40, 200);
        let sim = hist_cosine_similarity(&a, &a.clone());
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_colors_are_dissimilar() {
        let a = solid(10, 10, 10);
        let b = solid(250, 250, 250);
        assert!(hist_cosine_similarity(&a, &b) < 1e-9);
    }

    #[test]
    fn test_similarity_is_scale_tolerant() {
        let a = solid(120, 40, 200);
        let b = {
            let mut f = Frame::zeros(8, 8);
            for y in 0..8 {
                for x in 0..8 {
                    f.data_mut()[[y, x, 0]] = 120;
                    f.data_mut()[[y, x, 1]] = 40;
                    f.data_mut()[[y, x, 2]] = 200;
                }
            }
            f
        };
        assert!((hist_cosine_similarity(&a, &b) - 1.0).abs() < 1e-9);
    }
}
