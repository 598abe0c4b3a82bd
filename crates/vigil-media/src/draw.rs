//! Box and grid drawing on RGB frames.

use rand::Rng;

use crate::frame::Frame;
use crate::geometry::TileGeometry;

/// Stroke width used for detection boxes.
pub const BOX_THICKNESS: u32 = 2;

/// Pick a random draw color, one per rectangle.
pub fn random_color() -> [u8; 3] {
    let mut rng = rand::rng();
    [
        rng.random_range(0..=255),
        rng.random_range(0..=255),
        rng.random_range(0..=255),
    ]
}

fn paint(frame: &mut Frame, y: u32, x: u32, color: [u8; 3]) {
    if y < frame.height() && x < frame.width() {
        for (c, v) in color.iter().enumerate() {
            frame.data_mut()[[y as usize, x as usize, c]] = *v;
        }
    }
}

/// Draw an axis-aligned rectangle outline between two corner points.
pub fn draw_rectangle(frame: &mut Frame, p1: (u32, u32), p2: (u32, u32), color: [u8; 3]) {
    let (x1, y1) = p1;
    let (x2, y2) = p2;
    for t in 0..BOX_THICKNESS {
        for x in x1..=x2 {
            paint(frame, y1.saturating_add(t), x, color);
            paint(frame, y2.saturating_sub(t), x, color);
        }
        for y in y1..=y2 {
            paint(frame, y, x1.saturating_add(t), color);
            paint(frame, y, x2.saturating_sub(t), color);
        }
    }
}

/// Draw the tile grid over a reconstructed frame (preview aid).
pub fn draw_boundary(frame: &mut Frame, geometry: &TileGeometry) {
    const GRID: [u8; 3] = [255, 255, 255];
    for row in 1..geometry.rows {
        let y = row * geometry.tile_h;
        for x in 0..frame.width() {
            paint(frame, y, x, GRID);
        }
    }
    for col in 1..geometry.cols {
        let x = col * geometry.tile_w;
        for y in 0..frame.height() {
            paint(frame, y, x, GRID);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_models::TileRoutine;

    #[test]
    fn test_draw_rectangle_edges() {
        let mut frame = Frame::zeros(20, 20);
        draw_rectangle(&mut frame, (2, 3), (10, 12), [9, 8, 7]);
        // corners painted
        assert_eq!(frame.data()[[3, 2, 0]], 9);
        assert_eq!(frame.data()[[12, 10, 1]], 8);
        // interior untouched
        assert_eq!(frame.data()[[7, 6, 0]], 0);
    }

    #[test]
    fn test_draw_rectangle_stays_in_bounds() {
        let mut frame = Frame::zeros(8, 8);
        draw_rectangle(&mut frame, (0, 0), (7, 7), [255, 255, 255]);
        assert_eq!(frame.data()[[0, 0, 0]], 255);
        assert_eq!(frame.data()[[7, 7, 0]], 255);
    }

    #[test]
    fn test_draw_boundary_grid_lines() {
        let mut frame = Frame::zeros(8, 8);
        let geo = TileGeometry::new((8, 8), TileRoutine { rows: 2, cols: 2 });
        draw_boundary(&mut frame, &geo);
        assert_eq!(frame.data()[[4, 0, 0]], 255);
        assert_eq!(frame.data()[[0, 4, 0]], 255);
        assert_eq!(frame.data()[[1, 1, 0]], 0);
    }
}
