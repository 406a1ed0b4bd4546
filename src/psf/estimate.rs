//! Initial parameter estimates from the raw window pixels.

use crate::candidate::BoundedWindow;

/// Moment-based starting values in window-local pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Estimate {
    pub amplitude: f64,
    pub background: f64,
    pub center_x: f64,
    pub center_y: f64,
}

/// Estimates background, amplitude and center of the spot in `window`.
///
/// The background is the mean of the border pixels and the amplitude is the
/// peak above it. The center is the centroid of the background-subtracted
/// intensity (negative values clipped); a window with no signal above the
/// background falls back to its geometric center.
pub fn estimate(window: &BoundedWindow) -> Estimate {
    let side = window.side();
    let pixels = window.pixels();
    let last = side - 1;

    let mut border_sum = 0.0f64;
    let mut border_count = 0usize;
    let mut peak = f64::NEG_INFINITY;
    for (i, &v) in pixels.iter().enumerate() {
        let (x, y) = (i % side, i / side);
        let v = v as f64;
        peak = peak.max(v);
        if x == 0 || y == 0 || x == last || y == last {
            border_sum += v;
            border_count += 1;
        }
    }
    let background = if border_count > 0 {
        border_sum / border_count as f64
    } else {
        0.0
    };

    let (mut sum, mut sum_x, mut sum_y) = (0.0f64, 0.0f64, 0.0f64);
    for (i, &v) in pixels.iter().enumerate() {
        let w = (v as f64 - background).max(0.0);
        sum += w;
        sum_x += w * (i % side) as f64;
        sum_y += w * (i / side) as f64;
    }
    let mid = window.half_width() as f64;
    let (center_x, center_y) = if sum > 0.0 {
        (sum_x / sum, sum_y / sum)
    } else {
        (mid, mid)
    };

    Estimate {
        amplitude: peak - background,
        background,
        center_x,
        center_y,
    }
}

#[cfg(test)]
mod tests {
    use super::estimate;
    use crate::candidate::{BoundedWindow, Candidate};
    use crate::image::PlaneIndex;

    fn window(pixels: Vec<f32>, half_width: usize) -> BoundedWindow {
        let cand = Candidate {
            x: 10,
            y: 10,
            value: 0.0,
            plane: PlaneIndex::default(),
            index: 0,
        };
        BoundedWindow::new(cand, 10, 10, half_width, pixels).unwrap()
    }

    #[test]
    fn flat_border_and_offset_peak() {
        let mut pixels = vec![5.0f32; 25];
        pixels[2 * 5 + 3] = 105.0;
        let est = estimate(&window(pixels, 2));
        assert_eq!(est.background, 5.0);
        assert_eq!(est.amplitude, 100.0);
        assert_eq!((est.center_x, est.center_y), (3.0, 2.0));
    }

    #[test]
    fn flat_window_falls_back_to_center() {
        let est = estimate(&window(vec![7.0f32; 49], 3));
        assert_eq!((est.center_x, est.center_y), (3.0, 3.0));
        assert_eq!(est.amplitude, 0.0);
    }
}
