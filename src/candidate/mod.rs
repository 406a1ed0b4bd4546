//! Candidate emitter search and windowing.
//!
//! Detection is a block-based non-maximum suppression followed by an
//! 8-neighbor noise-rejection pass; windowing converts each surviving
//! candidate into an owned pixel block sized to the spot.

pub mod detect;
pub mod noise;
pub mod window;

use crate::image::PlaneIndex;

pub use detect::{CandidateDetector, DetectionParams, Prefilter};
pub use noise::estimate_noise;
pub use window::{BoundedWindow, SpotWindower, WindowParams, WindowPolicy, WindowReject};

/// Local maximum found on one plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// X coordinate (column) of the maximum.
    pub x: usize,
    /// Y coordinate (row) of the maximum.
    pub y: usize,
    /// Pixel value at the maximum on the searched (possibly filtered) plane.
    pub value: f32,
    /// Plane the candidate belongs to.
    pub plane: PlaneIndex,
    /// Position of the candidate in the sorted per-plane list.
    pub index: usize,
}

/// Sorts candidates by x, then y, and renumbers their per-plane index.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| a.x.cmp(&b.x).then_with(|| a.y.cmp(&b.y)));
    for (index, cand) in candidates.iter_mut().enumerate() {
        cand.index = index;
    }
}

#[cfg(test)]
mod tests {
    use super::{sort_candidates, Candidate};
    use crate::image::PlaneIndex;

    fn cand(x: usize, y: usize) -> Candidate {
        Candidate {
            x,
            y,
            value: 1.0,
            plane: PlaneIndex::default(),
            index: 99,
        }
    }

    #[test]
    fn sort_orders_by_x_then_y_and_renumbers() {
        let mut cands = vec![cand(5, 1), cand(2, 9), cand(2, 3)];
        sort_candidates(&mut cands);
        let order: Vec<_> = cands.iter().map(|c| (c.x, c.y, c.index)).collect();
        assert_eq!(order, vec![(2, 3, 0), (2, 9, 1), (5, 1, 2)]);
    }
}
