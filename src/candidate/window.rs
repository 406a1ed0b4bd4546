//! Adaptive window sizing around detected candidates.
//!
//! The windower measures how far the spot extends above its half-maximum
//! level and cuts a square block with that half-width, never narrower than the
//! detector's search half-size. A block holding a second maximum above the
//! half-maximum level is dropped rather than fitted as one spot. The block is
//! copied out of the plane; windows never alias the source buffer.

use crate::candidate::Candidate;
use crate::image::ImageView;
use crate::util::{LocalizeError, LocalizeResult};
use thiserror::Error;

/// How the spot extent is measured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WindowPolicy {
    /// Grow uniformly while the mean of the four edge midpoints stays above
    /// half maximum; the center stays on the detected pixel.
    #[default]
    AveragedCentered,
    /// Grow the four edges independently, each stopping below half maximum
    /// or when the profile starts rising again, then re-center.
    DirectionalCentering,
}

/// Window sizing parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowParams {
    /// Extent measurement policy.
    pub policy: WindowPolicy,
    /// Upper bound on the window half-width in pixels.
    pub max_half_width: usize,
}

impl Default for WindowParams {
    fn default() -> Self {
        Self {
            policy: WindowPolicy::AveragedCentered,
            max_half_width: 8,
        }
    }
}

/// Reason a candidate produced no window.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum WindowReject {
    /// The candidate is too close to the plane border to be fully windowed.
    #[error("candidate too close to the plane border")]
    NearBorder,
    /// Re-centering moved farther than the search half-size from the maximum.
    #[error("window center drifted away from the detected maximum")]
    CenterDrift,
    /// A second maximum above half maximum lies inside the window.
    #[error("window holds a second spot above half maximum")]
    Crowded,
}

/// Candidate plus an owned square pixel block centered on the spot.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundedWindow {
    candidate: Candidate,
    center_x: usize,
    center_y: usize,
    half_width: usize,
    pixels: Vec<f32>,
}

impl BoundedWindow {
    /// Builds a window from an explicit pixel block.
    ///
    /// `pixels` must hold `(2 * half_width + 1)^2` values in row-major order;
    /// `(center_x, center_y)` is the plane coordinate of the block center.
    pub fn new(
        candidate: Candidate,
        center_x: usize,
        center_y: usize,
        half_width: usize,
        pixels: Vec<f32>,
    ) -> LocalizeResult<Self> {
        let side = 2 * half_width + 1;
        if pixels.len() != side * side {
            return Err(LocalizeError::BufferTooSmall {
                needed: side * side,
                got: pixels.len(),
            });
        }
        if center_x < half_width || center_y < half_width {
            return Err(LocalizeError::InvalidInput("window extends past the plane origin"));
        }
        Ok(Self {
            candidate,
            center_x,
            center_y,
            half_width,
            pixels,
        })
    }

    /// Candidate the window was cut for.
    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    /// Plane coordinates of the window center.
    pub fn center(&self) -> (usize, usize) {
        (self.center_x, self.center_y)
    }

    /// Plane coordinates of the top-left window pixel.
    pub fn origin(&self) -> (usize, usize) {
        (
            self.center_x - self.half_width,
            self.center_y - self.half_width,
        )
    }

    /// Half-width of the square block.
    pub fn half_width(&self) -> usize {
        self.half_width
    }

    /// Side length `2 * half_width + 1`.
    pub fn side(&self) -> usize {
        2 * self.half_width + 1
    }

    /// Row-major pixel block.
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Pixel at window-local coordinates.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        let side = self.side();
        if x >= side || y >= side {
            return None;
        }
        self.pixels.get(y * side + x).copied()
    }
}

/// Converts candidates into bounded windows.
#[derive(Clone, Debug)]
pub struct SpotWindower {
    params: WindowParams,
    search_half_size: usize,
}

impl SpotWindower {
    /// Creates a windower; `search_half_size` is the detector's `n`.
    pub fn new(params: WindowParams, search_half_size: usize) -> Self {
        Self {
            params,
            search_half_size,
        }
    }

    /// Cuts a window around `candidate` or reports why it cannot.
    pub fn window(
        &self,
        plane: ImageView<'_, f32>,
        candidate: &Candidate,
    ) -> Result<BoundedWindow, WindowReject> {
        let n = self.search_half_size;
        let (width, height) = (plane.width(), plane.height());
        let (x, y) = (candidate.x, candidate.y);
        if x < n || y < n || x + n >= width || y + n >= height {
            return Err(WindowReject::NearBorder);
        }

        let peak = pixel(plane, x as isize, y as isize);
        let background = box_min(plane, x, y, n);
        let threshold = background + 0.5 * (peak - background);
        let reach = self.params.max_half_width.max(1);

        let (cx, cy, radius) = match self.params.policy {
            WindowPolicy::AveragedCentered => {
                (x, y, averaged_radius(plane, x, y, threshold, reach))
            }
            WindowPolicy::DirectionalCentering => {
                directional_extent(plane, x, y, peak, threshold, reach)
            }
        };

        if cx.abs_diff(x) > n || cy.abs_diff(y) > n {
            return Err(WindowReject::CenterDrift);
        }

        let half_width = radius
            .clamp(n, self.params.max_half_width.max(n))
            .min(cx)
            .min(cy)
            .min(width.saturating_sub(cx + 1))
            .min(height.saturating_sub(cy + 1));
        if half_width < n {
            return Err(WindowReject::NearBorder);
        }
        if has_rival_maximum(plane, (cx, cy), half_width, (x, y), threshold) {
            return Err(WindowReject::Crowded);
        }

        let side = 2 * half_width + 1;
        let mut pixels = Vec::with_capacity(side * side);
        for row_y in cy - half_width..=cy + half_width {
            let Some(row) = plane.row(row_y) else {
                return Err(WindowReject::NearBorder);
            };
            pixels.extend_from_slice(&row[cx - half_width..=cx + half_width]);
        }

        Ok(BoundedWindow {
            candidate: *candidate,
            center_x: cx,
            center_y: cy,
            half_width,
            pixels,
        })
    }
}

#[inline]
fn pixel(plane: ImageView<'_, f32>, x: isize, y: isize) -> f32 {
    plane.at(x, y).unwrap_or(f32::NAN)
}

fn box_min(plane: ImageView<'_, f32>, x: usize, y: usize, n: usize) -> f32 {
    let mut min = f32::INFINITY;
    for row_y in y - n..=y + n {
        if let Some(row) = plane.row(row_y) {
            for &v in &row[x - n..=x + n] {
                min = min.min(v);
            }
        }
    }
    min
}

/// True when a strict 8-neighbor maximum above `threshold` sits inside the
/// window more than one pixel away from the candidate.
fn has_rival_maximum(
    plane: ImageView<'_, f32>,
    (cx, cy): (usize, usize),
    half_width: usize,
    (x, y): (usize, usize),
    threshold: f32,
) -> bool {
    for py in cy - half_width..=cy + half_width {
        for px in cx - half_width..=cx + half_width {
            if px.abs_diff(x) <= 1 && py.abs_diff(y) <= 1 {
                continue;
            }
            let v = pixel(plane, px as isize, py as isize);
            if !(v > threshold) {
                continue;
            }
            let mut is_max = true;
            'scan: for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    if (dx, dy) != (0, 0)
                        && pixel(plane, px as isize + dx, py as isize + dy) >= v
                    {
                        is_max = false;
                        break 'scan;
                    }
                }
            }
            if is_max {
                return true;
            }
        }
    }
    false
}

/// First radius at which the mean of the four edge midpoints is no longer
/// above `threshold`, capped at `reach`.
fn averaged_radius(
    plane: ImageView<'_, f32>,
    x: usize,
    y: usize,
    threshold: f32,
    reach: usize,
) -> usize {
    let (xi, yi) = (x as isize, y as isize);
    let mut r = 1usize;
    while r < reach {
        let d = r as isize;
        let mean = 0.25
            * (pixel(plane, xi - d, yi)
                + pixel(plane, xi + d, yi)
                + pixel(plane, xi, yi - d)
                + pixel(plane, xi, yi + d));
        if !(mean > threshold) {
            break;
        }
        r += 1;
    }
    r
}

/// Steps from the maximum along `(dx, dy)` until the profile drops below
/// `threshold` or starts rising; returns the number of steps to the edge.
fn edge_extent(
    plane: ImageView<'_, f32>,
    x: usize,
    y: usize,
    (dx, dy): (isize, isize),
    peak: f32,
    threshold: f32,
    reach: usize,
) -> usize {
    let mut prev = peak;
    for k in 1..=reach {
        let v = pixel(plane, x as isize + dx * k as isize, y as isize + dy * k as isize);
        if !(v >= threshold) {
            return k;
        }
        if v > prev {
            return (k - 1).max(1);
        }
        prev = v;
    }
    reach
}

fn directional_extent(
    plane: ImageView<'_, f32>,
    x: usize,
    y: usize,
    peak: f32,
    threshold: f32,
    reach: usize,
) -> (usize, usize, usize) {
    let left = edge_extent(plane, x, y, (-1, 0), peak, threshold, reach);
    let right = edge_extent(plane, x, y, (1, 0), peak, threshold, reach);
    let up = edge_extent(plane, x, y, (0, -1), peak, threshold, reach);
    let down = edge_extent(plane, x, y, (0, 1), peak, threshold, reach);

    let shift_x = (right as isize - left as isize) / 2;
    let shift_y = (down as isize - up as isize) / 2;
    let cx = (x as isize + shift_x).max(0) as usize;
    let cy = (y as isize + shift_y).max(0) as usize;
    let radius = ((left + right).min(up + down) / 2).max(1);
    (cx, cy, radius)
}

#[cfg(test)]
mod tests {
    use super::{SpotWindower, WindowParams, WindowPolicy, WindowReject};
    use crate::candidate::Candidate;
    use crate::image::{OwnedImage, PlaneIndex};

    fn gaussian_plane(size: usize, cx: f32, cy: f32, sigma: f32) -> OwnedImage<f32> {
        let mut data = vec![0.0f32; size * size];
        for y in 0..size {
            for x in 0..size {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                data[y * size + x] =
                    10.0 + 1000.0 * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
            }
        }
        OwnedImage::new(data, size, size).unwrap()
    }

    fn cand(x: usize, y: usize) -> Candidate {
        Candidate {
            x,
            y,
            value: 0.0,
            plane: PlaneIndex::default(),
            index: 0,
        }
    }

    #[test]
    fn averaged_window_matches_half_max_radius() {
        let img = gaussian_plane(40, 20.0, 20.0, 1.2);
        let windower = SpotWindower::new(WindowParams::default(), 2);
        let window = windower.window(img.view(), &cand(20, 20)).unwrap();
        assert_eq!(window.center(), (20, 20));
        assert_eq!(window.half_width(), 2);
        assert_eq!(window.pixels().len(), 25);
        assert_eq!(window.get(2, 2), img.view().get(20, 20).copied());
    }

    #[test]
    fn directional_window_matches_averaged_on_symmetric_spot() {
        let img = gaussian_plane(40, 20.0, 20.0, 1.2);
        let params = WindowParams {
            policy: WindowPolicy::DirectionalCentering,
            ..WindowParams::default()
        };
        let window = SpotWindower::new(params, 2)
            .window(img.view(), &cand(20, 20))
            .unwrap();
        assert_eq!(window.center(), (20, 20));
        assert_eq!(window.half_width(), 2);
    }

    #[test]
    fn half_width_never_drops_below_search_half_size() {
        let img = gaussian_plane(40, 20.0, 20.0, 1.2);
        for policy in [WindowPolicy::AveragedCentered, WindowPolicy::DirectionalCentering] {
            let params = WindowParams {
                policy,
                ..WindowParams::default()
            };
            let window = SpotWindower::new(params, 3)
                .window(img.view(), &cand(20, 20))
                .unwrap();
            assert_eq!(window.half_width(), 3, "{policy:?}");
            assert_eq!(window.origin(), (17, 17));
        }
    }

    #[test]
    fn second_maximum_inside_window_is_crowded() {
        let mut img = gaussian_plane(40, 20.0, 20.0, 1.2);
        for y in 0..40 {
            for x in 0..40 {
                let dx = x as f32 - 23.0;
                let dy = y as f32 - 20.0;
                img.data_mut()[y * 40 + x] +=
                    1000.0 * (-(dx * dx + dy * dy) / (2.0 * 1.2 * 1.2)).exp();
            }
        }
        for policy in [WindowPolicy::AveragedCentered, WindowPolicy::DirectionalCentering] {
            let params = WindowParams {
                policy,
                ..WindowParams::default()
            };
            assert_eq!(
                SpotWindower::new(params, 3).window(img.view(), &cand(20, 20)),
                Err(WindowReject::Crowded),
                "{policy:?}"
            );
        }
    }

    #[test]
    fn faint_neighbor_below_half_max_is_kept() {
        let mut img = gaussian_plane(40, 20.0, 20.0, 1.2);
        for y in 0..40 {
            for x in 0..40 {
                let dx = x as f32 - 23.0;
                let dy = y as f32 - 20.0;
                img.data_mut()[y * 40 + x] +=
                    200.0 * (-(dx * dx + dy * dy) / (2.0 * 1.2 * 1.2)).exp();
            }
        }
        let window = SpotWindower::new(WindowParams::default(), 3)
            .window(img.view(), &cand(20, 20))
            .unwrap();
        assert_eq!(window.center(), (20, 20));
    }

    #[test]
    fn candidates_near_border_are_rejected() {
        let img = gaussian_plane(40, 2.0, 20.0, 1.2);
        let windower = SpotWindower::new(WindowParams::default(), 3);
        assert_eq!(
            windower.window(img.view(), &cand(2, 20)),
            Err(WindowReject::NearBorder)
        );
        assert_eq!(
            windower.window(img.view(), &cand(20, 37)),
            Err(WindowReject::NearBorder)
        );
    }
}
