//! Block-based local-maximum search with noise-amplitude rejection.
//!
//! The region is tiled into blocks of side `2n+1`. Each block contributes at
//! most one maximum, which survives only if no pixel within Chebyshev distance
//! `n` (the adjoining strips of the neighboring blocks) is strictly greater.
//! A second pass keeps a maximum only if it still stands above all eight
//! neighbors after subtracting `snr * noise_amplitude`, which separates narrow
//! peaks from noise spikes riding on a broad plateau.

use crate::candidate::noise::estimate_noise;
use crate::candidate::{sort_candidates, Candidate};
use crate::image::filter::band_pass;
use crate::image::{ImageView, OwnedImage, PlaneIndex, Roi};
use crate::trace::trace_event;
use crate::util::{LocalizeError, LocalizeResult};

/// Optional filtering applied to the plane before the maximum search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Prefilter {
    /// Search the raw plane.
    None,
    /// Search `blur(narrow_sigma) - blur(wide_sigma)`.
    BandPass { narrow_sigma: f32, wide_sigma: f32 },
}

/// Parameters of the candidate search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionParams {
    /// Search half-size `n`; blocks have side `2n+1`.
    pub search_half_size: usize,
    /// Signal-to-noise multiplier applied to the noise amplitude.
    pub snr: f32,
    /// Noise amplitude in plane units; `None` estimates it per plane.
    pub noise_amplitude: Option<f32>,
    /// Absolute intensity a maximum must exceed.
    pub intensity_threshold: f32,
    /// Filter applied before searching.
    pub prefilter: Prefilter,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            search_half_size: 3,
            snr: 3.0,
            noise_amplitude: None,
            intensity_threshold: 0.0,
            prefilter: Prefilter::None,
        }
    }
}

impl DetectionParams {
    pub(crate) fn validate(&self) -> LocalizeResult<()> {
        if self.search_half_size == 0 {
            return Err(LocalizeError::InvalidSettings {
                field: "search_half_size",
                reason: "must be at least 1",
            });
        }
        if !self.snr.is_finite() || self.snr < 0.0 {
            return Err(LocalizeError::InvalidSettings {
                field: "snr",
                reason: "must be finite and non-negative",
            });
        }
        if let Some(noise) = self.noise_amplitude {
            if !noise.is_finite() || noise < 0.0 {
                return Err(LocalizeError::InvalidSettings {
                    field: "noise_amplitude",
                    reason: "must be finite and non-negative",
                });
            }
        }
        if let Prefilter::BandPass {
            narrow_sigma,
            wide_sigma,
        } = self.prefilter
        {
            if !(narrow_sigma > 0.0 && wide_sigma > narrow_sigma) {
                return Err(LocalizeError::InvalidSettings {
                    field: "prefilter",
                    reason: "band-pass needs 0 < narrow_sigma < wide_sigma",
                });
            }
        }
        Ok(())
    }
}

/// Candidate detector for one plane at a time.
#[derive(Clone, Debug)]
pub struct CandidateDetector {
    params: DetectionParams,
}

impl CandidateDetector {
    /// Creates a detector with the given parameters.
    pub fn new(params: DetectionParams) -> Self {
        Self { params }
    }

    /// Returns the detector parameters.
    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// Detects candidates inside `roi`, sorted by x then y.
    pub fn detect(
        &self,
        plane: ImageView<'_, f32>,
        roi: Roi,
        plane_index: PlaneIndex,
    ) -> LocalizeResult<Vec<Candidate>> {
        roi.check_within(plane.width(), plane.height())?;

        let filtered: Option<OwnedImage<f32>> = match self.params.prefilter {
            Prefilter::None => None,
            Prefilter::BandPass {
                narrow_sigma,
                wide_sigma,
            } => Some(band_pass(plane, narrow_sigma, wide_sigma)?),
        };
        let search = filtered.as_ref().map_or(plane, |img| img.view());

        let noise = match self.params.noise_amplitude {
            Some(noise) => noise,
            None => estimate_noise(search, roi)?,
        };

        let maxima = block_maxima(
            search,
            roi,
            self.params.search_half_size,
            self.params.intensity_threshold,
        );
        let mut candidates: Vec<Candidate> = reject_noise(search, &maxima, self.params.snr, noise)
            .into_iter()
            .map(|(x, y, value)| Candidate {
                x,
                y,
                value,
                plane: plane_index,
                index: 0,
            })
            .collect();
        sort_candidates(&mut candidates);

        trace_event!(
            "candidates",
            block_maxima = maxima.len(),
            kept = candidates.len(),
            noise = noise as f64
        );
        Ok(candidates)
    }
}

/// Finds block maxima that are true local maxima within distance `n` and
/// exceed `threshold`. Returned in raster order of their blocks.
///
/// Only full blocks are scanned, so a region smaller than one block yields
/// nothing. The caller guarantees that `roi` lies inside `plane`.
pub fn block_maxima(
    plane: ImageView<'_, f32>,
    roi: Roi,
    n: usize,
    threshold: f32,
) -> Vec<(usize, usize, f32)> {
    let side = 2 * n + 1;
    let mut out = Vec::new();
    if roi.width < side || roi.height < side {
        return out;
    }

    let mut by = roi.y;
    while by + side <= roi.y_end() {
        let mut bx = roi.x;
        while bx + side <= roi.x_end() {
            if let Some((mx, my, mv)) = block_max(plane, bx, by, side) {
                if mv > threshold && is_local_max(plane, roi, mx, my, mv, n) {
                    out.push((mx, my, mv));
                }
            }
            bx += side;
        }
        by += side;
    }
    out
}

fn block_max(
    plane: ImageView<'_, f32>,
    bx: usize,
    by: usize,
    side: usize,
) -> Option<(usize, usize, f32)> {
    let mut best: Option<(usize, usize, f32)> = None;
    for y in by..by + side {
        let row = plane.row(y)?;
        for (x, &v) in row.iter().enumerate().skip(bx).take(side) {
            match best {
                Some((_, _, bv)) if !(v > bv) => {}
                _ if v.is_nan() => {}
                _ => best = Some((x, y, v)),
            }
        }
    }
    best
}

fn is_local_max(
    plane: ImageView<'_, f32>,
    roi: Roi,
    mx: usize,
    my: usize,
    mv: f32,
    n: usize,
) -> bool {
    let x0 = mx.saturating_sub(n).max(roi.x);
    let x1 = (mx + n).min(roi.x_end() - 1);
    let y0 = my.saturating_sub(n).max(roi.y);
    let y1 = (my + n).min(roi.y_end() - 1);
    for y in y0..=y1 {
        let Some(row) = plane.row(y) else {
            return false;
        };
        if row[x0..=x1].iter().any(|&v| v > mv) {
            return false;
        }
    }
    true
}

/// Keeps maxima whose value minus `snr * noise_amplitude` strictly exceeds
/// each in-plane 8-neighbor.
pub fn reject_noise(
    plane: ImageView<'_, f32>,
    maxima: &[(usize, usize, f32)],
    snr: f32,
    noise_amplitude: f32,
) -> Vec<(usize, usize, f32)> {
    let margin = snr * noise_amplitude;
    maxima
        .iter()
        .copied()
        .filter(|&(x, y, v)| {
            let lowered = v - margin;
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    if let Some(nb) = plane.at(x as isize + dx, y as isize + dy) {
                        if !(lowered > nb) {
                            return false;
                        }
                    }
                }
            }
            true
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{block_maxima, reject_noise};
    use crate::image::{OwnedImage, Roi};

    fn plane_with(
        width: usize,
        height: usize,
        base: f32,
        peaks: &[(usize, usize, f32)],
    ) -> OwnedImage<f32> {
        let mut data = vec![base; width * height];
        for &(x, y, v) in peaks {
            data[y * width + x] = v;
        }
        OwnedImage::new(data, width, height).unwrap()
    }

    #[test]
    fn region_smaller_than_block_yields_nothing() {
        let img = plane_with(5, 5, 0.0, &[(2, 2, 10.0)]);
        let found = block_maxima(img.view(), Roi::full(5, 5), 3, 0.0);
        assert!(found.is_empty());
    }

    #[test]
    fn neighbor_block_strip_suppresses_weaker_max() {
        // (6, 3) is the max of block [0, 7) but (8, 3) in the next block is
        // within distance 3 and larger.
        let img = plane_with(14, 7, 0.0, &[(6, 3, 5.0), (8, 3, 9.0)]);
        let found = block_maxima(img.view(), Roi::full(14, 7), 3, 0.0);
        assert_eq!(found, vec![(8, 3, 9.0)]);
    }

    #[test]
    fn threshold_is_exclusive() {
        let img = plane_with(7, 7, 0.0, &[(3, 3, 4.0)]);
        assert!(block_maxima(img.view(), Roi::full(7, 7), 3, 4.0).is_empty());
        assert_eq!(block_maxima(img.view(), Roi::full(7, 7), 3, 3.9).len(), 1);
    }

    #[test]
    fn noise_pass_rejects_spike_on_plateau() {
        let mut img = plane_with(9, 9, 0.0, &[]);
        for y in 2..7 {
            for x in 2..7 {
                img.data_mut()[y * 9 + x] = 100.0;
            }
        }
        img.data_mut()[4 * 9 + 4] = 103.0;
        let maxima = vec![(4, 4, 103.0)];
        assert!(reject_noise(img.view(), &maxima, 2.0, 2.0).is_empty());
        assert_eq!(reject_noise(img.view(), &maxima, 1.0, 2.0).len(), 1);
    }
}
