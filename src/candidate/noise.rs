//! Robust per-plane noise amplitude estimate.

use crate::image::{ImageView, Roi};
use crate::util::math::median_in_place;
use crate::util::LocalizeResult;

/// Scale from median absolute deviation to a Gaussian standard deviation.
const MAD_TO_SIGMA: f32 = 1.4826;

/// Estimates the pixel noise standard deviation inside `roi`.
///
/// Uses the median absolute deviation of horizontal neighbor differences,
/// divided by `sqrt(2)`, so smooth structure (spots, background gradients)
/// barely contributes. Non-finite differences are ignored. Regions narrower
/// than two pixels report zero noise.
pub fn estimate_noise(plane: ImageView<'_, f32>, roi: Roi) -> LocalizeResult<f32> {
    let region = plane.roi(roi)?;
    if region.width() < 2 {
        return Ok(0.0);
    }

    let mut diffs = Vec::with_capacity((region.width() - 1) * region.height());
    for y in 0..region.height() {
        let Some(row) = region.row(y) else {
            continue;
        };
        diffs.extend(
            row.windows(2)
                .map(|w| w[1] - w[0])
                .filter(|d| d.is_finite()),
        );
    }

    let Some(center) = median_in_place(&mut diffs) else {
        return Ok(0.0);
    };
    for d in diffs.iter_mut() {
        *d = (*d - center).abs();
    }
    let mad = median_in_place(&mut diffs).unwrap_or(0.0);
    Ok(MAD_TO_SIGMA * mad / std::f32::consts::SQRT_2)
}
