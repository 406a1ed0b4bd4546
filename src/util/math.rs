//! Numeric helpers shared by detection, filtering and fitting.

/// Returns the median of `values`, reordering the slice in place.
///
/// Returns `None` for an empty slice or when NaN values are present.
pub(crate) fn median_in_place(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return None;
    }
    let len = values.len();
    let mid = len / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f32::total_cmp);
    let upper = *upper;
    if len % 2 == 1 {
        return Some(upper);
    }
    let lower_max = lower.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    Some(0.5 * (lower_max + upper))
}

/// Builds a normalized 1D Gaussian kernel truncated at `3·sigma`.
///
/// A non-positive sigma yields the identity kernel `[1.0]`.
pub(crate) fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    if sigma <= 0.0 || !sigma.is_finite() {
        return vec![1.0];
    }
    let radius = (3.0 * sigma).ceil().max(1.0) as usize;
    let inv_two_var = 1.0 / (2.0 * sigma * sigma);
    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let d = i as f32 - radius as f32;
            (-d * d * inv_two_var).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= sum;
    }
    kernel
}

/// Converts the inverse-covariance form `a·dx² + 2b·dx·dy + c·dy²` into
/// `(theta, sigma_major_axis_theta, sigma_perpendicular)`.
///
/// `theta` is the direction of the eigenvector with the larger eigenvalue, so
/// the first sigma is measured along `theta`. Returns `None` when the form is
/// not positive definite.
pub(crate) fn quadratic_form_to_axes(a: f64, b: f64, c: f64) -> Option<(f64, f64, f64)> {
    if !(a.is_finite() && b.is_finite() && c.is_finite()) {
        return None;
    }
    if a <= 0.0 || c <= 0.0 || a * c - b * b <= 0.0 {
        return None;
    }
    let mean = 0.5 * (a + c);
    let radius = (0.25 * (a - c) * (a - c) + b * b).sqrt();
    let lambda_hi = mean + radius;
    let lambda_lo = mean - radius;
    if lambda_lo <= 0.0 {
        return None;
    }
    let theta = 0.5 * (2.0 * b).atan2(a - c);
    let sigma_along = (0.5 / lambda_hi).sqrt();
    let sigma_across = (0.5 / lambda_lo).sqrt();
    Some((theta, sigma_along, sigma_across))
}
