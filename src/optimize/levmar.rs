//! Levenberg-Marquardt least squares with analytic Jacobians.
//!
//! Uses f64 throughout. The damping scales the Hessian diagonal by
//! `1 + lambda`. Convergence is decided by [`ConvergenceTolerances`] on the
//! absolute change of the leading five parameter slots between successive
//! accepted iterates; when the iteration budget runs out the last accepted
//! point is returned with `converged = false`.

use crate::optimize::linear::solve;

/// Model that can be fit by [`optimize`].
pub trait LeastSquaresModel {
    /// Number of free parameters.
    fn param_count(&self) -> usize;

    /// Evaluates the model at `(x, y)`.
    fn evaluate(&self, params: &[f64], x: f64, y: f64) -> f64;

    /// Writes the partial derivatives at `(x, y)` into `row`.
    fn jacobian_row(&self, params: &[f64], x: f64, y: f64, row: &mut [f64]);

    /// Pulls parameters back into the valid domain after an update.
    fn constrain(&self, params: &mut [f64]);
}

/// Absolute per-slot tolerances of the convergence checker.
///
/// Slots are `[amplitude, background, center_x, center_y, width]`; values are
/// in raw pixel units (ADU and pixels), independent of the physical pixel
/// size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConvergenceTolerances {
    pub amplitude: f64,
    pub background: f64,
    pub center: f64,
    pub width: f64,
}

impl Default for ConvergenceTolerances {
    fn default() -> Self {
        Self {
            amplitude: 1e-2,
            background: 1e-2,
            center: 1e-4,
            width: 1e-4,
        }
    }
}

impl ConvergenceTolerances {
    /// True when every checked slot moved less than its tolerance.
    pub fn converged(&self, previous: &[f64], current: &[f64]) -> bool {
        let limits = [
            self.amplitude,
            self.background,
            self.center,
            self.center,
            self.width,
        ];
        limits
            .iter()
            .zip(previous.iter().zip(current))
            .all(|(&tol, (&p, &c))| (c - p).abs() < tol)
    }
}

/// Configuration for Levenberg-Marquardt optimization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevMarConfig {
    /// Maximum iterations.
    pub max_iterations: usize,
    /// Initial damping parameter.
    pub initial_lambda: f64,
    /// Factor to increase lambda on a rejected step.
    pub lambda_up: f64,
    /// Factor to decrease lambda on an accepted step.
    pub lambda_down: f64,
    /// Convergence checker.
    pub tolerances: ConvergenceTolerances,
}

impl Default for LevMarConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            tolerances: ConvergenceTolerances::default(),
        }
    }
}

/// Result of a Levenberg-Marquardt run.
#[derive(Clone, Debug, PartialEq)]
pub struct LevMarResult {
    pub params: Vec<f64>,
    pub chi2: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// Fits `model` to samples `(xs[i], ys[i]) -> zs[i]` starting at `initial`.
pub fn optimize<M: LeastSquaresModel>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    zs: &[f64],
    initial: Vec<f64>,
    cfg: &LevMarConfig,
) -> LevMarResult {
    let n = model.param_count();
    let mut params = initial;
    let mut lambda = cfg.initial_lambda;
    let mut chi2 = compute_chi2(model, xs, ys, zs, &params);
    let mut converged = false;
    let mut iterations = 0;

    let mut row = vec![0.0f64; n];
    let mut hessian = vec![0.0f64; n * n];
    let mut gradient = vec![0.0f64; n];

    while iterations < cfg.max_iterations {
        iterations += 1;

        hessian.fill(0.0);
        gradient.fill(0.0);
        for ((&x, &y), &z) in xs.iter().zip(ys).zip(zs) {
            model.jacobian_row(&params, x, y, &mut row);
            let r = z - model.evaluate(&params, x, y);
            for i in 0..n {
                gradient[i] += row[i] * r;
                for j in i..n {
                    hessian[i * n + j] += row[i] * row[j];
                }
            }
        }
        for i in 1..n {
            for j in 0..i {
                hessian[i * n + j] = hessian[j * n + i];
            }
        }

        let mut damped = hessian.clone();
        for i in 0..n {
            damped[i * n + i] *= 1.0 + lambda;
        }

        let Some(delta) = solve(&damped, &gradient) else {
            break;
        };

        let mut candidate: Vec<f64> = params.iter().zip(&delta).map(|(p, d)| p + d).collect();
        model.constrain(&mut candidate);
        let candidate_chi2 = compute_chi2(model, xs, ys, zs, &candidate);

        if candidate_chi2 < chi2 {
            let done = cfg.tolerances.converged(&params, &candidate);
            params = candidate;
            chi2 = candidate_chi2;
            lambda *= cfg.lambda_down;
            if done {
                converged = true;
                break;
            }
        } else {
            lambda *= cfg.lambda_up;
            if lambda > 1e10 {
                break;
            }
        }
    }

    LevMarResult {
        params,
        chi2,
        converged,
        iterations,
    }
}

fn compute_chi2<M: LeastSquaresModel>(
    model: &M,
    xs: &[f64],
    ys: &[f64],
    zs: &[f64],
    params: &[f64],
) -> f64 {
    let chi2: f64 = xs
        .iter()
        .zip(ys)
        .zip(zs)
        .map(|((&x, &y), &z)| {
            let r = z - model.evaluate(params, x, y);
            r * r
        })
        .sum();
    if chi2.is_nan() {
        f64::INFINITY
    } else {
        chi2
    }
}

#[cfg(test)]
mod tests {
    use super::{optimize, ConvergenceTolerances, LeastSquaresModel, LevMarConfig};

    /// Quadratic surface that is linear in its five parameters.
    struct Poly;

    impl LeastSquaresModel for Poly {
        fn param_count(&self) -> usize {
            5
        }
        fn evaluate(&self, p: &[f64], x: f64, y: f64) -> f64 {
            p[0] + p[1] * x + p[2] * y * y + p[3] * x * y + p[4] * x * x
        }
        fn jacobian_row(&self, _p: &[f64], x: f64, y: f64, row: &mut [f64]) {
            row.copy_from_slice(&[1.0, x, y * y, x * y, x * x]);
        }
        fn constrain(&self, _params: &mut [f64]) {}
    }

    #[test]
    fn recovers_linear_in_parameters_model() {
        let truth = [2.0, -1.0, 0.5, 0.25, -0.1];
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        let mut zs = Vec::new();
        for j in 0..6 {
            for i in 0..6 {
                let (x, y) = (i as f64, j as f64);
                xs.push(x);
                ys.push(y);
                zs.push(Poly.evaluate(&truth, x, y));
            }
        }
        let res = optimize(&Poly, &xs, &ys, &zs, vec![0.0; 5], &LevMarConfig::default());
        for (p, t) in res.params.iter().zip(truth) {
            assert!((p - t).abs() < 1e-4, "{p} vs {t}");
        }
        assert!(res.chi2 < 1e-6);
    }

    #[test]
    fn checker_requires_every_slot_under_tolerance() {
        let tol = ConvergenceTolerances::default();
        let prev = [100.0, 10.0, 3.0, 3.0, 1.2];
        assert!(tol.converged(&prev, &[100.001, 10.001, 3.00001, 3.00001, 1.20001]));
        assert!(!tol.converged(&prev, &[100.001, 10.001, 3.001, 3.00001, 1.20001]));
        assert!(!tol.converged(&prev, &[100.5, 10.0, 3.0, 3.0, 1.2]));
    }
}
