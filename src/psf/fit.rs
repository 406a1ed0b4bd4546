//! Fitting a PSF model to a bounded window with the selected optimizer.

use crate::candidate::BoundedWindow;
use crate::optimize::{levmar, simplex, LevMarConfig, Optimizer, SimplexConfig};
use crate::psf::estimate::estimate;
use crate::psf::model::{PsfModel, PsfShape, AMPLITUDE, BACKGROUND, CENTER_X, CENTER_Y};
use thiserror::Error;

/// Floor of the expected photon count in the likelihood.
const MIN_EXPECTED_PHOTONS: f64 = 1e-9;
/// Relative floor of simplex step sizes.
const STEP_FRACTION: f64 = 0.3;
/// Absolute floor of simplex step sizes.
const MIN_STEP: f64 = 0.01;

/// Why a fit produced no usable parameters.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FitError {
    /// Non-finite window data. Fatal to the worker that hits it.
    #[error("numeric failure: {0}")]
    Numeric(&'static str),
    /// The optimizer finished at a non-finite or unphysical point; the
    /// candidate is dropped.
    #[error("degenerate fit: {0}")]
    Degenerate(&'static str),
}

impl FitError {
    /// True when the worker that hit this error must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Numeric(_))
    }

    /// Static description of the failure.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Numeric(reason) | Self::Degenerate(reason) => reason,
        }
    }
}

/// Fitted parameter vector plus optimizer diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub struct FitParameters {
    model: PsfModel,
    values: Vec<f64>,
    iterations: usize,
    converged: bool,
}

impl FitParameters {
    pub fn new(model: PsfModel, values: Vec<f64>, iterations: usize, converged: bool) -> Self {
        Self {
            model,
            values,
            iterations,
            converged,
        }
    }

    pub fn model(&self) -> PsfModel {
        self.model
    }

    /// Slot values in model order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// False when the optimizer hit its iteration limit.
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// True when the vector has the model's length and only finite values.
    pub fn is_valid(&self) -> bool {
        self.values.len() == self.model.param_count() && self.values.iter().all(|v| v.is_finite())
    }

    pub fn amplitude(&self) -> f64 {
        self.values[AMPLITUDE]
    }

    pub fn background(&self) -> f64 {
        self.values[BACKGROUND]
    }

    /// Window-local center.
    pub fn center(&self) -> (f64, f64) {
        (self.values[CENTER_X], self.values[CENTER_Y])
    }

    pub fn shape(&self) -> Option<PsfShape> {
        self.model.shape(&self.values)
    }

    pub fn defocus(&self) -> Option<f64> {
        self.model.defocus(&self.values)
    }
}

/// A PSF model composed with an optimizer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PsfFitter {
    model: PsfModel,
    optimizer: Optimizer,
    max_iterations: usize,
    base_level: f64,
    photons_per_adu: f64,
}

impl PsfFitter {
    /// Creates a fitter with unit photon conversion and zero base level.
    pub fn new(model: PsfModel, optimizer: Optimizer, max_iterations: usize) -> Self {
        Self {
            model,
            optimizer,
            max_iterations,
            base_level: 0.0,
            photons_per_adu: 1.0,
        }
    }

    /// Sets the camera offset and gain used by the likelihood objective.
    pub fn with_calibration(mut self, base_level: f64, photons_per_adu: f64) -> Self {
        self.base_level = base_level;
        self.photons_per_adu = photons_per_adu;
        self
    }

    pub fn model(&self) -> PsfModel {
        self.model
    }

    pub fn optimizer(&self) -> Optimizer {
        self.optimizer
    }

    /// Fits the model to the pixels of `window`.
    pub fn fit(&self, window: &BoundedWindow) -> Result<FitParameters, FitError> {
        if window.pixels().iter().any(|v| !v.is_finite()) {
            return Err(FitError::Numeric("window contains non-finite pixels"));
        }

        let side = window.side();
        let count = side * side;
        let mut xs = Vec::with_capacity(count);
        let mut ys = Vec::with_capacity(count);
        let mut zs = Vec::with_capacity(count);
        for (i, &v) in window.pixels().iter().enumerate() {
            xs.push((i % side) as f64);
            ys.push((i / side) as f64);
            zs.push(v as f64);
        }

        let est = estimate(window);
        let start = self.model.initial_params(
            est.amplitude,
            est.background,
            est.center_x,
            est.center_y,
        );

        let model = self.model;
        let sse = |p: &[f64]| sum_of_squares(model, p, &xs, &ys, &zs);
        let photon_data: Vec<f64> = zs
            .iter()
            .map(|&z| ((z - self.base_level) * self.photons_per_adu).max(0.0))
            .collect();
        let nll = |p: &[f64]| {
            neg_log_likelihood(
                model,
                p,
                &xs,
                &ys,
                &photon_data,
                self.base_level,
                self.photons_per_adu,
            )
        };

        let objective_at = |p: &[f64]| match self.optimizer {
            Optimizer::SimplexMle => nll(p),
            Optimizer::Simplex | Optimizer::LevenbergMarquardt => sse(p),
        };
        if !objective_at(&start).is_finite() {
            return Err(FitError::Numeric("window values overflow the objective"));
        }

        let (mut values, iterations, converged) = match self.optimizer {
            Optimizer::LevenbergMarquardt => {
                let cfg = LevMarConfig {
                    max_iterations: self.max_iterations,
                    ..LevMarConfig::default()
                };
                let res = levmar::optimize(&model, &xs, &ys, &zs, start, &cfg);
                (res.params, res.iterations, res.converged)
            }
            Optimizer::Simplex | Optimizer::SimplexMle => {
                let cfg = SimplexConfig {
                    max_iterations: self.max_iterations,
                    ..SimplexConfig::default()
                };
                let steps = simplex_steps(&start);
                let res = if self.optimizer == Optimizer::SimplexMle {
                    simplex::minimize(&nll, &start, &steps, &cfg)
                } else {
                    simplex::minimize(&sse, &start, &steps, &cfg)
                };
                (res.point, res.iterations, res.converged)
            }
        };
        model.constrain(&mut values);
        let objective = objective_at(&values);
        accept_end_state(
            FitParameters::new(model, values, iterations, converged),
            objective,
            side,
        )
    }
}

/// Checks the optimizer's end state; every failure here is recoverable.
fn accept_end_state(
    params: FitParameters,
    objective: f64,
    side: usize,
) -> Result<FitParameters, FitError> {
    if !params.is_valid() {
        return Err(FitError::Degenerate("fitted parameters are not finite"));
    }
    if !objective.is_finite() {
        return Err(FitError::Degenerate("objective is not finite at the fitted point"));
    }
    check_physical(&params, side)?;
    Ok(params)
}

/// Step sizes at 30% of each starting value, floored at 0.01.
fn simplex_steps(start: &[f64]) -> Vec<f64> {
    start
        .iter()
        .map(|v| (v.abs() * STEP_FRACTION).max(MIN_STEP))
        .collect()
}

fn check_physical(params: &FitParameters, side: usize) -> Result<(), FitError> {
    if params.amplitude() <= 0.0 {
        return Err(FitError::Degenerate("non-positive amplitude"));
    }
    if params.shape().is_none() {
        return Err(FitError::Degenerate("non-physical width"));
    }
    let limit = (side - 1) as f64;
    let (x, y) = params.center();
    if !(0.0..=limit).contains(&x) || !(0.0..=limit).contains(&y) {
        return Err(FitError::Degenerate("center left the window"));
    }
    Ok(())
}

fn sum_of_squares(model: PsfModel, p: &[f64], xs: &[f64], ys: &[f64], zs: &[f64]) -> f64 {
    xs.iter()
        .zip(ys)
        .zip(zs)
        .map(|((&x, &y), &z)| {
            let r = z - model.evaluate(p, x, y);
            r * r
        })
        .sum()
}

/// Poisson negative log-likelihood `Σ (m - k·ln m)` in photon units, dropping
/// the parameter-free `ln k!` term.
fn neg_log_likelihood(
    model: PsfModel,
    p: &[f64],
    xs: &[f64],
    ys: &[f64],
    photons: &[f64],
    base_level: f64,
    photons_per_adu: f64,
) -> f64 {
    xs.iter()
        .zip(ys)
        .zip(photons)
        .map(|((&x, &y), &k)| {
            let m = ((model.evaluate(p, x, y) - base_level) * photons_per_adu)
                .max(MIN_EXPECTED_PHOTONS);
            m - k * m.ln()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::{accept_end_state, FitError, FitParameters, PsfFitter};
    use crate::candidate::{BoundedWindow, Candidate};
    use crate::image::PlaneIndex;
    use crate::optimize::Optimizer;
    use crate::psf::PsfModel;

    fn spot_window(cx: f64, cy: f64, sigma: f64) -> BoundedWindow {
        let half_width = 4;
        let side = 2 * half_width + 1;
        let mut pixels = Vec::with_capacity(side * side);
        for y in 0..side {
            for x in 0..side {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                let v = 10.0 + 1000.0 * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
                pixels.push(v as f32);
            }
        }
        let cand = Candidate {
            x: 20,
            y: 20,
            value: 1010.0,
            plane: PlaneIndex::default(),
            index: 0,
        };
        BoundedWindow::new(cand, 20, 20, half_width, pixels).unwrap()
    }

    #[test]
    fn levenberg_marquardt_recovers_offset_spot() {
        let window = spot_window(4.3, 3.8, 1.2);
        let fit = PsfFitter::new(PsfModel::Circular, Optimizer::LevenbergMarquardt, 200)
            .fit(&window)
            .unwrap();
        let (x, y) = fit.center();
        assert!((x - 4.3).abs() < 1e-3);
        assert!((y - 3.8).abs() < 1e-3);
        assert!((fit.values()[4] - 1.2).abs() < 1e-3);
        assert!(fit.converged());
    }

    #[test]
    fn non_finite_pixel_is_numeric_failure() {
        let window = spot_window(4.0, 4.0, 1.2);
        let mut pixels = window.pixels().to_vec();
        pixels[40] = f32::INFINITY;
        let broken = BoundedWindow::new(*window.candidate(), 20, 20, 4, pixels).unwrap();
        let err = PsfFitter::new(PsfModel::Circular, Optimizer::Simplex, 200)
            .fit(&broken)
            .unwrap_err();
        assert!(matches!(err, FitError::Numeric(_)));
        assert!(err.is_fatal());
        assert!(!FitError::Degenerate("x").is_fatal());
    }

    #[test]
    fn flat_window_is_degenerate() {
        let cand = Candidate {
            x: 20,
            y: 20,
            value: 5.0,
            plane: PlaneIndex::default(),
            index: 0,
        };
        let window = BoundedWindow::new(cand, 20, 20, 3, vec![5.0; 49]).unwrap();
        let err = PsfFitter::new(PsfModel::Circular, Optimizer::LevenbergMarquardt, 100)
            .fit(&window)
            .unwrap_err();
        assert!(matches!(err, FitError::Degenerate(_)));
    }

    #[test]
    fn non_finite_end_state_is_recoverable() {
        let nan = FitParameters::new(
            PsfModel::Circular,
            vec![1000.0, 10.0, f64::NAN, 4.0, 1.2],
            7,
            false,
        );
        let err = accept_end_state(nan, 1.0, 9).unwrap_err();
        assert!(matches!(err, FitError::Degenerate(_)));
        assert!(!err.is_fatal());

        let overflow = FitParameters::new(
            PsfModel::Circular,
            vec![1000.0, 10.0, 4.0, 4.0, 1.2],
            7,
            false,
        );
        let err = accept_end_state(overflow, f64::INFINITY, 9).unwrap_err();
        assert!(matches!(err, FitError::Degenerate(_)));
    }

    #[test]
    fn simplex_fitters_respect_the_iteration_budget() {
        let window = spot_window(4.3, 3.8, 1.2);
        for optimizer in [Optimizer::Simplex, Optimizer::SimplexMle] {
            let fit = PsfFitter::new(PsfModel::Circular, optimizer, 20)
                .fit(&window)
                .unwrap();
            assert!(fit.iterations() <= 20, "{optimizer:?}: {}", fit.iterations());
            assert!(!fit.converged(), "{optimizer:?}");
        }
    }
}
