//! Nonlinear optimizers used by the PSF fitter.
//!
//! The optimizers are generic over the objective; PSF specifics live in
//! [`crate::psf`].

pub mod levmar;
pub(crate) mod linear;
pub mod simplex;

pub use levmar::{ConvergenceTolerances, LeastSquaresModel, LevMarConfig, LevMarResult};
pub use simplex::{SimplexConfig, SimplexResult};

/// Optimization algorithm used to fit a PSF model to a window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Optimizer {
    /// Nelder-Mead on the sum of squared residuals.
    Simplex,
    /// Levenberg-Marquardt least squares with analytic Jacobians.
    #[default]
    LevenbergMarquardt,
    /// Nelder-Mead on the Poisson negative log-likelihood.
    SimplexMle,
}
