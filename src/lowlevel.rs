//! Low-level building blocks for custom localization pipelines.
//!
//! These expose the individual detection, filtering, fitting and
//! uncertainty stages used by [`Localizer`](crate::Localizer). Most users
//! should prefer the top-level `Localizer` and `FitSettings` types.

pub use crate::candidate::detect::{block_maxima, reject_noise};
pub use crate::candidate::{estimate_noise, sort_candidates};
pub use crate::image::filter::{band_pass, gaussian_blur};
pub use crate::optimize::levmar::optimize as levenberg_marquardt;
pub use crate::optimize::simplex::minimize as nelder_mead;
pub use crate::optimize::{
    ConvergenceTolerances, LeastSquaresModel, LevMarConfig, LevMarResult, SimplexConfig,
    SimplexResult,
};
pub use crate::pipeline::{CandidateQueue, QueueItem, ResultAggregator};
pub use crate::psf::{estimate, Estimate, PsfShape};
pub use crate::uncertainty::{localization_precision, photon_precision};
