//! Point-spread-function models and the per-window fitter.
//!
//! [`PsfFitter`] composes a [`PsfModel`] with an [`Optimizer`]; both are
//! plain enums selected once per run, so a worker holds one `Copy` value and
//! dispatches with a `match`.
//!
//! [`Optimizer`]: crate::optimize::Optimizer

pub mod estimate;
pub mod fit;
pub mod model;

pub use estimate::{estimate, Estimate};
pub use fit::{FitError, FitParameters, PsfFitter};
pub use model::{PsfModel, PsfShape, ShapeMode};
