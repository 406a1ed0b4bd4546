//! spotloc localizes point emitters in fluorescence microscopy images.
//!
//! A run detects candidate maxima on every plane of a [`PixelSource`], cuts an
//! adaptively sized window around each one, fits a 2D Gaussian PSF model on a
//! pool of worker threads and reports the accepted spots with their
//! localization and photon-count uncertainty. The PSF shape and optimizer are
//! chosen per run through [`FitSettings`].
//!
//! Optional features: `rayon` parallelizes the band-pass pre-filter,
//! `image-io` loads planes from image files and `tracing` emits spans and
//! events for each run, plane and worker.

pub mod candidate;
pub mod image;
pub mod lowlevel;
pub mod optimize;
pub mod pipeline;
pub mod psf;
pub mod settings;
pub mod spot;
mod trace;
pub mod uncertainty;
pub mod util;

pub use candidate::{
    BoundedWindow, Candidate, CandidateDetector, DetectionParams, Prefilter, SpotWindower,
    WindowParams, WindowPolicy, WindowReject,
};
pub use image::{ImageStack, ImageView, OwnedImage, PixelSource, PlaneIndex, Roi, StackDims};
pub use optimize::Optimizer;
pub use pipeline::{CompletionHandler, Localizer, RunSummary, StopToken, WorkerExit};
pub use psf::{FitError, FitParameters, PsfFitter, PsfModel, ShapeMode};
pub use settings::{Calibration, FitSettings};
pub use spot::LocalizedSpot;
pub use uncertainty::{AcceptanceFilters, GateReject};
pub use util::{LocalizeError, LocalizeResult};
