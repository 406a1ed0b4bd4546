//! Error types for spotloc.

use thiserror::Error;

/// Result alias for spotloc operations.
pub type LocalizeResult<T> = std::result::Result<T, LocalizeError>;

/// Errors that abort a localization run or reject its inputs.
///
/// Per-candidate failures are not represented here; they are isolated to the
/// candidate (see [`crate::FitError`], [`crate::WindowReject`] and
/// [`crate::GateReject`]).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LocalizeError {
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Image dimensions are zero or overflow.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// Row stride is smaller than the row width.
    #[error("invalid stride {stride} for width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// Backing buffer is too small for the requested layout.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// Region of interest does not fit inside the image.
    #[error(
        "roi ({x}, {y}, {width}x{height}) out of bounds for {img_width}x{img_height} image"
    )]
    RoiOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        img_width: usize,
        img_height: usize,
    },
    /// A plane index outside the source dimensions was requested.
    #[error("plane {context} index {index} out of range (len {len})")]
    PlaneOutOfRange {
        index: usize,
        len: usize,
        context: &'static str,
    },
    /// A settings field holds an unusable value.
    #[error("invalid settings: {field} {reason}")]
    InvalidSettings {
        field: &'static str,
        reason: &'static str,
    },
    /// A fit worker thread could not be started.
    #[error("failed to spawn fit worker: {reason}")]
    WorkerSpawn { reason: String },
    /// Image decoding failed.
    #[error("image io: {reason}")]
    ImageIo { reason: String },
}
