//! Localized spot records in physical units.

use crate::candidate::BoundedWindow;
use crate::image::PlaneIndex;
use crate::psf::{FitError, FitParameters};
use crate::settings::Calibration;
use crate::uncertainty::{localization_precision, photon_precision};
use std::f64::consts::PI;

/// One accepted emitter.
///
/// Lengths are in the unit of [`Calibration::pixel_size`] (nanometers by
/// default); intensities are in photons.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalizedSpot {
    pub plane: PlaneIndex,
    /// Index of the originating candidate within its plane.
    pub candidate_index: usize,
    pub x: f64,
    pub y: f64,
    /// Center in plane pixel coordinates.
    pub x_px: f64,
    pub y_px: f64,
    /// Integrated photon count.
    pub photons: f64,
    /// Background photons per pixel.
    pub background: f64,
    /// Width `σ`; the geometric mean of the axes for elliptical fits.
    pub width: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    /// Orientation of the `sigma_x` axis in radians (rotated fits only).
    pub angle: Option<f64>,
    /// Positional standard error.
    pub precision: f64,
    /// Standard error of `photons`.
    pub photon_precision: f64,
    pub defocus: Option<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl LocalizedSpot {
    /// Converts a fit on `window` into physical units.
    pub fn from_fit(
        window: &BoundedWindow,
        params: &FitParameters,
        calibration: &Calibration,
    ) -> Result<Self, FitError> {
        let shape = params
            .shape()
            .ok_or(FitError::Degenerate("non-physical width"))?;
        let scale = calibration.photons_per_adu();
        let a = calibration.pixel_size;

        let (origin_x, origin_y) = window.origin();
        let (local_x, local_y) = params.center();
        let x_px = origin_x as f64 + local_x;
        let y_px = origin_y as f64 + local_y;

        let photons = 2.0 * PI * params.amplitude() * shape.sigma_x * shape.sigma_y * scale;
        let background = calibration.adu_to_photons(params.background());
        let sigma_x = shape.sigma_x * a;
        let sigma_y = shape.sigma_y * a;
        let width = (sigma_x * sigma_y).sqrt();

        Ok(Self {
            plane: window.candidate().plane,
            candidate_index: window.candidate().index,
            x: x_px * a,
            y: y_px * a,
            x_px,
            y_px,
            photons,
            background,
            width,
            sigma_x,
            sigma_y,
            angle: shape.angle,
            precision: localization_precision(width, background, photons, a),
            photon_precision: photon_precision(width, background, photons, a),
            defocus: params.defocus(),
            iterations: params.iterations(),
            converged: params.converged(),
        })
    }
}
