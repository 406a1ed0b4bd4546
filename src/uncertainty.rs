//! Closed-form localization uncertainty and the acceptance gate.
//!
//! The precision formulas are the Mortensen et al. (2010) least-squares
//! expressions for a Gaussian spot on a pixelated detector. All lengths are
//! in the same physical unit as the pixel size; the background is in photons
//! per pixel.

use crate::spot::LocalizedSpot;
use crate::util::{LocalizeError, LocalizeResult};
use std::f64::consts::PI;
use thiserror::Error;

/// Positional standard error of a fitted spot.
///
/// `sqrt((σ² + a²/12)/N + 8π·σ⁴·b² / (a²·N²))` for width `σ`, background
/// `b`, photon count `N` and pixel size `a`.
pub fn localization_precision(sigma: f64, background: f64, photons: f64, pixel_size: f64) -> f64 {
    let s2 = sigma * sigma;
    let a2 = pixel_size * pixel_size;
    let shot = (s2 + a2 / 12.0) / photons;
    let bg = 8.0 * PI * s2 * s2 * background * background / (a2 * photons * photons);
    (shot + bg).sqrt()
}

/// Standard error of the photon count, `sqrt(N + 4π·σ²·b² / a²)`.
pub fn photon_precision(sigma: f64, background: f64, photons: f64, pixel_size: f64) -> f64 {
    let a2 = pixel_size * pixel_size;
    (photons + 4.0 * PI * sigma * sigma * background * background / a2).sqrt()
}

/// Reason the gate dropped a spot.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum GateReject {
    #[error("width outside the accepted range")]
    Width,
    #[error("photon count outside the accepted range")]
    Photons,
    /// The positional uncertainty is not smaller than the spot width.
    #[error("localization precision is not below the spot width")]
    Precision,
}

/// Acceptance ranges applied after fitting.
///
/// The width and photon ranges only apply when their flag is set; the
/// precision check always applies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AcceptanceFilters {
    pub width_filter: bool,
    /// Minimum width in nanometers.
    pub width_min: f64,
    /// Maximum width in nanometers.
    pub width_max: f64,
    pub photon_filter: bool,
    pub photons_min: f64,
    pub photons_max: f64,
}

impl Default for AcceptanceFilters {
    fn default() -> Self {
        Self {
            width_filter: false,
            width_min: 100.0,
            width_max: 300.0,
            photon_filter: false,
            photons_min: 100.0,
            photons_max: 100_000.0,
        }
    }
}

impl AcceptanceFilters {
    /// Checks a spot against the enabled ranges and the precision bound.
    pub fn accepts(&self, spot: &LocalizedSpot) -> Result<(), GateReject> {
        if self.width_filter && !(self.width_min..=self.width_max).contains(&spot.width) {
            return Err(GateReject::Width);
        }
        if self.photon_filter && !(self.photons_min..=self.photons_max).contains(&spot.photons) {
            return Err(GateReject::Photons);
        }
        if !(spot.precision < spot.width) {
            return Err(GateReject::Precision);
        }
        Ok(())
    }

    pub(crate) fn validate(&self) -> LocalizeResult<()> {
        if self.width_filter && !(self.width_min <= self.width_max) {
            return Err(LocalizeError::InvalidSettings {
                field: "width_min",
                reason: "must not exceed width_max",
            });
        }
        if self.photon_filter && !(self.photons_min <= self.photons_max) {
            return Err(LocalizeError::InvalidSettings {
                field: "photons_min",
                reason: "must not exceed photons_max",
            });
        }
        Ok(())
    }
}
