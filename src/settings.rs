//! Immutable per-run configuration.

use crate::candidate::{DetectionParams, WindowParams};
use crate::optimize::Optimizer;
use crate::psf::{PsfFitter, PsfModel, ShapeMode};
use crate::uncertainty::AcceptanceFilters;
use crate::util::{LocalizeError, LocalizeResult};
use std::num::NonZeroUsize;

/// Upper bound on the size of the fit worker pool.
pub const MAX_WORKERS: usize = 8;

/// Camera calibration constants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    /// Size of one pixel in the sample plane, in nanometers.
    pub pixel_size: f64,
    /// Detector gain (electron multiplication).
    pub gain: f64,
    /// Photoelectrons per ADU.
    pub photon_conversion: f64,
    /// Camera offset in ADU.
    pub base_level: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            pixel_size: 100.0,
            gain: 1.0,
            photon_conversion: 1.0,
            base_level: 0.0,
        }
    }
}

impl Calibration {
    /// Photons per ADU above the base level.
    pub fn photons_per_adu(&self) -> f64 {
        self.photon_conversion / self.gain
    }

    /// Converts a raw pixel value to photons.
    pub fn adu_to_photons(&self, adu: f64) -> f64 {
        (adu - self.base_level) * self.photons_per_adu()
    }

    fn validate(&self) -> LocalizeResult<()> {
        let positive = [
            (self.pixel_size, "pixel_size"),
            (self.gain, "gain"),
            (self.photon_conversion, "photon_conversion"),
        ];
        for (value, field) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(LocalizeError::InvalidSettings {
                    field,
                    reason: "must be finite and positive",
                });
            }
        }
        if !self.base_level.is_finite() {
            return Err(LocalizeError::InvalidSettings {
                field: "base_level",
                reason: "must be finite",
            });
        }
        Ok(())
    }
}

/// Settings snapshot taken once per run and shared read-only by all workers.
#[derive(Clone, Debug, PartialEq)]
pub struct FitSettings {
    pub calibration: Calibration,
    pub detection: DetectionParams,
    pub windowing: WindowParams,
    pub filters: AcceptanceFilters,
    /// Optimizer iteration budget per candidate.
    pub max_iterations: usize,
    pub shape: ShapeMode,
    /// Adds the defocus term; only valid with [`ShapeMode::Circular`].
    pub defocus: bool,
    pub optimizer: Optimizer,
    /// Preferred worker count; zero uses the host parallelism.
    pub worker_threads: usize,
    /// Queue length above which the coordinator pauses.
    pub queue_soft_cap: usize,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            calibration: Calibration::default(),
            detection: DetectionParams::default(),
            windowing: WindowParams::default(),
            filters: AcceptanceFilters::default(),
            max_iterations: 1000,
            shape: ShapeMode::Circular,
            defocus: false,
            optimizer: Optimizer::LevenbergMarquardt,
            worker_threads: 0,
            queue_soft_cap: 1024,
        }
    }
}

impl FitSettings {
    /// Checks every field; called once before a run starts.
    pub fn validate(&self) -> LocalizeResult<()> {
        self.calibration.validate()?;
        self.detection.validate()?;
        self.filters.validate()?;
        if self.windowing.max_half_width == 0 {
            return Err(LocalizeError::InvalidSettings {
                field: "max_half_width",
                reason: "must be at least 1",
            });
        }
        if self.max_iterations == 0 {
            return Err(LocalizeError::InvalidSettings {
                field: "max_iterations",
                reason: "must be at least 1",
            });
        }
        if self.queue_soft_cap == 0 {
            return Err(LocalizeError::InvalidSettings {
                field: "queue_soft_cap",
                reason: "must be at least 1",
            });
        }
        self.model().map(|_| ())
    }

    /// PSF model implied by the shape mode and defocus flag.
    pub fn model(&self) -> LocalizeResult<PsfModel> {
        PsfModel::from_mode(self.shape, self.defocus).ok_or(LocalizeError::InvalidSettings {
            field: "defocus",
            reason: "defocus requires the circular shape",
        })
    }

    /// Fitter configured with this model, optimizer and calibration.
    pub fn fitter(&self) -> LocalizeResult<PsfFitter> {
        Ok(
            PsfFitter::new(self.model()?, self.optimizer, self.max_iterations).with_calibration(
                self.calibration.base_level,
                self.calibration.photons_per_adu(),
            ),
        )
    }

    /// Number of fit workers: the hint (or host parallelism), capped at
    /// [`MAX_WORKERS`].
    pub fn worker_count(&self) -> usize {
        let hint = if self.worker_threads == 0 {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        } else {
            self.worker_threads
        };
        hint.clamp(1, MAX_WORKERS)
    }
}

#[cfg(test)]
mod tests {
    use super::{FitSettings, MAX_WORKERS};
    use crate::psf::{PsfModel, ShapeMode};
    use crate::util::LocalizeError;

    #[test]
    fn defaults_validate() {
        let settings = FitSettings::default();
        assert_eq!(settings.validate(), Ok(()));
        assert_eq!(settings.model(), Ok(PsfModel::Circular));
    }

    #[test]
    fn defocus_with_elliptical_is_rejected() {
        let settings = FitSettings {
            shape: ShapeMode::Elliptical,
            defocus: true,
            ..FitSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(LocalizeError::InvalidSettings { field: "defocus", .. })
        ));
    }

    #[test]
    fn worker_count_is_capped() {
        let many = FitSettings {
            worker_threads: 64,
            ..FitSettings::default()
        };
        assert_eq!(many.worker_count(), MAX_WORKERS);
        let one = FitSettings {
            worker_threads: 1,
            ..FitSettings::default()
        };
        assert_eq!(one.worker_count(), 1);
        assert!(FitSettings::default().worker_count() >= 1);
    }

    #[test]
    fn zero_gain_is_invalid() {
        let mut settings = FitSettings::default();
        settings.calibration.gain = 0.0;
        assert!(matches!(
            settings.validate(),
            Err(LocalizeError::InvalidSettings { field: "gain", .. })
        ));
    }
}
