//! Gaussian PSF shape variants with analytic derivatives.
//!
//! Every variant shares the leading slots `[amplitude, background, x0, y0]`;
//! shape terms follow. Coordinates are window-local pixels.

use crate::optimize::LeastSquaresModel;
use crate::util::math::quadratic_form_to_axes;

/// Amplitude slot.
pub const AMPLITUDE: usize = 0;
/// Background slot.
pub const BACKGROUND: usize = 1;
/// Center x slot.
pub const CENTER_X: usize = 2;
/// Center y slot.
pub const CENTER_Y: usize = 3;
/// First shape slot (the width for circular and defocus models).
pub const SHAPE: usize = 4;

/// Initial width guess in pixels.
pub const SIGMA_GUESS: f64 = 0.9;

/// Smallest width a fit may report.
const MIN_SIGMA: f64 = 1e-3;
/// Smallest diagonal term of the rotated quadratic form.
const MIN_FORM: f64 = 1e-6;

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Spot shape selected by the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ShapeMode {
    /// One width for both axes.
    #[default]
    Circular,
    /// Independent widths along x and y.
    Elliptical,
    /// Elliptical with free orientation.
    RotatedElliptical,
}

/// Concrete PSF model fitted to a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PsfModel {
    /// `B + A·g`, `g = exp(-r²/2σ²)`. Slots: `[A, B, x0, y0, σ]`.
    Circular,
    /// `B + A·exp(-dx²/2σx² - dy²/2σy²)`. Slots: `[A, B, x0, y0, σx, σy]`.
    Elliptical,
    /// `B + A·exp(-(a·dx² + 2b·dx·dy + c·dy²))`. Slots: `[A, B, x0, y0, a, b, c]`.
    RotatedElliptical,
    /// Circular Gaussian modulated by a Zernike defocus term:
    /// `B + A·g·(1 + d·√3·(2ρ² - 1))` with `ρ = r/2σ`.
    /// Slots: `[A, B, x0, y0, σ, d]`.
    ///
    /// The defocus term integrates to zero against `g`, so the photon count
    /// is `2πAσ²` regardless of `d`.
    Defocus,
}

/// Width and orientation of a fitted PSF, in pixels and radians.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PsfShape {
    pub sigma_x: f64,
    pub sigma_y: f64,
    /// Orientation of the `sigma_x` axis; only set by rotated fits.
    pub angle: Option<f64>,
}

impl PsfModel {
    /// Resolves the model for a shape mode; defocus pairs with circular only.
    pub fn from_mode(shape: ShapeMode, defocus: bool) -> Option<Self> {
        match (shape, defocus) {
            (ShapeMode::Circular, false) => Some(Self::Circular),
            (ShapeMode::Circular, true) => Some(Self::Defocus),
            (ShapeMode::Elliptical, false) => Some(Self::Elliptical),
            (ShapeMode::RotatedElliptical, false) => Some(Self::RotatedElliptical),
            _ => None,
        }
    }

    /// Number of parameter slots.
    pub fn param_count(&self) -> usize {
        match self {
            Self::Circular => 5,
            Self::Elliptical | Self::Defocus => 6,
            Self::RotatedElliptical => 7,
        }
    }

    /// Starting point for the optimizers.
    pub fn initial_params(
        &self,
        amplitude: f64,
        background: f64,
        center_x: f64,
        center_y: f64,
    ) -> Vec<f64> {
        let mut params = vec![amplitude, background, center_x, center_y];
        match self {
            Self::Circular => params.push(SIGMA_GUESS),
            Self::Elliptical => params.extend([SIGMA_GUESS, SIGMA_GUESS]),
            Self::RotatedElliptical => {
                let form = 0.5 / (SIGMA_GUESS * SIGMA_GUESS);
                params.extend([form, 0.0, form]);
            }
            Self::Defocus => params.extend([SIGMA_GUESS, 0.0]),
        }
        params
    }

    /// Model value at `(x, y)`.
    pub fn evaluate(&self, p: &[f64], x: f64, y: f64) -> f64 {
        let (a, b) = (p[AMPLITUDE], p[BACKGROUND]);
        let dx = x - p[CENTER_X];
        let dy = y - p[CENTER_Y];
        match self {
            Self::Circular => {
                let s = p[SHAPE];
                b + a * (-(dx * dx + dy * dy) / (2.0 * s * s)).exp()
            }
            Self::Elliptical => {
                let (sx, sy) = (p[SHAPE], p[SHAPE + 1]);
                b + a * (-(dx * dx) / (2.0 * sx * sx) - (dy * dy) / (2.0 * sy * sy)).exp()
            }
            Self::RotatedElliptical => {
                let q = p[SHAPE] * dx * dx + 2.0 * p[SHAPE + 1] * dx * dy + p[SHAPE + 2] * dy * dy;
                b + a * (-q).exp()
            }
            Self::Defocus => {
                let (s, d) = (p[SHAPE], p[SHAPE + 1]);
                let u = (dx * dx + dy * dy) / (2.0 * s * s);
                b + a * (-u).exp() * (1.0 + d * SQRT_3 * (u - 1.0))
            }
        }
    }

    /// Partial derivatives at `(x, y)` in slot order.
    pub fn jacobian_row(&self, p: &[f64], x: f64, y: f64, row: &mut [f64]) {
        let a = p[AMPLITUDE];
        let dx = x - p[CENTER_X];
        let dy = y - p[CENTER_Y];
        row[BACKGROUND] = 1.0;
        match self {
            Self::Circular => {
                let s = p[SHAPE];
                let s2 = s * s;
                let r2 = dx * dx + dy * dy;
                let g = (-r2 / (2.0 * s2)).exp();
                let ag = a * g;
                row[AMPLITUDE] = g;
                row[CENTER_X] = ag * dx / s2;
                row[CENTER_Y] = ag * dy / s2;
                row[SHAPE] = ag * r2 / (s2 * s);
            }
            Self::Elliptical => {
                let (sx, sy) = (p[SHAPE], p[SHAPE + 1]);
                let (sx2, sy2) = (sx * sx, sy * sy);
                let g = (-(dx * dx) / (2.0 * sx2) - (dy * dy) / (2.0 * sy2)).exp();
                let ag = a * g;
                row[AMPLITUDE] = g;
                row[CENTER_X] = ag * dx / sx2;
                row[CENTER_Y] = ag * dy / sy2;
                row[SHAPE] = ag * dx * dx / (sx2 * sx);
                row[SHAPE + 1] = ag * dy * dy / (sy2 * sy);
            }
            Self::RotatedElliptical => {
                let (fa, fb, fc) = (p[SHAPE], p[SHAPE + 1], p[SHAPE + 2]);
                let q = fa * dx * dx + 2.0 * fb * dx * dy + fc * dy * dy;
                let g = (-q).exp();
                let ag = a * g;
                row[AMPLITUDE] = g;
                row[CENTER_X] = ag * (2.0 * fa * dx + 2.0 * fb * dy);
                row[CENTER_Y] = ag * (2.0 * fb * dx + 2.0 * fc * dy);
                row[SHAPE] = -ag * dx * dx;
                row[SHAPE + 1] = -2.0 * ag * dx * dy;
                row[SHAPE + 2] = -ag * dy * dy;
            }
            Self::Defocus => {
                let (s, d) = (p[SHAPE], p[SHAPE + 1]);
                let s2 = s * s;
                let r2 = dx * dx + dy * dy;
                let u = r2 / (2.0 * s2);
                let g = (-u).exp();
                let z = SQRT_3 * (u - 1.0);
                let modulation = 1.0 + d * z;
                // d/du of g·(1 + d·z) is g·(d·√3 - modulation).
                let slope = a * g * (modulation - d * SQRT_3);
                row[AMPLITUDE] = g * modulation;
                row[CENTER_X] = slope * dx / s2;
                row[CENTER_Y] = slope * dy / s2;
                row[SHAPE] = slope * r2 / (s2 * s);
                row[SHAPE + 1] = a * g * z;
            }
        }
    }

    /// Maps widths back to positive values; the models depend on `σ²` only,
    /// so flipping the sign does not change the fit.
    pub fn constrain(&self, p: &mut [f64]) {
        match self {
            Self::Circular | Self::Defocus => {
                p[SHAPE] = p[SHAPE].abs().max(MIN_SIGMA);
            }
            Self::Elliptical => {
                p[SHAPE] = p[SHAPE].abs().max(MIN_SIGMA);
                p[SHAPE + 1] = p[SHAPE + 1].abs().max(MIN_SIGMA);
            }
            Self::RotatedElliptical => {
                p[SHAPE] = p[SHAPE].max(MIN_FORM);
                p[SHAPE + 2] = p[SHAPE + 2].max(MIN_FORM);
            }
        }
    }

    /// Widths and orientation encoded in `p`, or `None` when they are not
    /// physical (non-positive widths, indefinite rotated form).
    pub fn shape(&self, p: &[f64]) -> Option<PsfShape> {
        let (sigma_x, sigma_y, angle) = match self {
            Self::Circular | Self::Defocus => (p[SHAPE], p[SHAPE], None),
            Self::Elliptical => (p[SHAPE], p[SHAPE + 1], None),
            Self::RotatedElliptical => {
                let (theta, along, across) =
                    quadratic_form_to_axes(p[SHAPE], p[SHAPE + 1], p[SHAPE + 2])?;
                (along, across, Some(theta))
            }
        };
        (sigma_x > 0.0 && sigma_y > 0.0 && sigma_x.is_finite() && sigma_y.is_finite()).then_some(
            PsfShape {
                sigma_x,
                sigma_y,
                angle,
            },
        )
    }

    /// Defocus coefficient, when the model carries one.
    pub fn defocus(&self, p: &[f64]) -> Option<f64> {
        match self {
            Self::Defocus => p.get(SHAPE + 1).copied(),
            _ => None,
        }
    }
}

impl LeastSquaresModel for PsfModel {
    fn param_count(&self) -> usize {
        PsfModel::param_count(self)
    }

    fn evaluate(&self, params: &[f64], x: f64, y: f64) -> f64 {
        PsfModel::evaluate(self, params, x, y)
    }

    fn jacobian_row(&self, params: &[f64], x: f64, y: f64, row: &mut [f64]) {
        PsfModel::jacobian_row(self, params, x, y, row)
    }

    fn constrain(&self, params: &mut [f64]) {
        PsfModel::constrain(self, params)
    }
}
