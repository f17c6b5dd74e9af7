//! Pulse-broadening-function (PBF) kernel library.
//!
//! # Background
//!
//! Radio pulses propagating through the turbulent ionised interstellar
//! medium are multipath-scattered: rays taking longer geometric paths arrive
//! late, stretching an intrinsically narrow pulse into one with a long
//! one-sided tail.  The impulse response of this process is the *pulse
//! broadening function*, whose shape depends on where the scattering
//! material sits along the line of sight and whose width is set by the
//! scattering timescale **tau**.
//!
//! Three classical screen geometries are provided:
//!
//! | Model     | Geometry                         | Reference                    |
//! |-----------|----------------------------------|------------------------------|
//! | [`Thin`]  | thin screen, square-law medium   | Cordes & Rickett (1998)      |
//! | [`Thick`] | thick screen near the source     | Williamson (1972, 1973)      |
//! | [`Uniform`]| uniformly distributed medium    | Williamson (1972, 1973)      |
//!
//! All kernels are causal (zero before the scattering onset) and discretely
//! normalised so their sample sum is exactly 1, which preserves pulse flux
//! under convolution.  Adding a new geometry means adding an enum variant
//! and one closed-form arm in [`PbfKind::evaluate`] — the dispatch itself
//! never changes.
//!
//! [`Thin`]: PbfKind::Thin
//! [`Thick`]: PbfKind::Thick
//! [`Uniform`]: PbfKind::Uniform

use std::f64::consts::PI;
use std::str::FromStr;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised by the kernel library.
#[derive(Debug, thiserror::Error)]
pub enum PbfError {
    /// The requested model name is not one of the registered identifiers.
    #[error("unknown PBF kernel '{0}' (known: thin, thick, uniform)")]
    UnknownKernel(String),

    /// Evaluation parameters that would produce a degenerate kernel.
    #[error("invalid PBF parameters: {0}")]
    InvalidParams(String),
}

// ---------------------------------------------------------------------------
// PbfKind
// ---------------------------------------------------------------------------

/// The closed set of supported pulse-broadening-function models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PbfKind {
    /// Thin-screen approximation: a one-sided exponential decay,
    /// `h(t) = (1/tau) exp(-t/tau)`.
    Thin,

    /// Thick screen near the source:
    /// `h(t) = sqrt(pi tau / (4 t^3)) exp(-pi^2 tau / (16 t))`.
    Thick,

    /// Uniformly distributed scattering medium:
    /// `h(t) = sqrt(pi^5 tau^3 / (8 t^5)) exp(-pi^2 tau / (4 t))`.
    Uniform,
}

impl PbfKind {
    /// Every registered model, in a fixed order, for caller-side validation
    /// and selection menus.
    pub const ALL: [PbfKind; 3] = [PbfKind::Thin, PbfKind::Thick, PbfKind::Uniform];

    /// Evaluate the model's impulse response on the grid `t_i = i * spacing`
    /// for `i` in `0..length`.
    ///
    /// The returned kernel is causal (`h[0] == 0`, energy only arrives after
    /// the onset bin) and normalised so its discrete sum equals 1.
    ///
    /// Fails with [`PbfError::InvalidParams`] for `tau <= 0`, `spacing <= 0`,
    /// or a grid too short to hold any kernel mass.
    pub fn evaluate(self, tau: f64, spacing: f64, length: usize) -> Result<Array1<f64>, PbfError> {
        if !(tau > 0.0) {
            return Err(PbfError::InvalidParams(format!("tau must be positive, got {tau}")));
        }
        if !(spacing > 0.0) {
            return Err(PbfError::InvalidParams(format!(
                "sample spacing must be positive, got {spacing}"
            )));
        }
        if length < 2 {
            return Err(PbfError::InvalidParams(format!(
                "kernel length must be at least 2, got {length}"
            )));
        }

        let mut h = Array1::<f64>::zeros(length);
        for i in 1..length {
            let t = i as f64 * spacing;
            h[i] = match self {
                PbfKind::Thin => (-t / tau).exp() / tau,
                // The Williamson forms are evaluated in log space: the
                // power-law prefactor overflows for t << tau long before the
                // exponential pulls the product back to zero.
                PbfKind::Thick => {
                    let ln = 0.5 * (PI * tau / 4.0).ln() - 1.5 * t.ln() - PI * PI * tau / (16.0 * t);
                    ln.exp()
                }
                PbfKind::Uniform => {
                    let ln =
                        0.5 * (PI.powi(5) * tau.powi(3) / 8.0).ln() - 2.5 * t.ln() - PI * PI * tau / (4.0 * t);
                    ln.exp()
                }
            };
        }

        let sum: f64 = h.sum();
        if !sum.is_finite() || sum <= 0.0 {
            return Err(PbfError::InvalidParams(format!(
                "{self} kernel has no mass on a {length}-bin grid with spacing {spacing} and tau {tau}"
            )));
        }
        h.mapv_inplace(|v| v / sum);

        Ok(h)
    }
}

/// Evaluate a kernel by its registered name.
///
/// Convenience for callers holding a user-supplied model string; fails with
/// [`PbfError::UnknownKernel`] before touching the numeric parameters.
pub fn kernel(name: &str, tau: f64, spacing: f64, length: usize) -> Result<Array1<f64>, PbfError> {
    name.parse::<PbfKind>()?.evaluate(tau, spacing, length)
}

impl FromStr for PbfKind {
    type Err = PbfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "thin" => Ok(PbfKind::Thin),
            "thick" => Ok(PbfKind::Thick),
            "uniform" => Ok(PbfKind::Uniform),
            other => Err(PbfError::UnknownKernel(other.to_string())),
        }
    }
}

impl std::fmt::Display for PbfKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PbfKind::Thin => write!(f, "thin"),
            PbfKind::Thick => write!(f, "thick"),
            PbfKind::Uniform => write!(f, "uniform"),
        }
    }
}
