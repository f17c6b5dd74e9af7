//! Per-trial figures of merit.
//!
//! A tau sweep produces one [`crate::types::TrialResult`] per trial; these
//! scalars are what downstream layers compare across tau to pick the best
//! scattering timescale.  Each is a pure function of a finished trial —
//! no cross-trial state is involved.
//!
//! | Scalar               | Sensitive to                                    |
//! |----------------------|-------------------------------------------------|
//! | `on_off_ratio`       | leftover on-pulse structure                     |
//! | `reduced_chi_square` | on-pulse residual power vs. the noise baseline  |
//! | `positivity`         | over-subtraction (tau too large digs dips)      |
//! | `skewness`           | component asymmetry (tau too small leaves a tail)|
//!
//! The ratio and chi-square reuse the RMS statistic of the CLEAN stopping
//! rule.  One deliberate difference: the figure of merit always reports the
//! raw on/off ratio, which is infinite over an exactly-zero baseline, while
//! the stopping rule applies a fallback denominator there (see the
//! [`crate::clean`] module doc).

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::clean::{on_off_ratio, on_off_rms};
use crate::types::{CleanModel, OnPulseWindow};

/// Residual dips deeper than this many off-pulse sigma count against the
/// positivity figure of merit.
const POSITIVITY_SIGMA: f64 = 3.0;

// ---------------------------------------------------------------------------
// FigureOfMerit
// ---------------------------------------------------------------------------

/// Scalar summaries of one trial's deconvolution quality.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FigureOfMerit {
    /// Terminal on-pulse RMS over off-pulse RMS.  1.0 means the cleaned
    /// window is statistically indistinguishable from baseline; infinite
    /// when the off-pulse region is exactly zero.
    pub on_off_ratio: f64,

    /// Mean of `(r_i / off_rms)^2` over the on-pulse window of the terminal
    /// residual.  Near 1.0 for a residual consistent with noise.
    pub reduced_chi_square: f64,

    /// Penalty for statistically significant negative dips in the on-pulse
    /// residual: mean of `(r_i / off_rms)^2` over bins dipping below
    /// `-3 sigma`.  Zero for a well-behaved clean; grows when tau is too
    /// large and the loop over-subtracts.
    pub positivity: f64,

    /// Amplitude-weighted skewness of the component locations.  Near zero
    /// when the recovered intrinsic pulse is symmetric; strongly positive
    /// when an under-estimated tau leaves components trailing off to late
    /// phases.
    pub skewness: f64,
}

/// Compute all figures of merit for one finished trial.
pub fn figure_of_merit(
    residual: &Array1<f64>,
    window: OnPulseWindow,
    model: &CleanModel,
) -> FigureOfMerit {
    let (_, off_rms) = on_off_rms(residual, window);

    FigureOfMerit {
        on_off_ratio: on_off_ratio(residual, window),
        reduced_chi_square: reduced_chi_square(residual, window, off_rms),
        positivity: positivity(residual, window, off_rms),
        skewness: component_skewness(model),
    }
}

/// Chi-square-like statistic of the terminal on-pulse residual, normalised
/// by the off-pulse RMS and the window length.
fn reduced_chi_square(residual: &Array1<f64>, window: OnPulseWindow, off_rms: f64) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    if off_rms <= 0.0 {
        let on_power: f64 = residual
            .iter()
            .enumerate()
            .filter(|(i, _)| window.contains(*i))
            .map(|(_, &v)| v * v)
            .sum();
        return if on_power == 0.0 { 0.0 } else { f64::INFINITY };
    }
    let end = window.end.min(residual.len());
    let sum: f64 = (window.start..end)
        .map(|i| {
            let z = residual[i] / off_rms;
            z * z
        })
        .sum();
    sum / window.len() as f64
}

/// Mean squared significance of on-pulse bins dipping below
/// `-POSITIVITY_SIGMA × off_rms`.
fn positivity(residual: &Array1<f64>, window: OnPulseWindow, off_rms: f64) -> f64 {
    if window.is_empty() || off_rms <= 0.0 {
        return 0.0;
    }
    let end = window.end.min(residual.len());
    let sum: f64 = (window.start..end)
        .map(|i| {
            let r = residual[i];
            if r < -POSITIVITY_SIGMA * off_rms {
                (r / off_rms).powi(2)
            } else {
                0.0
            }
        })
        .sum();
    sum / window.len() as f64
}

/// Amplitude-weighted skewness of component locations.
///
/// Uses `|amplitude|` as the weight so a handful of small negative
/// noise-chasing components cannot flip the sign of the statistic.
/// Degenerate models (fewer than two distinct locations, or zero spread)
/// score 0.
fn component_skewness(model: &CleanModel) -> f64 {
    if model.n_unique_locations() < 2 {
        return 0.0;
    }
    let total: f64 = model.components.iter().map(|c| c.amplitude.abs()).sum();
    if total <= 0.0 {
        return 0.0;
    }

    let mean: f64 = model
        .components
        .iter()
        .map(|c| c.amplitude.abs() * c.index as f64)
        .sum::<f64>()
        / total;

    let mut m2 = 0.0;
    let mut m3 = 0.0;
    for c in &model.components {
        let w = c.amplitude.abs() / total;
        let d = c.index as f64 - mean;
        m2 += w * d * d;
        m3 += w * d * d * d;
    }
    if m2 <= 0.0 {
        return 0.0;
    }
    m3 / m2.powf(1.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Component;
    use approx::assert_abs_diff_eq;

    fn noisy_baseline(n: usize, amp: f64) -> Array1<f64> {
        // Deterministic wiggle standing in for radiometer noise.
        Array1::from_iter((0..n).map(|i| amp * (1.7 * i as f64).sin()))
    }

    #[test]
    fn clean_residual_scores_near_unity_chi_square() {
        let residual = noisy_baseline(256, 0.01);
        let window = OnPulseWindow::new(50, 150);
        let fom = figure_of_merit(&residual, window, &CleanModel::default());
        // On- and off-pulse hold the same noise, so both statistics sit
        // close to 1 and nothing is flagged as a dip.
        assert!(fom.on_off_ratio > 0.8 && fom.on_off_ratio < 1.2);
        assert!(fom.reduced_chi_square > 0.6 && fom.reduced_chi_square < 1.6);
        assert_eq!(fom.positivity, 0.0);
        assert_eq!(fom.skewness, 0.0);
    }

    #[test]
    fn deep_dip_is_penalised() {
        let mut residual = noisy_baseline(256, 0.1);
        residual[100] = -1.0; // a 10-sigma over-subtraction artefact
        let window = OnPulseWindow::new(50, 150);
        let fom = figure_of_merit(&residual, window, &CleanModel::default());
        assert!(fom.positivity > 0.0);

        residual[100] = 0.0;
        let fom = figure_of_merit(&residual, window, &CleanModel::default());
        assert_eq!(fom.positivity, 0.0);
    }

    #[test]
    fn symmetric_components_have_zero_skewness() {
        let model = CleanModel {
            components: vec![
                Component { amplitude: 0.5, index: 90 },
                Component { amplitude: 0.5, index: 110 },
            ],
        };
        assert_abs_diff_eq!(component_skewness(&model), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn trailing_components_skew_positive() {
        let model = CleanModel {
            components: vec![
                Component { amplitude: 1.0, index: 100 },
                Component { amplitude: 1.0, index: 101 },
                Component { amplitude: 1.0, index: 130 },
            ],
        };
        assert!(component_skewness(&model) > 0.0);
    }

    #[test]
    fn degenerate_models_score_zero_skewness() {
        assert_eq!(component_skewness(&CleanModel::default()), 0.0);
        let single_loc = CleanModel {
            components: vec![
                Component { amplitude: 0.1, index: 100 },
                Component { amplitude: 0.09, index: 100 },
            ],
        };
        assert_eq!(component_skewness(&single_loc), 0.0);
    }
}
