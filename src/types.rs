//! Common types shared across the descatter deconvolution pipeline.
//!
//! These structures represent the fundamental data objects of a scattering
//! deconvolution run: the on-pulse window, individual CLEAN components, the
//! accumulated clean model, and the per-trial result record handed back to
//! reporting layers.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::fom::FigureOfMerit;
use crate::pbf::PbfKind;

// ---------------------------------------------------------------------------
// OnPulseWindow
// ---------------------------------------------------------------------------

/// A half-open index range `[start, end)` into a profile marking where pulsed
/// signal (as opposed to noise baseline) is expected.
///
/// The window serves two purposes: it restricts where the CLEAN loop looks
/// for candidate components, and it splits the residual into the on-pulse
/// and off-pulse regions compared by the convergence test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnPulseWindow {
    /// First bin of the on-pulse region (inclusive).
    pub start: usize,

    /// One past the last bin of the on-pulse region (exclusive).
    pub end: usize,
}

impl OnPulseWindow {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of bins inside the window.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether bin `i` falls inside the window.
    pub fn contains(&self, i: usize) -> bool {
        i >= self.start && i < self.end
    }

    /// Whether the window is non-empty and fits a profile of `n` bins.
    pub fn fits(&self, n: usize) -> bool {
        self.start < self.end && self.end <= n
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A single CLEAN component: a gain-scaled amplitude placed at one phase bin.
///
/// Components are recorded in extraction order. The amplitude carries the
/// sign of the residual peak it was extracted from, so a deconvolution that
/// starts chasing noise shows up as alternating-sign components.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Loop-gain-scaled fraction of the peak residual value.
    pub amplitude: f64,

    /// Phase bin (sample index) where the peak was found.
    pub index: usize,
}

// ---------------------------------------------------------------------------
// CleanModel
// ---------------------------------------------------------------------------

/// The ordered sequence of components extracted during one trial.
///
/// This is the sparse amplitude-at-location representation of the intrinsic
/// (unscattered) pulse that, when re-convolved with the restoring function,
/// explains the on-pulse excess of the observed profile.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CleanModel {
    /// Components in extraction order (first = strongest initial peak).
    pub components: Vec<Component>,
}

impl CleanModel {
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Number of distinct phase bins that received at least one component.
    ///
    /// A well-matched tau concentrates components in few bins; a badly
    /// mismatched one smears them across the whole window.
    pub fn n_unique_locations(&self) -> usize {
        let mut locs: Vec<usize> = self.components.iter().map(|c| c.index).collect();
        locs.sort_unstable();
        locs.dedup();
        locs.len()
    }

    /// Total cleaned flux: the sum of all component amplitudes.
    pub fn total_flux(&self) -> f64 {
        self.components.iter().map(|c| c.amplitude).sum()
    }
}

// ---------------------------------------------------------------------------
// TerminationReason
// ---------------------------------------------------------------------------

/// Why a CLEAN loop stopped.
///
/// Hitting the iteration cap is a normal, recorded outcome — not an error —
/// but downstream consumers must be able to tell it apart from genuine
/// convergence when ranking trials.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// The on/off residual RMS ratio fell to or below the threshold.
    Converged,

    /// The iteration cap was reached before the threshold was met.
    IterationLimitReached,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::Converged => write!(f, "converged"),
            TerminationReason::IterationLimitReached => write!(f, "iteration limit reached"),
        }
    }
}

// ---------------------------------------------------------------------------
// TrialResult
// ---------------------------------------------------------------------------

/// The immutable record produced by one deconvolution trial.
///
/// Produced once per tau value and never mutated after return. The scheduler
/// collects these into a sequence sorted by ascending tau for downstream
/// comparison and plotting layers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrialResult {
    /// Scattering timescale this trial assumed, in the same time units as
    /// the profile's sample spacing.
    pub tau: f64,

    /// Which pulse-broadening-function model was used.
    pub kernel: PbfKind,

    /// All components extracted before termination.
    pub model: CleanModel,

    /// The terminal residual profile (observed minus re-smeared components).
    pub residual: Array1<f64>,

    /// Number of CLEAN iterations actually run.
    pub iterations: usize,

    /// Whether the loop converged or hit its iteration cap.
    pub reason: TerminationReason,

    /// Scalar summaries of deconvolution quality for this trial.
    pub fom: FigureOfMerit,
}

impl TrialResult {
    /// Serialise the result to a JSON string for interoperability with
    /// external reporting layers.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_fits_and_contains() {
        let w = OnPulseWindow::new(50, 150);
        assert!(w.fits(256));
        assert!(!w.fits(100));
        assert!(w.contains(50));
        assert!(w.contains(149));
        assert!(!w.contains(150));
        assert_eq!(w.len(), 100);

        let inverted = OnPulseWindow::new(200, 50);
        assert!(!inverted.fits(256));
        assert!(inverted.is_empty());
    }

    #[test]
    fn clean_model_counts_unique_locations() {
        let model = CleanModel {
            components: vec![
                Component { amplitude: 0.1, index: 100 },
                Component { amplitude: 0.09, index: 100 },
                Component { amplitude: 0.02, index: 42 },
            ],
        };
        assert_eq!(model.len(), 3);
        assert_eq!(model.n_unique_locations(), 2);
        assert!((model.total_flux() - 0.21).abs() < 1e-12);
    }
}
