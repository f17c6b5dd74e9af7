//! The CLEAN deconvolution engine — the heart of scattering removal.
//!
//! # Background
//!
//! Deconvolving a scattering tail is ill-posed in the Fourier domain (the
//! PBF has deep spectral nulls), so pulsar work borrows the **CLEAN**
//! algorithm from synthesis imaging: iteratively locate the strongest
//! feature, assume a small fraction of it (the *loop gain*) is real
//! intrinsic emission at that phase, subtract that fraction re-smeared by
//! the restoring function, and repeat until the on-pulse residual is
//! statistically indistinguishable from the off-pulse baseline.
//!
//! # Algorithm overview
//!
//! 1. **Short-circuit** — if the on/off residual RMS ratio already sits at
//!    or below the threshold there is nothing to clean.
//! 2. **Peak find** — locate the largest `|residual|` inside the on-pulse
//!    window.
//! 3. **Extract** — record a [`Component`] with amplitude
//!    `gain × peak value` at the peak bin.
//! 4. **Subtract** — remove `amplitude × restoring function`, shifted so
//!    the restoring function's reference bin lands on the peak, from the
//!    *entire* residual (leakage beyond the window is part of the model).
//! 5. **Test** — recompute the on/off RMS ratio; at or below the threshold
//!    the loop terminates with [`TerminationReason::Converged`], and at the
//!    iteration cap with [`TerminationReason::IterationLimitReached`].
//!
//! The engine never sees tau or the kernel model: it operates purely on the
//! precomputed restoring function, so kernel choice and deconvolution
//! mechanics stay decoupled.
//!
//! # Convergence statistic
//!
//! "Dispersion" here is the RMS about zero of the residual, on-pulse vs.
//! off-pulse, with no guard band at the window edges.  The same statistic
//! feeds the [`crate::fom`] figures of merit.
//!
//! A silent off-pulse region (RMS at or below machine precision of the
//! starting signal) leaves no noise floor to divide by.  The initial test
//! treats that as maximally unconverged (on-pulse structure over a silent
//! baseline is exactly what cleaning is for); once the loop has started,
//! the stopping rule substitutes the *initial* on-pulse RMS as the
//! denominator — the only amplitude scale such a profile carries — so a
//! noiseless synthetic profile converges as soon as a subtraction has
//! brought the window below its starting level, instead of grinding to the
//! iteration cap.

use log::debug;
use ndarray::Array1;

use crate::restore::RestoringFunction;
use crate::types::{CleanModel, Component, OnPulseWindow, TerminationReason};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Validation failures detected before the first CLEAN iteration.
#[derive(Debug, thiserror::Error)]
pub enum CleanError {
    /// The on-pulse window is empty or extends past the profile.
    #[error("invalid on-pulse window [{start}, {end}) for a {n}-bin profile")]
    InvalidWindow { start: usize, end: usize, n: usize },

    /// Loop gain outside (0, 1): the loop has no convergence guarantee there.
    #[error("loop gain must lie in (0, 1), got {0}")]
    InvalidGain(f64),
}

// ---------------------------------------------------------------------------
// CleanParams
// ---------------------------------------------------------------------------

/// Configuration of a single CLEAN run.
#[derive(Clone, Copy, Debug)]
pub struct CleanParams {
    /// Loop gain: the fraction of the located peak extracted per iteration.
    /// Must lie strictly inside (0, 1); small values (0.01–0.1) trade speed
    /// for stability.
    pub gain: f64,

    /// Stop once on-pulse RMS / off-pulse RMS falls to or below this value.
    /// 1.0 means "clean until the window looks like baseline noise".
    pub threshold: f64,

    /// Optional iteration cap.  Reaching it is a recorded outcome, not an
    /// error.  `None` lets the loop run until the threshold is met.
    pub iter_limit: Option<usize>,
}

impl Default for CleanParams {
    fn default() -> Self {
        Self {
            gain: 0.05,
            threshold: 1.0,
            iter_limit: Some(10_000),
        }
    }
}

// ---------------------------------------------------------------------------
// CleanOutcome
// ---------------------------------------------------------------------------

/// Everything a finished CLEAN loop hands back to its caller.
#[derive(Clone, Debug)]
pub struct CleanOutcome {
    /// Components in extraction order.
    pub model: CleanModel,

    /// The terminal residual.
    pub residual: Array1<f64>,

    /// Number of iterations actually executed.
    pub iterations: usize,

    /// Why the loop stopped.
    pub reason: TerminationReason,
}

// ---------------------------------------------------------------------------
// CleanEngine
// ---------------------------------------------------------------------------

/// The iterative peak-find/subtract/record loop.
///
/// Construct with [`CleanParams`] and call [`CleanEngine::run`] with a
/// profile, a restoring function, and an on-pulse window.
#[derive(Clone, Debug)]
pub struct CleanEngine {
    params: CleanParams,
}

impl CleanEngine {
    pub fn new(params: CleanParams) -> Result<Self, CleanError> {
        if !(params.gain > 0.0 && params.gain < 1.0) {
            return Err(CleanError::InvalidGain(params.gain));
        }
        Ok(Self { params })
    }

    /// Deconvolve `profile` to convergence or the iteration cap.
    ///
    /// The profile is copied into a private residual; the input is never
    /// mutated, so one profile can seed many concurrent trials.
    pub fn run(
        &self,
        profile: &Array1<f64>,
        restoring: &RestoringFunction,
        window: OnPulseWindow,
    ) -> Result<CleanOutcome, CleanError> {
        if !window.fits(profile.len()) {
            return Err(CleanError::InvalidWindow {
                start: window.start,
                end: window.end,
                n: profile.len(),
            });
        }

        let mut residual = profile.clone();
        let mut model = CleanModel::default();
        let mut iterations = 0usize;

        let (initial_on_rms, _) = on_off_rms(&residual, window);
        let mut ratio = on_off_ratio(&residual, window);
        if ratio <= self.params.threshold {
            // Nothing above the baseline to clean.
            return Ok(CleanOutcome {
                model,
                residual,
                iterations: 0,
                reason: TerminationReason::Converged,
            });
        }

        let reason = loop {
            if let Some(limit) = self.params.iter_limit {
                if iterations >= limit {
                    break TerminationReason::IterationLimitReached;
                }
            }

            // Peak |residual| inside the on-pulse window.
            let (peak_idx, peak_val) = peak_abs(&residual, window);
            let amplitude = self.params.gain * peak_val;
            model.components.push(Component {
                amplitude,
                index: peak_idx,
            });

            subtract_shifted(&mut residual, restoring, peak_idx, amplitude);
            iterations += 1;

            ratio = stopping_ratio(&residual, window, initial_on_rms);
            if ratio <= self.params.threshold {
                break TerminationReason::Converged;
            }

            if iterations % 1000 == 0 {
                debug!(
                    "clean iteration {iterations}: on/off ratio {ratio:.4}, {} components",
                    model.len()
                );
            }
        };

        debug!(
            "clean finished: {} after {iterations} iterations, ratio {ratio:.4}",
            reason
        );

        Ok(CleanOutcome {
            model,
            residual,
            iterations,
            reason,
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers (shared with the figure-of-merit module)
// ---------------------------------------------------------------------------

/// RMS about zero of the on-pulse and off-pulse regions.
pub(crate) fn on_off_rms(residual: &Array1<f64>, window: OnPulseWindow) -> (f64, f64) {
    let mut on_sq = 0.0;
    let mut off_sq = 0.0;
    let mut n_on = 0usize;
    let mut n_off = 0usize;
    for (i, &v) in residual.iter().enumerate() {
        if window.contains(i) {
            on_sq += v * v;
            n_on += 1;
        } else {
            off_sq += v * v;
            n_off += 1;
        }
    }
    let on = if n_on > 0 { (on_sq / n_on as f64).sqrt() } else { 0.0 };
    let off = if n_off > 0 { (off_sq / n_off as f64).sqrt() } else { 0.0 };
    (on, off)
}

/// The raw convergence statistic: on-pulse RMS over off-pulse RMS.
/// Infinite when on-pulse structure sits over an exactly-zero baseline.
pub(crate) fn on_off_ratio(residual: &Array1<f64>, window: OnPulseWindow) -> f64 {
    let (on, off) = on_off_rms(residual, window);
    if off > 0.0 {
        on / off
    } else if on == 0.0 {
        0.0
    } else {
        f64::INFINITY
    }
}

/// The in-loop stopping ratio.  Identical to [`on_off_ratio`] while the
/// off-pulse region carries measurable power; over a silent baseline it
/// divides by the initial on-pulse RMS instead (see the module doc).
///
/// "Silent" is judged against machine precision of the starting signal,
/// not literal zero: subtraction tails leave the off-pulse region at
/// underflow scale even on noiseless synthetic profiles.
fn stopping_ratio(residual: &Array1<f64>, window: OnPulseWindow, initial_on_rms: f64) -> f64 {
    let (on, off) = on_off_rms(residual, window);
    if off > f64::EPSILON * initial_on_rms {
        on / off
    } else if on == 0.0 {
        0.0
    } else if initial_on_rms > 0.0 {
        on / initial_on_rms
    } else {
        f64::INFINITY
    }
}

/// Index and signed value of the largest-magnitude residual sample inside
/// the window.  The window is validated non-empty before this is called.
fn peak_abs(residual: &Array1<f64>, window: OnPulseWindow) -> (usize, f64) {
    let mut best_idx = window.start;
    let mut best_val = residual[window.start];
    for i in window.start..window.end {
        if residual[i].abs() > best_val.abs() {
            best_idx = i;
            best_val = residual[i];
        }
    }
    (best_idx, best_val)
}

/// Subtract `amplitude × restoring`, shifted so the restoring function's
/// origin bin lands on `location`, truncating at the residual's edges.
fn subtract_shifted(
    residual: &mut Array1<f64>,
    restoring: &RestoringFunction,
    location: usize,
    amplitude: f64,
) {
    let n = residual.len() as isize;
    let shift = location as isize - restoring.origin as isize;
    for (k, &r) in restoring.samples.iter().enumerate() {
        let idx = k as isize + shift;
        if idx >= 0 && idx < n {
            residual[idx as usize] -= amplitude * r;
        }
    }
}
