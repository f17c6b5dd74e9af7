//! Trial scheduling — the tau sweep.
//!
//! The scattering timescale is not known in advance, so the search runs one
//! independent CLEAN trial per candidate tau and lets downstream layers
//! compare figures of merit across the sweep.  Trials share nothing mutable:
//! each gets its own restoring function and its own residual copy of the
//! read-only input profile, which makes the sweep embarrassingly parallel.
//! The fan-out runs on **rayon**; after the join, results are sorted by
//! ascending tau regardless of completion order.
//!
//! Every input that could make a trial fail — window, gain, tau grid — is
//! shared by the whole batch, so it is validated once before fan-out and a
//! failure aborts the batch rather than silently corrupting sibling trials.

use std::time::Instant;

use log::{debug, info};
use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::clean::{CleanEngine, CleanError, CleanParams};
use crate::fom::figure_of_merit;
use crate::pbf::{PbfError, PbfKind};
use crate::restore::RestoringFunction;
use crate::types::{OnPulseWindow, TrialResult};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Pre-launch validation failures for a trial batch.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// The tau search specification is malformed.
    #[error("invalid tau range: {0}")]
    InvalidTauRange(String),

    /// Window/gain validation failed (shared by every trial in the batch).
    #[error(transparent)]
    Clean(#[from] CleanError),

    /// Kernel evaluation failed for one of the requested tau values.
    #[error(transparent)]
    Pbf(#[from] PbfError),
}

// ---------------------------------------------------------------------------
// TauSpec
// ---------------------------------------------------------------------------

/// Either a single fixed scattering timescale or a `(min, max, step)` sweep.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum TauSpec {
    /// One trial at exactly this tau.
    Fixed(f64),

    /// Trials at `min, min + step, min + 2*step, ...` up to and including
    /// `max` (within floating-point tolerance of the step grid).
    Sweep { min: f64, max: f64, step: f64 },
}

impl TauSpec {
    /// Expand into an ascending sequence of trial tau values.
    ///
    /// Fails with [`ScheduleError::InvalidTauRange`] when `max <= min`,
    /// `min <= 0`, or `step <= 0` (and for a non-positive fixed tau, so a
    /// single-tau run gets the same pre-launch checking as a sweep).
    pub fn values(&self) -> Result<Vec<f64>, ScheduleError> {
        match *self {
            TauSpec::Fixed(tau) => {
                if !(tau > 0.0) {
                    return Err(ScheduleError::InvalidTauRange(format!(
                        "tau must be positive, got {tau}"
                    )));
                }
                Ok(vec![tau])
            }
            TauSpec::Sweep { min, max, step } => {
                if !(min > 0.0) {
                    return Err(ScheduleError::InvalidTauRange(format!(
                        "sweep minimum must be positive, got {min}"
                    )));
                }
                if max <= min {
                    return Err(ScheduleError::InvalidTauRange(format!(
                        "sweep maximum {max} must exceed minimum {min}"
                    )));
                }
                if !(step > 0.0) {
                    return Err(ScheduleError::InvalidTauRange(format!(
                        "sweep step must be positive, got {step}"
                    )));
                }
                let mut values = Vec::new();
                let mut i = 0u64;
                loop {
                    let tau = min + i as f64 * step;
                    // Half-a-ulp-ish slack so e.g. (0.1, 0.3, 0.1) includes 0.3.
                    if tau > max * (1.0 + 1e-12) {
                        break;
                    }
                    values.push(tau.min(max));
                    i += 1;
                }
                Ok(values)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TrialConfig
// ---------------------------------------------------------------------------

/// Everything a trial needs besides its tau value.
#[derive(Clone, Copy, Debug)]
pub struct TrialConfig {
    /// PBF model used for every trial in the batch.
    pub kernel: PbfKind,

    /// On-pulse window, shared read-only by all trials.
    pub window: OnPulseWindow,

    /// CLEAN loop parameters, shared by all trials.
    pub clean: CleanParams,

    /// Time between profile samples, in the same units as tau.
    pub spacing: f64,

    /// Standard deviation of the instrumental/dispersive smearing folded
    /// into the restoring function; 0 when no extra smearing applies.
    pub restoring_width: f64,

    /// Rayon worker threads for the fan-out.  0 uses all available cores.
    pub n_workers: usize,
}

// ---------------------------------------------------------------------------
// run_trials
// ---------------------------------------------------------------------------

/// Run one independent CLEAN trial per tau value and return the results
/// sorted by ascending tau.
///
/// The profile is shared read-only across trials; each trial clones it into
/// a private residual.  The call blocks until every trial has reported.
pub fn run_trials(
    profile: &Array1<f64>,
    taus: &TauSpec,
    config: &TrialConfig,
) -> Result<Vec<TrialResult>, ScheduleError> {
    run_trials_at(profile, &taus.values()?, config)
}

/// Like [`run_trials`], but over an explicit list of tau values supplied in
/// any order.  Every tau must be positive; results still come back sorted
/// ascending.
pub fn run_trials_at(
    profile: &Array1<f64>,
    tau_values: &[f64],
    config: &TrialConfig,
) -> Result<Vec<TrialResult>, ScheduleError> {
    let start = Instant::now();

    // Pre-launch validation of the shared inputs: a failure here aborts the
    // whole batch before any trial starts.
    if let Some(&tau) = tau_values.iter().find(|&&t| !(t > 0.0)) {
        return Err(ScheduleError::InvalidTauRange(format!(
            "tau must be positive, got {tau}"
        )));
    }
    let engine = CleanEngine::new(config.clean)?;
    if !config.window.fits(profile.len()) {
        return Err(CleanError::InvalidWindow {
            start: config.window.start,
            end: config.window.end,
            n: profile.len(),
        }
        .into());
    }

    if config.n_workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.n_workers)
            .build_global()
            .ok(); // ignore if already initialised
    }

    info!(
        "Scheduling {} CLEAN trial(s): kernel={}, tau in [{:.4}, {:.4}], gain={}, threshold={}",
        tau_values.len(),
        config.kernel,
        tau_values.first().copied().unwrap_or(f64::NAN),
        tau_values.last().copied().unwrap_or(f64::NAN),
        config.clean.gain,
        config.clean.threshold,
    );

    let mut results: Vec<TrialResult> = tau_values
        .par_iter()
        .map(|&tau| run_one_trial(profile, tau, &engine, config))
        .collect::<Result<_, _>>()?;

    // Deterministic ordering for downstream comparison, regardless of which
    // worker finished first.
    results.sort_by(|a, b| a.tau.partial_cmp(&b.tau).unwrap_or(std::cmp::Ordering::Equal));

    info!(
        "Tau sweep complete in {} ms — {} result(s)",
        start.elapsed().as_millis(),
        results.len(),
    );

    Ok(results)
}

/// The single-trial unit of work: build the restoring function for this tau,
/// clean a private copy of the profile, and score the outcome.
fn run_one_trial(
    profile: &Array1<f64>,
    tau: f64,
    engine: &CleanEngine,
    config: &TrialConfig,
) -> Result<TrialResult, ScheduleError> {
    let kernel = config.kernel.evaluate(tau, config.spacing, profile.len())?;
    let restoring = RestoringFunction::build(&kernel, config.restoring_width, config.spacing);

    let outcome = engine.run(profile, &restoring, config.window)?;
    let fom = figure_of_merit(&outcome.residual, config.window, &outcome.model);

    debug!(
        "trial tau={tau:.4}: {} after {} iterations, {} components (flux {:.4}), ratio {:.4}",
        outcome.reason,
        outcome.iterations,
        outcome.model.len(),
        outcome.model.total_flux(),
        fom.on_off_ratio,
    );

    Ok(TrialResult {
        tau,
        kernel: config.kernel,
        model: outcome.model,
        residual: outcome.residual,
        iterations: outcome.iterations,
        reason: outcome.reason,
        fom,
    })
}
