//! # descatter
//!
//! Deconvolution of scattering-broadened pulsar pulse profiles.
//!
//! ## Overview
//!
//! Multipath scattering in the ionised interstellar medium convolves every
//! pulsar pulse with a one-sided broadening function, hiding the intrinsic
//! pulse shape.  This crate recovers an estimate of that shape with an
//! iterative CLEAN-style deconvolution, run as an embarrassingly-parallel
//! search over candidate scattering timescales (tau):
//!
//! | Module        | Purpose                                                    |
//! |---------------|------------------------------------------------------------|
//! | [`pbf`]       | Pulse-broadening-function kernels for thin/thick/uniform screens |
//! | [`restore`]   | Folds instrumental smearing into the restoring function    |
//! | [`clean`]     | The iterative peak-find/subtract/record CLEAN loop         |
//! | [`scheduler`] | Fans a tau sweep out over a rayon worker pool              |
//! | [`fom`]       | Per-trial figures of merit for ranking tau candidates      |
//! | [`types`]     | Shared data structures (components, windows, trial results)|
//!
//! ## Usage
//!
//! ```no_run
//! use descatter::{run_trials, CleanParams, OnPulseWindow, PbfKind, TauSpec, TrialConfig};
//! use ndarray::Array1;
//!
//! let profile: Array1<f64> = Array1::zeros(1024); // loaded elsewhere
//!
//! let config = TrialConfig {
//!     kernel: PbfKind::Thin,
//!     window: OnPulseWindow::new(300, 700),
//!     clean: CleanParams { gain: 0.05, threshold: 1.0, iter_limit: Some(10_000) },
//!     spacing: 0.256,         // ms per bin
//!     restoring_width: 0.35,  // ms of instrumental + dispersive smearing
//!     n_workers: 0,           // all cores
//! };
//!
//! let results = run_trials(
//!     &profile,
//!     &TauSpec::Sweep { min: 1.0, max: 20.0, step: 0.5 },
//!     &config,
//! )?;
//! for r in &results {
//!     println!("tau={:.2}: {} ({} components, ratio {:.3})",
//!         r.tau, r.reason, r.model.len(), r.fom.on_off_ratio);
//! }
//! # Ok::<(), descatter::ScheduleError>(())
//! ```
//!
//! Loading profiles, computing the smearing width, and plotting live in the
//! surrounding tooling; this crate is only the numerical core.

pub mod clean;
pub mod fom;
pub mod pbf;
pub mod restore;
pub mod scheduler;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use clean::{CleanEngine, CleanError, CleanOutcome, CleanParams};
pub use fom::{figure_of_merit, FigureOfMerit};
pub use pbf::{kernel, PbfError, PbfKind};
pub use restore::RestoringFunction;
pub use scheduler::{run_trials, run_trials_at, ScheduleError, TauSpec, TrialConfig};
pub use types::{CleanModel, Component, OnPulseWindow, TerminationReason, TrialResult};
