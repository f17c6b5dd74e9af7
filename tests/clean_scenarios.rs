//! End-to-end deconvolution scenarios exercising the full
//! kernel → restoring function → CLEAN loop → scheduler pipeline.

use approx::assert_abs_diff_eq;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use descatter::{
    figure_of_merit, run_trials, run_trials_at, CleanModel, CleanParams, OnPulseWindow, PbfKind,
    ScheduleError, TauSpec, TerminationReason, TrialConfig,
};

const N: usize = 256;

fn config(iter_limit: usize) -> TrialConfig {
    TrialConfig {
        kernel: PbfKind::Thin,
        window: OnPulseWindow::new(50, 150),
        clean: CleanParams {
            gain: 0.1,
            threshold: 1.0,
            iter_limit: Some(iter_limit),
        },
        spacing: 1.0,
        restoring_width: 0.0,
        n_workers: 0,
    }
}

/// A unit spike at bin 100 over a quiet on-pulse window, with a
/// deterministic off-pulse wiggle standing in for radiometer noise.
fn spike_profile() -> Array1<f64> {
    let window = OnPulseWindow::new(50, 150);
    let mut profile = Array1::from_iter((0..N).map(|i| {
        if window.contains(i) {
            0.0
        } else {
            0.134 * (1.7 * i as f64).sin()
        }
    }));
    profile[100] += 1.0;
    profile
}

/// A Gaussian pulse scattered by a thin screen with tau = 20 bins, plus
/// seeded Gaussian noise.
fn scattered_profile(rng: &mut StdRng) -> Array1<f64> {
    let intrinsic: Vec<f64> = (0..N)
        .map(|i| (-0.5 * ((i as f64 - 80.0) / 3.0).powi(2)).exp())
        .collect();
    let pbf = PbfKind::Thin.evaluate(20.0, 1.0, N).unwrap();

    let mut scattered = Array1::<f64>::zeros(N);
    for (i, &v) in intrinsic.iter().enumerate() {
        if v < 1e-12 {
            continue;
        }
        for (j, &p) in pbf.iter().enumerate() {
            if i + j < N {
                scattered[i + j] += v * p;
            }
        }
    }

    let noise = Normal::new(0.0, 0.002).unwrap();
    for v in scattered.iter_mut() {
        *v += noise.sample(&mut *rng);
    }
    scattered
}

#[test]
fn single_spike_is_recovered_in_one_component() {
    // Near-delta restoring function: tau well below the sample spacing.
    let results = run_trials(&spike_profile(), &TauSpec::Fixed(0.25), &config(10_000)).unwrap();
    assert_eq!(results.len(), 1);

    let trial = &results[0];
    assert_eq!(trial.reason, TerminationReason::Converged);
    assert_eq!(trial.iterations, 1);
    assert_eq!(trial.model.len(), 1);

    let component = trial.model.components[0];
    assert_eq!(component.index, 100);
    assert_abs_diff_eq!(component.amplitude, 0.1, epsilon = 1e-9);

    assert!(trial.fom.on_off_ratio <= 1.0);
}

#[test]
fn flat_zero_spike_converges_with_one_component() {
    // The fully noiseless variant: a flat-zero profile with one unit spike.
    // With no off-pulse noise at all, the stopping rule measures the window
    // against its own starting RMS, so one gain-scaled extraction converges.
    let mut profile = Array1::<f64>::zeros(N);
    profile[100] = 1.0;

    let results = run_trials(&profile, &TauSpec::Fixed(0.25), &config(10_000)).unwrap();
    assert_eq!(results.len(), 1);

    let trial = &results[0];
    assert_eq!(trial.reason, TerminationReason::Converged);
    assert_eq!(trial.iterations, 1);
    assert_eq!(trial.model.len(), 1);

    let component = trial.model.components[0];
    assert_eq!(component.index, 100);
    assert_abs_diff_eq!(component.amplitude, 0.1, epsilon = 1e-12);
}

#[test]
fn unreachable_threshold_hits_the_iteration_cap() {
    let mut cfg = config(7);
    cfg.clean.threshold = 1e-12;

    let results = run_trials(&spike_profile(), &TauSpec::Fixed(0.25), &cfg).unwrap();
    let trial = &results[0];
    assert_eq!(trial.iterations, 7);
    assert_eq!(trial.reason, TerminationReason::IterationLimitReached);
    assert_eq!(trial.model.len(), 7);
}

#[test]
fn already_converged_profile_short_circuits() {
    // Same wiggle amplitude on- and off-pulse: the initial ratio sits at ~1,
    // already inside a threshold of 1.05.
    let profile = Array1::from_iter((0..N).map(|i| 0.01 * (1.7 * i as f64).sin()));
    let mut cfg = config(10_000);
    cfg.clean.threshold = 1.05;
    let results = run_trials(&profile, &TauSpec::Fixed(5.0), &cfg).unwrap();
    let trial = &results[0];
    assert_eq!(trial.iterations, 0);
    assert!(trial.model.is_empty());
    assert_eq!(trial.reason, TerminationReason::Converged);
}

#[test]
fn cleaning_reduces_the_on_off_ratio() {
    let mut rng = StdRng::seed_from_u64(42);
    let profile = scattered_profile(&mut rng);
    let window = OnPulseWindow::new(60, 180);

    let initial = figure_of_merit(&profile, window, &CleanModel::default()).on_off_ratio;
    assert!(initial > 2.0, "synthetic pulse should start well above baseline");

    let mut cfg = config(20_000);
    cfg.window = window;
    let results = run_trials(&profile, &TauSpec::Fixed(20.0), &cfg).unwrap();
    let trial = &results[0];

    assert_eq!(trial.reason, TerminationReason::Converged);
    assert!(trial.fom.on_off_ratio <= 1.0);
    assert!(trial.fom.on_off_ratio < initial);
    assert!(!trial.model.is_empty());
}

#[test]
fn sweep_results_are_sorted_ascending() {
    let taus = TauSpec::Sweep { min: 1.0, max: 3.0, step: 1.0 };
    let results = run_trials(&spike_profile(), &taus, &config(200)).unwrap();
    let got: Vec<f64> = results.iter().map(|r| r.tau).collect();
    assert_eq!(got, vec![1.0, 2.0, 3.0]);
}

#[test]
fn out_of_order_submission_still_comes_back_sorted() {
    let mut rng = StdRng::seed_from_u64(7);
    let profile = scattered_profile(&mut rng);
    let mut cfg = config(100);
    cfg.window = OnPulseWindow::new(60, 180);

    let results = run_trials_at(&profile, &[3.0, 1.0, 2.0], &cfg).unwrap();
    let got: Vec<f64> = results.iter().map(|r| r.tau).collect();
    assert_eq!(got, vec![1.0, 2.0, 3.0]);
}

#[test]
fn repeated_sweeps_are_identical() {
    let mut rng = StdRng::seed_from_u64(11);
    let profile = scattered_profile(&mut rng);
    let mut cfg = config(300);
    cfg.window = OnPulseWindow::new(60, 180);
    let taus = TauSpec::Sweep { min: 5.0, max: 25.0, step: 5.0 };

    let a = run_trials(&profile, &taus, &cfg).unwrap();
    let b = run_trials(&profile, &taus, &cfg).unwrap();
    assert_eq!(a.len(), b.len());
    for (ra, rb) in a.iter().zip(&b) {
        assert_eq!(ra.tau, rb.tau);
        assert_eq!(ra.iterations, rb.iterations);
        assert_eq!(ra.reason, rb.reason);
        assert_eq!(ra.model.components, rb.model.components);
        assert_eq!(ra.residual, rb.residual);
    }
}

#[test]
fn batch_validation_happens_before_fanout() {
    let profile = spike_profile();

    let mut bad_window = config(100);
    bad_window.window = OnPulseWindow::new(200, 50);
    assert!(matches!(
        run_trials(&profile, &TauSpec::Fixed(1.0), &bad_window),
        Err(ScheduleError::Clean(_))
    ));

    let mut bad_gain = config(100);
    bad_gain.clean.gain = 1.5;
    assert!(matches!(
        run_trials(&profile, &TauSpec::Fixed(1.0), &bad_gain),
        Err(ScheduleError::Clean(_))
    ));

    let bad_range = TauSpec::Sweep { min: 5.0, max: 1.0, step: 1.0 };
    assert!(matches!(
        run_trials(&profile, &bad_range, &config(100)),
        Err(ScheduleError::InvalidTauRange(_))
    ));

    assert!(matches!(
        run_trials_at(&profile, &[1.0, -2.0], &config(100)),
        Err(ScheduleError::InvalidTauRange(_))
    ));
}

#[test]
fn trial_results_round_trip_through_json() {
    let results = run_trials(&spike_profile(), &TauSpec::Fixed(0.25), &config(10_000)).unwrap();
    let json = results[0].to_json().unwrap();

    let back: descatter::TrialResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back.tau, results[0].tau);
    assert_eq!(back.kernel, results[0].kernel);
    assert_eq!(back.iterations, results[0].iterations);
    assert_eq!(back.reason, results[0].reason);
    assert_eq!(back.model.components, results[0].model.components);
    assert_eq!(back.residual.len(), results[0].residual.len());
}
