//! Restoring-function construction.
//!
//! The CLEAN loop does not subtract the bare PBF kernel: the observed
//! profile is additionally smeared by finite sampling and by dispersion
//! across each frequency channel.  The *restoring function* folds that
//! instrumental smearing into the kernel, so each extracted component is
//! re-smeared exactly the way the telescope smeared the real pulse.
//!
//! The smearing term is modelled as a unit-area Gaussian whose standard
//! deviation is supplied by the caller (precomputed from period, sampling,
//! DM, frequency, bandwidth and channel count — that arithmetic lives
//! outside this crate).

use ndarray::Array1;

// ---------------------------------------------------------------------------
// RestoringFunction
// ---------------------------------------------------------------------------

/// A response kernel convolved with instrumental/dispersive smearing,
/// unit-sum normalised, plus the reference sample used to align it with a
/// component location during subtraction.
#[derive(Clone, Debug)]
pub struct RestoringFunction {
    /// The sampled restoring function.  Support is the kernel's support,
    /// widened by the truncated Gaussian when smearing is applied.
    pub samples: Array1<f64>,

    /// Index of the maximum sample.  Subtraction aligns this bin with the
    /// component location, which guarantees every iteration reduces the
    /// located peak.
    pub origin: usize,
}

impl RestoringFunction {
    /// Convolve `kernel` with a unit-area Gaussian of standard deviation
    /// `extra_width` (same time units as `spacing`).
    ///
    /// `extra_width <= 0` means no extra smearing applies and the kernel
    /// passes through unchanged.  The result is re-normalised to unit sum,
    /// so flux is preserved whether or not smearing was applied.
    pub fn build(kernel: &Array1<f64>, extra_width: f64, spacing: f64) -> Self {
        let samples = if extra_width > 0.0 {
            let sigma_bins = extra_width / spacing;
            // Truncate the Gaussian at 4 sigma; the lost mass is restored by
            // the final renormalisation.
            let half = (4.0 * sigma_bins).ceil().max(1.0) as usize;
            let mut gauss = Array1::<f64>::zeros(2 * half + 1);
            for (j, g) in gauss.iter_mut().enumerate() {
                let z = (j as f64 - half as f64) / sigma_bins;
                *g = (-0.5 * z * z).exp();
            }
            let gsum = gauss.sum();
            gauss.mapv_inplace(|v| v / gsum);

            let mut out = Array1::<f64>::zeros(kernel.len() + 2 * half);
            for (i, &k) in kernel.iter().enumerate() {
                if k == 0.0 {
                    continue;
                }
                for (j, &g) in gauss.iter().enumerate() {
                    out[i + j] += k * g;
                }
            }
            out
        } else {
            kernel.clone()
        };

        let sum = samples.sum();
        let samples = if sum > 0.0 && (sum - 1.0).abs() > f64::EPSILON {
            samples.mapv(|v| v / sum)
        } else {
            samples
        };

        let origin = samples
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);

        Self { samples, origin }
    }
}
