//! Per-bin numerical extraction of n and κ by fitting the slab model.

use crate::config::{ExtractionSettings, NonConvergencePolicy};
use crate::data_container::MaterialSpectrum;
use crate::error::{ExtractionError, ExtractionResult};
use crate::extraction::analytical::absorption_coefficient;
use crate::extraction::model::transfer_mismatch;
use crate::optimize::{minimize_bounded, BoundedMinimum, SimplexOptions};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Replaces isolated jumps in the extracted spectra by the previous bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierSmoothing {
    /// Largest accepted change of n or κ between neighbouring bins.
    pub threshold: f64,
    /// Bins with an index up to and including this one are kept as extracted.
    pub start_bin: usize,
}

impl Default for OutlierSmoothing {
    fn default() -> Self {
        OutlierSmoothing {
            threshold: 0.10,
            start_bin: 10,
        }
    }
}

/// One bin of a material spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinValues {
    pub n: f64,
    pub kappa: f64,
    pub alpha: f64,
}

impl OutlierSmoothing {
    /// Applies the jump rule to bin `j` given the accepted values of bin `j - 1`.
    ///
    /// A jump in n restores n and α of the previous bin, a jump in κ restores κ and α.
    pub fn apply(&self, j: usize, candidate: BinValues, previous: Option<BinValues>) -> BinValues {
        let Some(previous) = previous else {
            return candidate;
        };
        if j <= self.start_bin {
            return candidate;
        }
        let mut accepted = candidate;
        if (candidate.n - previous.n).abs() > self.threshold {
            accepted.n = previous.n;
            accepted.alpha = previous.alpha;
        }
        if (candidate.kappa - previous.kappa).abs() > self.threshold {
            accepted.kappa = previous.kappa;
            accepted.alpha = previous.alpha;
        }
        accepted
    }
}

/// Warm-started bin-by-bin fit of the slab model.
///
/// Every bin is searched inside `[x - tolerance, x + tolerance]` around the accepted values of the
/// previous bin; the first bin starts from the caller's guess.
#[derive(Debug, Clone)]
pub struct SpectralExtractor {
    pub tolerance: f64,
    pub smoothing: OutlierSmoothing,
    pub policy: NonConvergencePolicy,
    pub options: SimplexOptions,
}

impl Default for SpectralExtractor {
    fn default() -> Self {
        SpectralExtractor {
            tolerance: 1.0,
            smoothing: OutlierSmoothing::default(),
            policy: NonConvergencePolicy::Ignore,
            options: SimplexOptions::default(),
        }
    }
}

impl SpectralExtractor {
    pub fn from_settings(settings: &ExtractionSettings) -> Self {
        SpectralExtractor {
            tolerance: settings.tolerance,
            smoothing: OutlierSmoothing {
                threshold: settings.outlier_threshold,
                start_bin: settings.outlier_start_bin,
            },
            policy: settings.non_convergence,
            options: SimplexOptions::default(),
        }
    }

    /// Fits n and κ in every bin of a measured transfer function.
    ///
    /// # Arguments
    /// - `frequencies`: Bins in THz, all positive.
    /// - `h`: Measured transfer function per bin.
    /// - `thickness_m`: Sample thickness in m.
    /// - `nk_guess`: Start point `[n, κ]` of the first bin.
    ///
    /// # Errors
    /// `DataValidation` or `Configuration` for invalid inputs, `OptimizationNonConvergence` under
    /// the abort policy.
    pub fn extract(
        &self,
        frequencies: &[f64],
        h: &[Complex64],
        thickness_m: f64,
        nk_guess: [f64; 2],
    ) -> ExtractionResult<MaterialSpectrum> {
        if h.len() != frequencies.len() {
            return Err(ExtractionError::DataValidation(format!(
                "{} frequencies but {} transfer function values",
                frequencies.len(),
                h.len()
            )));
        }
        if !(thickness_m > 0.0) {
            return Err(ExtractionError::Configuration(format!(
                "sample thickness must be positive, got {thickness_m} m"
            )));
        }
        let options = &self.options;
        self.extract_with(frequencies, thickness_m, nk_guess, |j, x0, lower, upper| {
            let omega = 2.0 * PI * frequencies[j] * 1e12;
            let h_exp = h[j];
            minimize_bounded(
                |x| transfer_mismatch(x, omega, thickness_m, h_exp),
                &x0,
                &lower,
                &upper,
                options,
            )
        })
    }

    /// Runs the warm-start, smoothing and policy logic around an arbitrary per-bin solver.
    ///
    /// `solve(j, x0, lower, upper)` returns the bounded minimum for bin `j`.
    pub fn extract_with<S>(
        &self,
        frequencies: &[f64],
        thickness_m: f64,
        nk_guess: [f64; 2],
        mut solve: S,
    ) -> ExtractionResult<MaterialSpectrum>
    where
        S: FnMut(usize, [f64; 2], [f64; 2], [f64; 2]) -> ExtractionResult<BoundedMinimum>,
    {
        if !(self.tolerance > 0.0) {
            return Err(ExtractionError::Configuration(format!(
                "search bounds tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if nk_guess.iter().any(|x| !x.is_finite()) {
            return Err(ExtractionError::Configuration(format!(
                "initial guess {nk_guess:?} is not finite"
            )));
        }

        let bins = frequencies.len();
        let mut n = Vec::with_capacity(bins);
        let mut kappa = Vec::with_capacity(bins);
        let mut alpha = Vec::with_capacity(bins);
        let mut non_converged_bins = vec![];

        let mut x0 = nk_guess;
        let mut previous: Option<BinValues> = None;
        for (j, &f) in frequencies.iter().enumerate() {
            let lower = [x0[0] - self.tolerance, x0[1] - self.tolerance];
            let upper = [x0[0] + self.tolerance, x0[1] + self.tolerance];
            let minimum = solve(j, x0, lower, upper)?;

            if !minimum.success {
                non_converged_bins.push(j);
                match self.policy {
                    NonConvergencePolicy::Abort => {
                        return Err(ExtractionError::OptimizationNonConvergence {
                            bin: j,
                            frequency_thz: f,
                        });
                    }
                    NonConvergencePolicy::Warn => {
                        log::warn!(
                            "optimizer did not converge at bin {j} ({f:.4} THz) after {} evaluations",
                            minimum.nfev
                        );
                    }
                    NonConvergencePolicy::Ignore => {
                        log::debug!("optimizer did not converge at bin {j} ({f:.4} THz)");
                    }
                }
            }

            let candidate = BinValues {
                n: minimum.x[0],
                kappa: minimum.x[1],
                alpha: absorption_coefficient(f, minimum.x[1]),
            };
            let accepted = self.smoothing.apply(j, candidate, previous);

            n.push(accepted.n);
            kappa.push(accepted.kappa);
            alpha.push(accepted.alpha);
            x0 = [accepted.n, accepted.kappa];
            previous = Some(accepted);
        }

        Ok(MaterialSpectrum {
            frequencies: frequencies.to_vec(),
            n,
            kappa,
            alpha,
            thickness_um: thickness_m * 1e6,
            non_converged_bins,
        })
    }
}

/// Numerical extraction with the default smoothing and convergence handling.
pub fn extract_numerical(
    frequencies: &[f64],
    h: &[Complex64],
    thickness_m: f64,
    nk_guess: [f64; 2],
    tolerance: f64,
) -> ExtractionResult<MaterialSpectrum> {
    SpectralExtractor {
        tolerance,
        ..SpectralExtractor::default()
    }
    .extract(frequencies, h, thickness_m, nk_guess)
}
