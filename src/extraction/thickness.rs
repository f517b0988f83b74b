//! Thickness refinement by total-variation minimization.
//!
//! A wrong thickness leaves periodic artefacts from the internal echo in the extracted spectra.
//! Every candidate thickness is extracted independently and the one with the smoothest n and κ
//! is kept.

use crate::config::NonConvergencePolicy;
use crate::data_container::{MaterialSpectrum, ThicknessSearchResult};
use crate::error::{ExtractionError, ExtractionResult};
use crate::extraction::numerical::SpectralExtractor;
use cancellable_loops::{map_cancellable, par_map_cancellable};
use num_complex::Complex64;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

/// Upper limit on the number of candidates of one sweep.
pub const MAX_CANDIDATES: usize = 10_000;

/// Candidate thicknesses `nominal - span ..= nominal + span` in steps of `resolution` (all µm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThicknessSweep {
    pub nominal_um: f64,
    pub span_um: f64,
    pub resolution_um: f64,
}

impl ThicknessSweep {
    /// Validates the sweep parameters.
    ///
    /// # Errors
    /// `DataValidation` if the resolution is not positive, the span is negative, the smallest
    /// candidate is not a positive thickness or the grid has more than [`MAX_CANDIDATES`] points.
    pub fn new(nominal_um: f64, span_um: f64, resolution_um: f64) -> ExtractionResult<Self> {
        if !(resolution_um > 0.0) || !resolution_um.is_finite() {
            return Err(ExtractionError::DataValidation(format!(
                "thickness resolution must be positive, got {resolution_um} µm"
            )));
        }
        if !(span_um >= 0.0) || !span_um.is_finite() {
            return Err(ExtractionError::DataValidation(format!(
                "thickness span must not be negative, got {span_um} µm"
            )));
        }
        if !nominal_um.is_finite() || nominal_um - span_um <= 0.0 {
            return Err(ExtractionError::DataValidation(format!(
                "thickness sweep {nominal_um} ± {span_um} µm contains non-positive thicknesses"
            )));
        }
        let steps = (2.0 * span_um / resolution_um + 1e-9).floor();
        if steps >= MAX_CANDIDATES as f64 {
            return Err(ExtractionError::DataValidation(format!(
                "thickness sweep ± {span_um} µm in steps of {resolution_um} µm exceeds \
                 {MAX_CANDIDATES} candidates"
            )));
        }
        Ok(ThicknessSweep {
            nominal_um,
            span_um,
            resolution_um,
        })
    }

    /// Number of grid points.
    pub fn count(&self) -> usize {
        (2.0 * self.span_um / self.resolution_um + 1e-9).floor() as usize + 1
    }

    /// All candidate thicknesses in µm, including the right edge when it lies on the grid.
    pub fn candidates(&self) -> Vec<f64> {
        let start = self.nominal_um - self.span_um;
        (0..self.count())
            .map(|i| start + i as f64 * self.resolution_um)
            .collect()
    }
}

/// Runs the spectral extractor for every thickness of a sweep and ranks the results.
#[derive(Debug, Clone)]
pub struct ThicknessResolver {
    pub extractor: SpectralExtractor,
    /// Evaluate candidates on the rayon pool.
    pub parallel: bool,
}

impl ThicknessResolver {
    pub fn new(extractor: SpectralExtractor, parallel: bool) -> Self {
        ThicknessResolver {
            extractor,
            parallel,
        }
    }

    /// Finds the thickness whose extracted spectra have the smallest total variation.
    ///
    /// # Arguments
    /// - `frequencies`: Bins in THz, all positive.
    /// - `h`: Measured transfer function per bin.
    /// - `sweep`: Candidate thicknesses.
    /// - `nk_guess`: Start point `[n, κ]` of the first bin for every candidate.
    /// - `progress`: Called with the completed percentage after each candidate.
    /// - `abort_flag`: Checked before each candidate is started.
    ///
    /// # Returns
    /// The TV curve over all candidates and the spectrum of the winner. Ties go to the thinner
    /// candidate.
    ///
    /// # Errors
    /// Validation errors before any optimization, `Cancelled` if the abort flag was observed.
    pub fn optimize_thickness<P>(
        &self,
        frequencies: &[f64],
        h: &[Complex64],
        sweep: &ThicknessSweep,
        nk_guess: [f64; 2],
        progress: P,
        abort_flag: &AtomicBool,
    ) -> ExtractionResult<ThicknessSearchResult>
    where
        P: FnMut(u8) + Send,
    {
        if frequencies.is_empty() {
            return Err(ExtractionError::DataValidation(
                "no frequency bins in the selected range".to_string(),
            ));
        }
        if h.len() != frequencies.len() {
            return Err(ExtractionError::DataValidation(format!(
                "{} frequencies but {} transfer function values",
                frequencies.len(),
                h.len()
            )));
        }
        if !(self.extractor.tolerance > 0.0) {
            return Err(ExtractionError::Configuration(format!(
                "search bounds tolerance must be positive, got {}",
                self.extractor.tolerance
            )));
        }
        let candidates = ThicknessSweep::new(sweep.nominal_um, sweep.span_um, sweep.resolution_um)?
            .candidates();

        let mut extractor = self.extractor.clone();
        if extractor.policy == NonConvergencePolicy::Abort {
            extractor.policy = NonConvergencePolicy::Warn;
        }

        log::info!(
            "thickness sweep over {} candidates ({:.2} - {:.2} µm), {} bins each",
            candidates.len(),
            candidates[0],
            candidates[candidates.len() - 1],
            frequencies.len()
        );

        let total = candidates.len();
        let tracker = Mutex::new((0usize, progress));
        let report = || {
            if let Ok(mut guard) = tracker.lock() {
                let (done, callback) = &mut *guard;
                *done += 1;
                callback((*done * 100 / total) as u8);
            }
        };
        let evaluate = |thickness_um: f64| -> ExtractionResult<MaterialSpectrum> {
            let spectrum = extractor.extract(frequencies, h, thickness_um * 1e-6, nk_guess);
            report();
            spectrum
        };

        let spectra = if self.parallel {
            par_map_cancellable(candidates.clone(), abort_flag, evaluate)?
        } else {
            map_cancellable(candidates.iter().copied(), abort_flag, evaluate)?
        };
        let mut spectra = spectra
            .into_iter()
            .collect::<ExtractionResult<Vec<MaterialSpectrum>>>()?;

        let total_variation: Vec<f64> = spectra.iter().map(|s| s.total_variation()).collect();
        let normalized_tv = normalize(&total_variation);
        let best_index = first_argmin(&normalized_tv);
        let best = spectra.swap_remove(best_index);

        log::info!(
            "best thickness {:.2} µm (normalized TV {:.4})",
            candidates[best_index],
            normalized_tv[best_index]
        );

        Ok(ThicknessSearchResult {
            thicknesses_um: candidates,
            total_variation,
            normalized_tv,
            best_index,
            best,
        })
    }
}

/// Divides by the largest finite value; all zeros if that is zero.
fn normalize(values: &[f64]) -> Vec<f64> {
    let max = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max);
    if max == 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| v / max).collect()
}

/// Index of the first smallest value, NaN counts as `+inf`.
fn first_argmin(values: &[f64]) -> usize {
    let key = |v: f64| if v.is_nan() { f64::INFINITY } else { v };
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if key(v) < key(values[best]) {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::model::slab_transfer_function;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;
    use std::sync::atomic::Ordering;

    fn synthetic_band(d_m: f64) -> (Vec<f64>, Vec<Complex64>) {
        let frequencies: Vec<f64> = (1..=15).map(|k| 0.2 + k as f64 * 0.03).collect();
        let h = frequencies
            .iter()
            .map(|&f| slab_transfer_function(1.95, 0.005, 2.0 * PI * f * 1e12, d_m))
            .collect();
        (frequencies, h)
    }

    fn resolver(parallel: bool) -> ThicknessResolver {
        ThicknessResolver::new(
            SpectralExtractor {
                tolerance: 0.3,
                ..SpectralExtractor::default()
            },
            parallel,
        )
    }

    #[test]
    fn test_candidates_include_both_edges() {
        let sweep = ThicknessSweep::new(500.0, 5.0, 0.5).unwrap();
        let candidates = sweep.candidates();
        assert_eq!(candidates.len(), 21);
        assert_relative_eq!(candidates[0], 495.0);
        assert_relative_eq!(candidates[20], 505.0);

        let single = ThicknessSweep::new(300.0, 0.0, 1.0).unwrap();
        assert_eq!(single.candidates(), vec![300.0]);

        // the grid never overshoots the right edge
        let coarse = ThicknessSweep::new(100.0, 1.0, 0.75).unwrap();
        assert_eq!(coarse.candidates().len(), 3);
    }

    #[test]
    fn test_invalid_sweeps() {
        assert!(matches!(
            ThicknessSweep::new(500.0, 5.0, 0.0),
            Err(ExtractionError::DataValidation(_))
        ));
        assert!(ThicknessSweep::new(500.0, -1.0, 0.5).is_err());
        assert!(ThicknessSweep::new(3.0, 5.0, 0.5).is_err());
    }

    #[test]
    fn test_oversized_sweep_is_rejected() {
        assert!(matches!(
            ThicknessSweep::new(2000.0, 1000.0, 1e-9),
            Err(ExtractionError::DataValidation(_))
        ));
        assert!(ThicknessSweep::new(2000.0, 500.0, 0.05).is_err());
        let largest = ThicknessSweep::new(2000.0, 500.0, 0.2).unwrap();
        assert_eq!(largest.count(), 5001);
        assert_eq!(largest.candidates().len(), 5001);
    }

    #[test]
    fn test_normalization_and_argmin() {
        assert_eq!(normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
        assert_eq!(normalize(&[1.0, 4.0, 2.0]), vec![0.25, 1.0, 0.5]);
        assert_eq!(first_argmin(&[0.5, 0.2, 0.2, 0.9]), 1);
        assert_eq!(first_argmin(&[f64::NAN, 0.3, 0.1]), 2);
        assert_eq!(first_argmin(&[0.0, 0.0, 0.0]), 0);
    }

    #[test]
    fn test_parallel_and_sequential_sweeps_agree() {
        let (frequencies, h) = synthetic_band(200e-6);
        let sweep = ThicknessSweep::new(200.0, 20.0, 10.0).unwrap();
        let abort_flag = AtomicBool::new(false);

        let mut sequential_progress = vec![];
        let sequential = resolver(false)
            .optimize_thickness(
                &frequencies,
                &h,
                &sweep,
                [1.9, 0.0],
                |p| sequential_progress.push(p),
                &abort_flag,
            )
            .unwrap();

        let mut parallel_progress = vec![];
        let parallel = resolver(true)
            .optimize_thickness(
                &frequencies,
                &h,
                &sweep,
                [1.9, 0.0],
                |p| parallel_progress.push(p),
                &abort_flag,
            )
            .unwrap();

        assert_eq!(sequential, parallel);
        assert_eq!(sequential.thicknesses_um.len(), 5);
        assert_eq!(sequential.total_variation.len(), 5);
        assert_relative_eq!(
            sequential.best.thickness_um,
            sequential.thicknesses_um[sequential.best_index],
            epsilon = 1e-9
        );
        assert_relative_eq!(
            sequential.normalized_tv.iter().copied().fold(0.0, f64::max),
            1.0
        );

        assert_eq!(sequential_progress, vec![20, 40, 60, 80, 100]);
        assert_eq!(parallel_progress, vec![20, 40, 60, 80, 100]);
    }

    #[test]
    fn test_abort_stops_the_sweep() {
        let (frequencies, h) = synthetic_band(200e-6);
        let sweep = ThicknessSweep::new(200.0, 20.0, 10.0).unwrap();

        let abort_flag = AtomicBool::new(true);
        let mut calls = 0;
        let result = resolver(true).optimize_thickness(
            &frequencies,
            &h,
            &sweep,
            [1.9, 0.0],
            |_| calls += 1,
            &abort_flag,
        );
        assert!(matches!(result, Err(ExtractionError::Cancelled)));
        assert_eq!(calls, 0);

        let abort_flag = AtomicBool::new(false);
        let mut seen = vec![];
        let result = resolver(false).optimize_thickness(
            &frequencies,
            &h,
            &sweep,
            [1.9, 0.0],
            |p| {
                seen.push(p);
                abort_flag.store(true, Ordering::Relaxed);
            },
            &abort_flag,
        );
        assert!(matches!(result, Err(ExtractionError::Cancelled)));
        assert_eq!(seen, vec![20]);
    }

    #[test]
    fn test_validation_happens_before_optimization() {
        let abort_flag = AtomicBool::new(false);
        let sweep = ThicknessSweep {
            nominal_um: 200.0,
            span_um: 5.0,
            resolution_um: 0.0,
        };
        let mut calls = 0;
        let (frequencies, h) = synthetic_band(200e-6);
        assert!(resolver(false)
            .optimize_thickness(&frequencies, &h, &sweep, [1.9, 0.0], |_| calls += 1, &abort_flag)
            .is_err());
        let valid = ThicknessSweep::new(200.0, 5.0, 5.0).unwrap();
        assert!(resolver(false)
            .optimize_thickness(&[], &[], &valid, [1.9, 0.0], |_| calls += 1, &abort_flag)
            .is_err());
        assert_eq!(calls, 0);
    }
}
