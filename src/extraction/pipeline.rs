//! From conditioned waveforms to material parameters in one call.

use crate::config::{ExtractionMethod, ExtractionSettings};
use crate::data_container::{ExtractionOutcome, FftResults, FrequencyRoi, TransferFunction};
use crate::error::{ExtractionError, ExtractionResult};
use crate::extraction::analytical::extract_analytical;
use crate::extraction::numerical::SpectralExtractor;
use crate::extraction::thickness::{ThicknessResolver, ThicknessSweep};
use crate::signal::SignalConditioner;
use crate::transfer_function::{is_degenerate, transfer_function_of};
use num_complex::Complex64;
use std::sync::atomic::AtomicBool;

/// Transfer function of the currently windowed signals.
pub fn current_transfer_function(
    conditioner: &SignalConditioner,
) -> ExtractionResult<TransferFunction> {
    let windowed = conditioner
        .get_windowed_signals()
        .ok_or_else(|| ExtractionError::DataValidation("no data loaded".to_string()))?;
    transfer_function_of(&windowed)
}

/// Spectra and unwrapped phase of the currently windowed signals, for plotting and export.
pub fn current_fft_results(conditioner: &SignalConditioner) -> ExtractionResult<FftResults> {
    Ok(current_transfer_function(conditioner)?.fft_results())
}

/// The bins of `tf` handed to the inverters: inside `roi` and above DC.
///
/// Selection fails with `NumericalDegeneracy` if the reference spectrum vanishes in one of the
/// selected bins. Zero bins outside the band are ignored.
#[derive(Debug, Clone, Default)]
pub struct AnalysisBand {
    pub frequencies: Vec<f64>,
    pub h: Vec<Complex64>,
    pub phi_unwrapped: Vec<f64>,
}

impl AnalysisBand {
    pub fn select(tf: &TransferFunction, roi: &FrequencyRoi) -> ExtractionResult<Self> {
        let frequencies = tf.frequencies.to_vec();
        let indices: Vec<usize> = roi
            .indices(&frequencies)
            .into_iter()
            .filter(|&k| frequencies[k] > 0.0)
            .collect();
        if indices.is_empty() {
            return Err(ExtractionError::DataValidation(format!(
                "no frequency bins between {:.2} and {:.2} THz",
                roi.f_min, roi.f_max
            )));
        }
        if let Some(&k) = indices
            .iter()
            .find(|&&k| is_degenerate(&tf.reference_spectrum[k]))
        {
            return Err(ExtractionError::NumericalDegeneracy(format!(
                "reference spectrum is zero at bin {k} ({:.4} THz), transfer function undefined",
                frequencies[k]
            )));
        }
        Ok(AnalysisBand {
            frequencies: indices.iter().map(|&k| frequencies[k]).collect(),
            h: indices.iter().map(|&k| tf.h[k]).collect(),
            phi_unwrapped: indices.iter().map(|&k| tf.phase_unwrapped[k]).collect(),
        })
    }
}

/// Runs the configured extraction on the data held by `conditioner`.
///
/// # Arguments
/// - `conditioner`: Source of the windowed signals.
/// - `roi`: Band to invert, the full frequency axis if `None`. The DC bin is always dropped.
/// - `settings`: Method, thickness, guesses and sweep parameters.
/// - `progress`: Percentage of thickness candidates processed, numerical method only.
/// - `abort_flag`: Cancels a running thickness sweep.
pub fn run_extraction<P>(
    conditioner: &SignalConditioner,
    roi: Option<FrequencyRoi>,
    settings: &ExtractionSettings,
    progress: P,
    abort_flag: &AtomicBool,
) -> ExtractionResult<ExtractionOutcome>
where
    P: FnMut(u8) + Send,
{
    settings.validate()?;
    let tf = current_transfer_function(conditioner)?;
    let roi = match roi {
        Some(roi) => roi,
        None => FrequencyRoi::spanning(tf.frequencies.as_slice().unwrap_or(&[]))?,
    };
    let band = AnalysisBand::select(&tf, &roi)?;
    log::info!(
        "{} extraction on {} bins ({:.2} - {:.2} THz), d = {:.1} µm",
        settings.method,
        band.frequencies.len(),
        roi.f_min,
        roi.f_max,
        settings.thickness_um
    );

    match settings.method {
        ExtractionMethod::Analytical => {
            let h_abs: Vec<f64> = band.h.iter().map(|h| h.norm()).collect();
            let spectrum = extract_analytical(
                &band.frequencies,
                &h_abs,
                &band.phi_unwrapped,
                settings.thickness_um * 1e-6,
            )?;
            Ok(ExtractionOutcome {
                method: settings.method,
                spectrum,
                roi,
                search: None,
            })
        }
        ExtractionMethod::Numerical => {
            let sweep = ThicknessSweep::new(
                settings.thickness_um,
                settings.thickness_span_um,
                settings.thickness_step_um,
            )?;
            let resolver = ThicknessResolver::new(
                SpectralExtractor::from_settings(settings),
                settings.parallel_sweep,
            );
            let search = resolver.optimize_thickness(
                &band.frequencies,
                &band.h,
                &sweep,
                [settings.n_guess, settings.kappa_guess],
                progress,
                abort_flag,
            )?;
            if !search.best.non_converged_bins.is_empty() {
                log::warn!(
                    "{} of {} bins did not converge at the best thickness",
                    search.best.non_converged_bins.len(),
                    search.best.len()
                );
            }
            Ok(ExtractionOutcome {
                method: settings.method,
                spectrum: search.best.clone(),
                roi,
                search: Some(search),
            })
        }
    }
}
