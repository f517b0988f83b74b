//! Estimation of the complex transfer function `H(f) = FFT(sample) / FFT(reference)`.

use crate::data_container::{TransferFunction, WindowedSignals};
use crate::error::{ExtractionError, ExtractionResult};
use crate::math_tools::{fft_frequencies, unwrap_phase};
use crate::signal::MIN_SAMPLES;
use ndarray::Array1;
use num_complex::Complex64;
use realfft::RealFftPlanner;

/// Computes the transfer function of a windowed reference/sample pair.
///
/// Both traces are transformed with a real-to-complex FFT. The ratio, the individual spectra and
/// the phase `-arg(H)` are kept for the first `⌊N/2⌋` bins, the non-negative frequencies.
/// Bins where the reference spectrum vanishes carry a NaN ratio; the phase there is taken from
/// `S·conj(R)` and stays finite. Inverters reject such bins when they fall inside their band.
///
/// # Arguments
/// - `time`: Time axis in ps (only the length and the first sampling interval are used).
/// - `reference`: Windowed reference trace.
/// - `sample`: Windowed sample trace.
///
/// # Errors
/// `DataValidation` for mismatched or too short traces.
pub fn compute_transfer_function(
    time: &Array1<f64>,
    reference: &Array1<f64>,
    sample: &Array1<f64>,
) -> ExtractionResult<TransferFunction> {
    let n = time.len();
    if reference.len() != n || sample.len() != n {
        return Err(ExtractionError::DataValidation(format!(
            "series lengths differ: time {n}, reference {}, sample {}",
            reference.len(),
            sample.len()
        )));
    }
    if n < MIN_SAMPLES {
        return Err(ExtractionError::DataValidation(format!(
            "at least {MIN_SAMPLES} samples are required, got {n}"
        )));
    }
    let dt_ps = time[1] - time[0];
    let frequencies = fft_frequencies(n, dt_ps);
    let bins = frequencies.len();

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n);

    let mut input = reference.to_vec();
    let mut reference_spectrum = r2c.make_output_vec();
    r2c.process(&mut input, &mut reference_spectrum)?;

    let mut input = sample.to_vec();
    let mut sample_spectrum = r2c.make_output_vec();
    r2c.process(&mut input, &mut sample_spectrum)?;

    reference_spectrum.truncate(bins);
    sample_spectrum.truncate(bins);

    let h: Array1<Complex64> = sample_spectrum
        .iter()
        .zip(reference_spectrum.iter())
        .map(|(s, r)| {
            if is_degenerate(r) {
                Complex64::new(f64::NAN, f64::NAN)
            } else {
                s / r
            }
        })
        .collect();
    let phase_wrapped: Array1<f64> = sample_spectrum
        .iter()
        .zip(reference_spectrum.iter())
        .map(|(s, r)| -(s * r.conj()).arg())
        .collect();
    let phase_unwrapped = Array1::from_vec(unwrap_phase(phase_wrapped.as_slice().unwrap_or(&[])));

    log::debug!(
        "transfer function: {n} samples, {bins} bins, df = {:.4} THz",
        if bins > 1 { frequencies[1] } else { 0.0 }
    );

    Ok(TransferFunction {
        frequencies,
        h,
        reference_spectrum: Array1::from_vec(reference_spectrum),
        sample_spectrum: Array1::from_vec(sample_spectrum),
        phase_wrapped,
        phase_unwrapped,
    })
}

/// True if the reference bin cannot be divided by.
pub fn is_degenerate(reference_bin: &Complex64) -> bool {
    let norm = reference_bin.norm();
    norm == 0.0 || !norm.is_finite()
}

/// Convenience wrapper for the output of the signal conditioner.
pub fn transfer_function_of(signals: &WindowedSignals) -> ExtractionResult<TransferFunction> {
    compute_transfer_function(&signals.time, &signals.reference, &signals.sample)
}
