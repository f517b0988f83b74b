//! The signal conditioner holds the measured waveform pair and the active truncation.
//!
//! It is the only mutable stage of the pipeline. Everything derived from it (windowed traces,
//! spectra, material parameters) is returned as a new value and must be derived again after a
//! call to [`SignalConditioner::update_truncation`].

use crate::data_container::{TruncationState, Waveforms, WindowedSignals};
use crate::error::{ExtractionError, ExtractionResult};
use crate::math_tools::{apply_window, edge_taper, fft_frequencies};
use ndarray::Array1;

/// Smallest number of samples a trace (or a truncated trace) may have.
pub const MIN_SAMPLES: usize = 4;

#[derive(Clone, Debug, Default)]
pub struct SignalConditioner {
    waveforms: Option<Waveforms>,
    truncation: Option<TruncationState>,
    frequencies: Array1<f64>,
}

impl SignalConditioner {
    pub fn new() -> Self {
        SignalConditioner::default()
    }

    /// Stores a new waveform pair.
    ///
    /// The traces must have equal length of at least [`MIN_SAMPLES`] and a strictly increasing
    /// time axis. On the first load the cutoff is the last sample; a cutoff from earlier data is
    /// applied again to the new traces.
    ///
    /// # Arguments
    /// - `time`: Time axis in ps.
    /// - `reference`: Reference amplitude.
    /// - `sample`: Sample amplitude.
    pub fn set_data(
        &mut self,
        time: Array1<f64>,
        reference: Array1<f64>,
        sample: Array1<f64>,
    ) -> ExtractionResult<()> {
        validate_waveforms(&time, &reference, &sample)?;
        let last = time[time.len() - 1];
        let cutoff = self
            .truncation
            .as_ref()
            .map(|state| state.cutoff_ps)
            .unwrap_or(last);
        let waveforms = Waveforms {
            time,
            reference,
            sample,
        };

        let (truncation, frequencies) = match derive_truncation(&waveforms, cutoff) {
            Ok(derived) => derived,
            Err(err) => {
                // the old cutoff does not fit the new traces, fall back to the full trace
                log::warn!("discarding cutoff {cutoff} ps for new data: {err}");
                derive_truncation(&waveforms, last)?
            }
        };
        log::debug!(
            "loaded {} samples, {} kept after truncation at {} ps",
            waveforms.len(),
            truncation.kept(),
            truncation.cutoff_ps
        );
        self.waveforms = Some(waveforms);
        self.truncation = Some(truncation);
        self.frequencies = frequencies;
        Ok(())
    }

    /// Moves the cutoff to `cutoff_ps` and derives the frequency axis for the truncated length.
    ///
    /// A cutoff that keeps fewer than [`MIN_SAMPLES`] samples is rejected and the previous
    /// truncation stays active.
    pub fn update_truncation(&mut self, cutoff_ps: f64) -> ExtractionResult<()> {
        let waveforms = self
            .waveforms
            .as_ref()
            .ok_or_else(|| ExtractionError::DataValidation("no data loaded".to_string()))?;
        let (truncation, frequencies) = derive_truncation(waveforms, cutoff_ps)?;
        self.truncation = Some(truncation);
        self.frequencies = frequencies;
        Ok(())
    }

    pub fn waveforms(&self) -> Option<&Waveforms> {
        self.waveforms.as_ref()
    }

    pub fn truncation(&self) -> Option<&TruncationState> {
        self.truncation.as_ref()
    }

    /// Frequency axis (THz) of the truncated traces.
    pub fn frequencies(&self) -> &Array1<f64> {
        &self.frequencies
    }

    /// The samples kept by the current truncation, or `None` if no data are loaded.
    pub fn get_truncated_signals(&self) -> Option<Waveforms> {
        let waveforms = self.waveforms.as_ref()?;
        let truncation = self.truncation.as_ref()?;
        let pick = |values: &Array1<f64>| -> Array1<f64> {
            values
                .iter()
                .zip(truncation.mask.iter())
                .filter(|(_, &keep)| keep)
                .map(|(v, _)| *v)
                .collect()
        };
        Some(Waveforms {
            time: pick(&waveforms.time),
            reference: pick(&waveforms.reference),
            sample: pick(&waveforms.sample),
        })
    }

    /// The truncated traces multiplied by the edge taper, or `None` if no data are loaded.
    pub fn get_windowed_signals(&self) -> Option<WindowedSignals> {
        let truncated = self.get_truncated_signals()?;
        let window = edge_taper(truncated.len());
        let mut reference = truncated.reference;
        let mut sample = truncated.sample;
        apply_window(&mut reference.view_mut(), &window);
        apply_window(&mut sample.view_mut(), &window);
        Some(WindowedSignals {
            time: truncated.time,
            reference,
            sample,
            window,
        })
    }
}

/// Checks the structural invariants of a waveform pair.
pub fn validate_waveforms(
    time: &Array1<f64>,
    reference: &Array1<f64>,
    sample: &Array1<f64>,
) -> ExtractionResult<()> {
    if time.len() != reference.len() || time.len() != sample.len() {
        return Err(ExtractionError::DataValidation(format!(
            "series lengths differ: time {}, reference {}, sample {}",
            time.len(),
            reference.len(),
            sample.len()
        )));
    }
    if time.len() < MIN_SAMPLES {
        return Err(ExtractionError::DataValidation(format!(
            "at least {MIN_SAMPLES} samples are required, got {}",
            time.len()
        )));
    }
    if let Some(i) = time
        .windows(2)
        .into_iter()
        .position(|w| !(w[1] > w[0]))
    {
        return Err(ExtractionError::DataValidation(format!(
            "time axis is not strictly increasing at sample {}",
            i + 1
        )));
    }
    Ok(())
}

fn derive_truncation(
    waveforms: &Waveforms,
    cutoff_ps: f64,
) -> ExtractionResult<(TruncationState, Array1<f64>)> {
    let mask: Vec<bool> = waveforms.time.iter().map(|&t| t <= cutoff_ps).collect();
    let truncation = TruncationState { cutoff_ps, mask };
    let kept = truncation.kept();
    if kept < MIN_SAMPLES {
        return Err(ExtractionError::DataValidation(format!(
            "cutoff at {cutoff_ps} ps keeps {kept} samples, at least {MIN_SAMPLES} are required"
        )));
    }
    let frequencies = fft_frequencies(kept, waveforms.dt_ps());
    Ok((truncation, frequencies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp_data(n: usize, dt: f64) -> (Array1<f64>, Array1<f64>, Array1<f64>) {
        let time = Array1::from_shape_fn(n, |i| i as f64 * dt);
        let reference = Array1::from_shape_fn(n, |i| (i as f64 * 0.3).sin());
        let sample = Array1::from_shape_fn(n, |i| 0.5 * (i as f64 * 0.3).cos());
        (time, reference, sample)
    }

    #[test]
    fn test_set_data_defaults_to_full_trace() {
        let (t, r, s) = ramp_data(100, 0.05);
        let mut conditioner = SignalConditioner::new();
        conditioner.set_data(t, r, s).unwrap();

        let truncation = conditioner.truncation().unwrap();
        assert_relative_eq!(truncation.cutoff_ps, 99.0 * 0.05);
        assert_eq!(truncation.kept(), 100);
        assert_eq!(conditioner.frequencies().len(), 50);
        assert_relative_eq!(
            conditioner.frequencies()[1],
            1.0 / (100.0 * 0.05),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_set_data_validation() {
        let mut conditioner = SignalConditioner::new();
        let (t, r, _) = ramp_data(10, 1.0);
        let short = Array1::zeros(9);
        assert!(matches!(
            conditioner.set_data(t.clone(), r.clone(), short),
            Err(ExtractionError::DataValidation(_))
        ));

        let mut backwards = t.clone();
        backwards[5] = backwards[4];
        assert!(conditioner
            .set_data(backwards, r.clone(), r.clone())
            .is_err());

        let (t3, r3, s3) = ramp_data(3, 1.0);
        assert!(conditioner.set_data(t3, r3, s3).is_err());
        assert!(conditioner.get_windowed_signals().is_none());
    }

    #[test]
    fn test_truncation_uses_truncated_length() {
        let (t, r, s) = ramp_data(200, 0.1);
        let mut conditioner = SignalConditioner::new();
        conditioner.set_data(t, r, s).unwrap();
        conditioner.update_truncation(9.95).unwrap();

        assert_eq!(conditioner.truncation().unwrap().kept(), 100);
        assert_eq!(conditioner.frequencies().len(), 50);
        assert_relative_eq!(
            conditioner.frequencies()[1],
            1.0 / (100.0 * 0.1),
            epsilon = 1e-9
        );
        let truncated = conditioner.get_truncated_signals().unwrap();
        assert_eq!(truncated.len(), 100);
        assert!(truncated.time.iter().all(|&t| t <= 9.95));
    }

    #[test]
    fn test_truncation_is_idempotent() {
        let (t, r, s) = ramp_data(128, 0.05);
        let mut conditioner = SignalConditioner::new();
        conditioner.set_data(t, r, s).unwrap();

        conditioner.update_truncation(4.0).unwrap();
        let first_state = conditioner.truncation().unwrap().clone();
        let first_freq = conditioner.frequencies().clone();
        conditioner.update_truncation(4.0).unwrap();
        assert_eq!(conditioner.truncation().unwrap(), &first_state);
        assert_eq!(conditioner.frequencies(), &first_freq);
    }

    #[test]
    fn test_truncation_below_minimum_keeps_previous_state() {
        let (t, r, s) = ramp_data(64, 1.0);
        let mut conditioner = SignalConditioner::new();
        conditioner.set_data(t, r, s).unwrap();
        conditioner.update_truncation(40.0).unwrap();

        assert!(conditioner.update_truncation(2.0).is_err());
        assert_relative_eq!(conditioner.truncation().unwrap().cutoff_ps, 40.0);
        assert_eq!(conditioner.truncation().unwrap().kept(), 41);
    }

    #[test]
    fn test_reload_keeps_cutoff() {
        let (t, r, s) = ramp_data(64, 1.0);
        let mut conditioner = SignalConditioner::new();
        conditioner.set_data(t.clone(), r.clone(), s.clone()).unwrap();
        conditioner.update_truncation(31.0).unwrap();
        conditioner.set_data(t, r, s).unwrap();
        assert_eq!(conditioner.truncation().unwrap().kept(), 32);
    }

    #[test]
    fn test_windowed_signals_preserve_length() {
        for n in [4usize, 5, 17, 64, 257] {
            let (t, r, s) = ramp_data(n, 0.05);
            let mut conditioner = SignalConditioner::new();
            conditioner.set_data(t, r.clone(), s).unwrap();
            let windowed = conditioner.get_windowed_signals().unwrap();
            assert_eq!(windowed.time.len(), n);
            assert_eq!(windowed.reference.len(), n);
            assert_eq!(windowed.sample.len(), n);
            assert_eq!(windowed.window[n / 2], 1.0);
            assert_eq!(windowed.reference[n / 2], r[n / 2]);
        }
    }
}
