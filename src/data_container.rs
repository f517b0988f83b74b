//! This module defines the data structures that flow through the extraction pipeline, from the
//! raw waveform pair to the extracted material spectra.
//!
//! Every structure is produced by one stage and consumed read-only by the next; nothing here is
//! updated in place once it has been handed downstream.

use crate::config::ExtractionMethod;
use crate::error::{ExtractionError, ExtractionResult};
use ndarray::Array1;
use num_complex::Complex64;

/// A reference and a sample trace sharing one time axis.
///
/// # Fields
/// - `time`: Time axis in ps, strictly increasing and uniformly sampled.
/// - `reference`: Amplitude of the pulse through air.
/// - `sample`: Amplitude of the pulse through the sample.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Waveforms {
    pub time: Array1<f64>,
    pub reference: Array1<f64>,
    pub sample: Array1<f64>,
}

impl Waveforms {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Sampling interval in ps, taken from the first two samples.
    pub fn dt_ps(&self) -> f64 {
        if self.time.len() < 2 {
            return 0.0;
        }
        self.time[1] - self.time[0]
    }
}

/// The active time-domain cutoff and the samples it keeps.
#[derive(Clone, Debug, PartialEq)]
pub struct TruncationState {
    /// Last time (ps) that is kept.
    pub cutoff_ps: f64,
    /// `time <= cutoff_ps` for every sample.
    pub mask: Vec<bool>,
}

impl TruncationState {
    /// Number of samples kept by the mask.
    pub fn kept(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }
}

/// The truncated traces multiplied by the edge taper.
#[derive(Clone, Debug, Default)]
pub struct WindowedSignals {
    pub time: Array1<f64>,
    pub reference: Array1<f64>,
    pub sample: Array1<f64>,
    pub window: Array1<f64>,
}

/// Frequency band of interest in THz.
///
/// Only used to select which bins are reported and inverted, it never changes the upstream
/// transforms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrequencyRoi {
    pub f_min: f64,
    pub f_max: f64,
}

impl FrequencyRoi {
    /// Creates a band, rejecting `f_min >= f_max` and non-finite bounds.
    pub fn new(f_min: f64, f_max: f64) -> ExtractionResult<Self> {
        if !f_min.is_finite() || !f_max.is_finite() || f_min >= f_max {
            return Err(ExtractionError::DataValidation(format!(
                "frequency range {f_min} - {f_max} THz is empty"
            )));
        }
        Ok(FrequencyRoi { f_min, f_max })
    }

    /// The full range of a frequency axis.
    pub fn spanning(frequencies: &[f64]) -> ExtractionResult<Self> {
        let f_min = frequencies.iter().copied().fold(f64::INFINITY, f64::min);
        let f_max = frequencies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        FrequencyRoi::new(f_min, f_max)
    }

    pub fn contains(&self, f: f64) -> bool {
        f >= self.f_min && f <= self.f_max
    }

    /// `f_min <= f <= f_max` for every bin of `frequencies`.
    pub fn mask(&self, frequencies: &[f64]) -> Vec<bool> {
        frequencies.iter().map(|&f| self.contains(f)).collect()
    }

    /// Indices of the bins inside the band.
    pub fn indices(&self, frequencies: &[f64]) -> Vec<usize> {
        frequencies
            .iter()
            .enumerate()
            .filter(|(_, &f)| self.contains(f))
            .map(|(i, _)| i)
            .collect()
    }

    /// Keeps the values whose frequency lies inside the band.
    pub fn select<T: Clone>(&self, frequencies: &[f64], values: &[T]) -> Vec<T> {
        frequencies
            .iter()
            .zip(values.iter())
            .filter(|(&f, _)| self.contains(f))
            .map(|(_, v)| v.clone())
            .collect()
    }
}

/// Complex ratio of the sample and reference spectra on the non-negative frequency half.
///
/// # Fields
/// - `frequencies`: Frequency axis in THz, `⌊N/2⌋` bins.
/// - `h`: `FFT(sample) / FFT(reference)`.
/// - `reference_spectrum`, `sample_spectrum`: The individual spectra.
/// - `phase_wrapped`: `-arg(h)`.
/// - `phase_unwrapped`: `phase_wrapped` with the 2π jumps removed.
#[derive(Clone, Debug, Default)]
pub struct TransferFunction {
    pub frequencies: Array1<f64>,
    pub h: Array1<Complex64>,
    pub reference_spectrum: Array1<Complex64>,
    pub sample_spectrum: Array1<Complex64>,
    pub phase_wrapped: Array1<f64>,
    pub phase_unwrapped: Array1<f64>,
}

impl TransferFunction {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Amplitude and phase data as exported to the FFT data file.
    pub fn fft_results(&self) -> FftResults {
        FftResults {
            freq: self.frequencies.to_vec(),
            fft_ref: self.reference_spectrum.iter().map(|c| c.norm()).collect(),
            fft_sam: self.sample_spectrum.iter().map(|c| c.norm()).collect(),
            phi_unwrapped: self.phase_unwrapped.to_vec(),
        }
    }
}

/// Spectral amplitudes and the unwrapped phase difference for export.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FftResults {
    pub freq: Vec<f64>,
    pub fft_ref: Vec<f64>,
    pub fft_sam: Vec<f64>,
    pub phi_unwrapped: Vec<f64>,
}

/// Refractive index, extinction coefficient and absorption coefficient per frequency bin.
///
/// # Fields
/// - `frequencies`: Frequency of every bin in THz.
/// - `n`: Refractive index.
/// - `kappa`: Extinction coefficient.
/// - `alpha`: Absorption coefficient in cm⁻¹.
/// - `thickness_um`: Sample thickness the spectrum was computed for.
/// - `non_converged_bins`: Bins where the simplex search reported failure (numerical path only).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialSpectrum {
    pub frequencies: Vec<f64>,
    pub n: Vec<f64>,
    pub kappa: Vec<f64>,
    pub alpha: Vec<f64>,
    pub thickness_um: f64,
    pub non_converged_bins: Vec<usize>,
}

impl MaterialSpectrum {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// `Σ|Δn| + Σ|Δκ|`, the smoothness score used to rank thickness candidates.
    pub fn total_variation(&self) -> f64 {
        crate::math_tools::total_variation(&self.n) + crate::math_tools::total_variation(&self.kappa)
    }
}

/// Outcome of a thickness sweep.
///
/// # Fields
/// - `thicknesses_um`: Every candidate, in sweep order.
/// - `total_variation`: Raw TV score per candidate.
/// - `normalized_tv`: TV divided by the largest TV of the sweep.
/// - `best_index`: Index of the candidate with the smallest normalized TV.
/// - `best`: Material spectrum of the winning candidate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ThicknessSearchResult {
    pub thicknesses_um: Vec<f64>,
    pub total_variation: Vec<f64>,
    pub normalized_tv: Vec<f64>,
    pub best_index: usize,
    pub best: MaterialSpectrum,
}

impl ThicknessSearchResult {
    pub fn best_thickness_um(&self) -> f64 {
        self.best.thickness_um
    }
}

/// Everything the presentation side needs from one extraction run.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionOutcome {
    pub method: ExtractionMethod,
    pub spectrum: MaterialSpectrum,
    pub roi: FrequencyRoi,
    pub search: Option<ThicknessSearchResult>,
}
