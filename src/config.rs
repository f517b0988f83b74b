//! Extraction settings, the commands understood by the processing thread and the shared state
//! used to talk to it.

use crate::data_container::{ExtractionOutcome, FftResults, Waveforms};
use crate::error::{ExtractionError, ExtractionResult};
use crossbeam_channel::{Receiver, Sender};
use home::home_dir;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

/// How the material parameters are obtained from the transfer function.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum ExtractionMethod {
    /// Closed-form inversion at the given thickness.
    #[default]
    Analytical,
    /// Per-bin optimization of the Fresnel model with a thickness sweep.
    Numerical,
}

impl Display for ExtractionMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionMethod::Analytical => {
                write!(f, "Analytical")
            }
            ExtractionMethod::Numerical => {
                write!(f, "Numerical")
            }
        }
    }
}

/// What the spectral extractor does with a bin where the simplex search did not converge.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum NonConvergencePolicy {
    /// Keep the point and let the outlier smoothing absorb it.
    #[default]
    Ignore,
    /// Keep the point and log a warning.
    Warn,
    /// Stop with `OptimizationNonConvergence`. Inside a thickness sweep this acts like `Warn`.
    Abort,
}

/// Parameters of one extraction run.
///
/// Persisted between runs with the `preferences` crate and overridden from the command line.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct ExtractionSettings {
    pub method: ExtractionMethod,
    /// Nominal sample thickness in µm.
    pub thickness_um: f64,
    /// Initial guess for the refractive index of the first bin.
    pub n_guess: f64,
    /// Initial guess for the extinction coefficient of the first bin.
    pub kappa_guess: f64,
    /// Half width of the search box around the warm-start point.
    pub tolerance: f64,
    /// Thickness sweep step in µm.
    pub thickness_step_um: f64,
    /// Thickness sweep half width in µm.
    pub thickness_span_um: f64,
    /// Largest accepted bin-to-bin change of n or κ.
    pub outlier_threshold: f64,
    /// Bins up to and including this index are never smoothed.
    pub outlier_start_bin: usize,
    pub non_convergence: NonConvergencePolicy,
    /// Evaluate thickness candidates on the rayon pool.
    pub parallel_sweep: bool,
    pub output_directory: PathBuf,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        ExtractionSettings {
            method: ExtractionMethod::Analytical,
            thickness_um: 500.0,
            n_guess: 2.0,
            kappa_guess: 0.0,
            tolerance: 1.0,
            thickness_step_um: 0.5,
            thickness_span_um: 5.0,
            outlier_threshold: 0.10,
            outlier_start_bin: 10,
            non_convergence: NonConvergencePolicy::Ignore,
            parallel_sweep: true,
            output_directory: home_dir().unwrap_or_else(|| PathBuf::from("/")),
        }
    }
}

impl ExtractionSettings {
    /// Rejects settings that can not produce a meaningful extraction.
    pub fn validate(&self) -> ExtractionResult<()> {
        if !(self.thickness_um > 0.0) {
            return Err(ExtractionError::Configuration(format!(
                "sample thickness must be positive, got {} µm",
                self.thickness_um
            )));
        }
        if self.method == ExtractionMethod::Numerical {
            let checks = [
                (self.n_guess > 0.0, "initial n guess must be positive"),
                (self.kappa_guess >= 0.0, "initial κ guess must not be negative"),
                (self.tolerance > 0.0, "search bounds tolerance must be positive"),
                (self.thickness_step_um > 0.0, "thickness step must be positive"),
                (self.thickness_span_um > 0.0, "thickness span must be positive"),
                (self.outlier_threshold > 0.0, "outlier threshold must be positive"),
            ];
            if let Some((_, msg)) = checks.iter().find(|(ok, _)| !ok) {
                return Err(ExtractionError::Configuration(msg.to_string()));
            }
        }
        Ok(())
    }
}

/// Commands sent to the processing thread.
#[derive(Debug, Clone)]
pub enum ConfigCommand {
    /// Load a reference and a sample waveform file.
    OpenFiles { reference: PathBuf, sample: PathBuf },
    /// Use waveforms that were loaded elsewhere.
    SetData(Waveforms),
    /// Keep only samples with `time <= cutoff` (ps).
    SetTruncation(f64),
    /// Restrict the reported and inverted bins to `[f_min, f_max]` (THz).
    SetFrequencyRoi([f64; 2]),
    SetSettings(ExtractionSettings),
    /// Run the configured extraction on the current data.
    Extract,
    SaveFftData(PathBuf),
    SaveMaterialParameters(PathBuf),
    SaveThicknessCurve(PathBuf),
    /// Stop the processing thread.
    Quit,
}

/// Messages sent back from the processing thread.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusMessage {
    /// Data were loaded or truncated; carries the number of samples and frequency bins.
    DataReady { samples: usize, bins: usize },
    /// Percentage of thickness candidates processed.
    Progress(u8),
    /// An extraction finished; the outcome is available in the extraction lock.
    ExtractionDone,
    Saved(PathBuf),
    /// A command failed; the processing thread keeps running.
    Failed(String),
    Stopped,
}

/// Shared state between the processing thread and its controller.
#[derive(Clone)]
pub struct ThreadCommunication {
    pub fft_lock: Arc<RwLock<Option<FftResults>>>,
    pub extraction_lock: Arc<RwLock<Option<ExtractionOutcome>>>,
    pub progress_lock: Arc<RwLock<Option<u8>>>,
    pub abort_flag: Arc<AtomicBool>,
    pub settings: ExtractionSettings,
    pub config_tx: Sender<ConfigCommand>,
    pub config_rx: Receiver<ConfigCommand>,
    pub status_tx: Sender<StatusMessage>,
    pub status_rx: Receiver<StatusMessage>,
}

impl ThreadCommunication {
    pub fn new(settings: ExtractionSettings) -> Self {
        let (config_tx, config_rx): (Sender<ConfigCommand>, Receiver<ConfigCommand>) =
            crossbeam_channel::unbounded();
        let (status_tx, status_rx): (Sender<StatusMessage>, Receiver<StatusMessage>) =
            crossbeam_channel::unbounded();
        ThreadCommunication {
            fft_lock: Arc::new(RwLock::new(None)),
            extraction_lock: Arc::new(RwLock::new(None)),
            progress_lock: Arc::new(RwLock::new(None)),
            abort_flag: Arc::new(AtomicBool::new(false)),
            settings,
            config_tx,
            config_rx,
            status_tx,
            status_rx,
        }
    }

    /// Sends a command to the processing thread, logging if the thread has stopped.
    pub fn send(&self, command: ConfigCommand) {
        if let Err(err) = self.config_tx.send(command) {
            log::error!("processing thread is not running: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let mut settings = ExtractionSettings::default();
        assert!(settings.validate().is_ok());
        settings.method = ExtractionMethod::Numerical;
        assert!(settings.validate().is_ok());
        assert_eq!(settings.outlier_threshold, 0.10);
        assert_eq!(settings.outlier_start_bin, 10);
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let mut settings = ExtractionSettings {
            thickness_um: 0.0,
            ..ExtractionSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ExtractionError::Configuration(_))
        ));

        settings.thickness_um = 300.0;
        settings.method = ExtractionMethod::Numerical;
        settings.tolerance = 0.0;
        assert!(settings.validate().is_err());

        // only checked for the numerical method
        settings.method = ExtractionMethod::Analytical;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_method_display() {
        assert_eq!(ExtractionMethod::Analytical.to_string(), "Analytical");
        assert_eq!(ExtractionMethod::Numerical.to_string(), "Numerical");
    }
}
