//! Error types shared by every stage of the extraction pipeline.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for extraction operations
pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Errors that can occur while conditioning signals or extracting material parameters
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Input data violates a structural requirement (lengths, ordering, ranges)
    #[error("invalid data: {0}")]
    DataValidation(String),

    /// A computation hit a singular point (zero reference bin, n = 0)
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    /// The simplex search did not converge for a frequency bin
    #[error("optimizer did not converge at bin {bin} ({frequency_thz:.4} THz)")]
    OptimizationNonConvergence { bin: usize, frequency_thz: f64 },

    /// Invalid bounds, guesses or settings passed to the extraction
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The abort flag was raised while a sweep was running
    #[error("extraction cancelled")]
    Cancelled,

    /// The FFT backend rejected the input buffers
    #[error("FFT failed: {0}")]
    Fft(String),

    /// A line of a waveform file could not be parsed
    #[error("{path:?}, line {line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Reading or writing a file failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<realfft::FftError> for ExtractionError {
    fn from(err: realfft::FftError) -> Self {
        ExtractionError::Fft(err.to_string())
    }
}

impl From<cancellable_loops::Cancelled> for ExtractionError {
    fn from(_: cancellable_loops::Cancelled) -> Self {
        ExtractionError::Cancelled
    }
}
