//! Material parameter extraction from a measured transfer function.
//!
//! Two paths are available. The analytical path inverts amplitude and phase directly at a fixed
//! thickness. The numerical path fits the slab model bin by bin and refines the thickness by
//! minimizing the total variation of the resulting spectra.

pub mod analytical;
pub mod model;
pub mod numerical;
pub mod pipeline;
pub mod thickness;

pub use analytical::{absorption_coefficient, extract_analytical};
pub use model::{slab_transfer_function, transfer_mismatch, N_AIR, SPEED_OF_LIGHT};
pub use numerical::{extract_numerical, BinValues, OutlierSmoothing, SpectralExtractor};
pub use pipeline::{current_fft_results, current_transfer_function, run_extraction, AnalysisBand};
pub use thickness::{ThicknessResolver, ThicknessSweep};
