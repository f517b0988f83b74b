//! Closed-form inversion of the thick-slab transfer function.

use crate::data_container::MaterialSpectrum;
use crate::error::{ExtractionError, ExtractionResult};
use crate::extraction::model::SPEED_OF_LIGHT;
use std::f64::consts::PI;

/// Absorption coefficient in cm⁻¹ of a bin at `frequency_thz` with extinction `kappa`.
pub fn absorption_coefficient(frequency_thz: f64, kappa: f64) -> f64 {
    4.0 * PI * frequency_thz * 1e12 * kappa / (100.0 * SPEED_OF_LIGHT)
}

/// Computes n, κ and α from amplitude and unwrapped phase of the transfer function.
///
/// Neglects multiple reflections inside the sample:
/// `n = 1 + φ·c/(ω·d)` and `κ = -c/(ω·d) · ln((n+1)²·|H| / (4n))`.
///
/// # Arguments
/// - `frequencies`: Bins in THz.
/// - `h_abs`: `|H|` per bin.
/// - `phi_unwrapped`: Unwrapped phase `-arg(H)` per bin.
/// - `thickness_m`: Sample thickness in m.
///
/// # Errors
/// `DataValidation` for mismatched inputs, `NumericalDegeneracy` if `ω·d` or `n` is zero in any
/// bin.
pub fn extract_analytical(
    frequencies: &[f64],
    h_abs: &[f64],
    phi_unwrapped: &[f64],
    thickness_m: f64,
) -> ExtractionResult<MaterialSpectrum> {
    if h_abs.len() != frequencies.len() || phi_unwrapped.len() != frequencies.len() {
        return Err(ExtractionError::DataValidation(format!(
            "{} frequencies, {} amplitudes and {} phases",
            frequencies.len(),
            h_abs.len(),
            phi_unwrapped.len()
        )));
    }
    if !(thickness_m > 0.0) {
        return Err(ExtractionError::Configuration(format!(
            "sample thickness must be positive, got {thickness_m} m"
        )));
    }

    let bins = frequencies.len();
    let mut n = Vec::with_capacity(bins);
    let mut kappa = Vec::with_capacity(bins);
    let mut alpha = Vec::with_capacity(bins);

    for (j, ((&f, &amplitude), &phi)) in frequencies
        .iter()
        .zip(h_abs.iter())
        .zip(phi_unwrapped.iter())
        .enumerate()
    {
        let omega = 2.0 * PI * f * 1e12;
        let omega_d = omega * thickness_m;
        if omega_d == 0.0 {
            return Err(ExtractionError::NumericalDegeneracy(format!(
                "ω·d vanishes at bin {j} ({f:.4} THz)"
            )));
        }
        let n_j = 1.0 + phi * SPEED_OF_LIGHT / omega_d;
        if n_j.abs() < 1e-12 {
            return Err(ExtractionError::NumericalDegeneracy(format!(
                "refractive index is zero at bin {j} ({f:.4} THz)"
            )));
        }
        let kappa_j =
            -SPEED_OF_LIGHT / omega_d * ((n_j + 1.0).powi(2) * amplitude / (4.0 * n_j)).ln();
        n.push(n_j);
        kappa.push(kappa_j);
        alpha.push(2.0 * omega / SPEED_OF_LIGHT * kappa_j / 100.0);
    }

    log::debug!(
        "analytical inversion of {bins} bins at d = {:.1} µm",
        thickness_m * 1e6
    );

    Ok(MaterialSpectrum {
        frequencies: frequencies.to_vec(),
        n,
        kappa,
        alpha,
        thickness_um: thickness_m * 1e6,
        non_converged_bins: vec![],
    })
}
