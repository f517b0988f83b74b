//! Transmission model of a homogeneous slab in air at normal incidence.

use num_complex::Complex64;

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Refractive index of air.
pub const N_AIR: f64 = 1.00027;

/// Theoretical transfer function of an air–sample–air slab relative to the same path in air.
///
/// Includes the Fresnel transmission at both interfaces and the first internal round trip
/// (Fabry–Pérot term).
///
/// # Arguments
/// - `n`, `kappa`: Complex refractive index `ñ = n - iκ` of the sample.
/// - `omega`: Angular frequency in rad/s.
/// - `thickness_m`: Sample thickness in m.
pub fn slab_transfer_function(n: f64, kappa: f64, omega: f64, thickness_m: f64) -> Complex64 {
    let n_complex = Complex64::new(n, -kappa);
    let n_air = Complex64::new(N_AIR, 0.0);
    let i = Complex64::i();

    let beta_sam = n_complex * (omega * thickness_m / SPEED_OF_LIGHT);
    let beta_air = N_AIR * omega * thickness_m / SPEED_OF_LIGHT;

    let t_12 = 2.0 * n_air / (n_air + n_complex);
    let t_23 = 2.0 * n_complex / (n_complex + n_air);
    let r_12 = (n_air - n_complex) / (n_air + n_complex);
    let r_23 = (n_complex - n_air) / (n_complex + n_air);

    let propagation = (-i * (beta_sam - beta_air)).exp();
    let echo = 1.0 + r_12 * r_23 * (-2.0 * i * beta_sam).exp();
    t_12 * t_23 * propagation / echo
}

/// Squared log-amplitude and phase mismatch between the model and a measured transfer function.
///
/// `x` holds `[n, κ]`.
pub fn transfer_mismatch(x: &[f64], omega: f64, thickness_m: f64, h_exp: Complex64) -> f64 {
    let h_theo = slab_transfer_function(x[0], x[1], omega, thickness_m);
    let error_mag = h_theo.norm().ln() - h_exp.norm().ln();
    let error_phase = h_theo.arg() - h_exp.arg();
    error_mag * error_mag + error_phase * error_phase
}
