//! Numerical helpers shared by the signal conditioner and the extraction stages: the Blackman
//! edge taper, the FFT frequency axis, phase unwrapping and total variation.

use ndarray::{concatenate, Array1, ArrayViewMut, Axis, Ix1, Zip};
use std::f64::consts::PI;

/// Fraction of the trace length tapered at each edge.
pub const EDGE_FRACTION: f64 = 0.05;

/// Computes the Blackman window value for a given sample.
///
/// The implementation follows the mathematical definition as used by Python's numpy library,
/// where `m` is the window length minus one.
///
/// # Arguments
/// - `n`: The sample index.
/// - `m`: The window length minus one.
///
/// # Returns
/// The computed value of the Blackman window. It automatically clamps the value in the range [0.0, 1.0].
fn blackman_window(n: f64, m: f64) -> f64 {
    let res = 0.42 - 0.5 * (2.0 * PI * n / m).cos() + 0.08 * (4.0 * PI * n / m).cos();
    if res.is_nan() {
        // single-sample window (m == 0)
        1.0
    } else {
        res.clamp(0.0, 1.0)
    }
}

/// Number of samples tapered at each end of a trace with `n` samples.
///
/// `min(⌊0.05·n⌋, ⌊n/4⌋)`, zero for short traces.
pub fn taper_length(n: usize) -> usize {
    let taper = (n as f64 * EDGE_FRACTION) as usize;
    taper.min(n / 4)
}

/// Builds the edge taper for a trace of `n` samples.
///
/// The first and second half of a Blackman window of width `2·taper_length(n)` form the rising and
/// falling edge, the center is flat with unity gain.
pub fn edge_taper(n: usize) -> Array1<f64> {
    let taper = taper_length(n);
    let width = 2 * taper;
    let blackman = Array1::from_shape_fn(width, |i| {
        blackman_window(i as f64, width.saturating_sub(1) as f64)
    });
    let rise = blackman.slice(ndarray::s![..taper]);
    let fall = blackman.slice(ndarray::s![taper..]);
    let flat = Array1::<f64>::ones(n - width);
    concatenate(Axis(0), &[rise, flat.view(), fall]).unwrap_or_else(|_| Array1::ones(n))
}

/// Multiplies a signal in place with a window of the same length.
///
/// # Arguments
/// - `signal`: A mutable view of the signal to which the window will be applied.
/// - `window`: The window, as returned by [`edge_taper`].
pub fn apply_window(signal: &mut ArrayViewMut<f64, Ix1>, window: &Array1<f64>) {
    Zip::from(signal).and(window).for_each(|s, w| {
        *s *= w;
    });
}

/// Non-negative half of the FFT frequency axis for `n` samples spaced `dt_ps` picoseconds apart.
///
/// Equivalent to `fftfreq(n, dt)[:n // 2]`, returned in THz (bin `k` sits at `k / (n·dt)`).
pub fn fft_frequencies(n: usize, dt_ps: f64) -> Array1<f64> {
    let df = 1.0 / (n as f64 * dt_ps);
    Array1::from_shape_fn(n / 2, |k| k as f64 * df)
}

/// Unwraps a phase series by removing 2π discontinuities along increasing index.
///
/// A step larger than π between neighbours is interpreted as a wrap and corrected by ±2π, the
/// same rule as numpy's `unwrap` with the default discontinuity.
///
/// # Arguments
/// - `x`: The wrapped phase in radians.
///
/// # Returns
/// A vector containing the unwrapped phase.
pub fn unwrap_phase(x: &[f64]) -> Vec<f64> {
    let period = 2.0 * PI;
    let mut unwrapped = x.to_owned();
    let Some(&first) = x.first() else {
        return unwrapped;
    };
    let mut prev_val = first;
    let mut prev_unwrapped = first;
    for (val, out) in x.iter().zip(unwrapped.iter_mut()).skip(1) {
        let mut diff = val - prev_val;
        if diff > period / 2.0 {
            diff -= period;
        } else if diff < -period / 2.0 {
            diff += period;
        }
        let unwrapped_val = prev_unwrapped + diff;
        prev_val = *val;
        prev_unwrapped = unwrapped_val;
        *out = unwrapped_val;
    }
    unwrapped
}

/// Sum of the absolute differences between consecutive samples.
pub fn total_variation(x: &[f64]) -> f64 {
    x.windows(2).map(|w| (w[1] - w[0]).abs()).sum()
}
