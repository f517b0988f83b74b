//! Nelder-Mead simplex algorithm for derivative-free minimization.

use crate::error::{ExtractionError, ExtractionResult};

/// Options for the simplex search.
#[derive(Debug, Clone)]
pub struct SimplexOptions {
    /// Maximum number of iterations, `200 * dimension` if `None`
    pub max_iter: Option<usize>,
    /// Maximum number of function evaluations, `200 * dimension` if `None`
    pub max_fev: Option<usize>,
    /// Absolute tolerance on the simplex spread
    pub x_tol: f64,
    /// Absolute tolerance on the spread of the function values
    pub f_tol: f64,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            max_iter: None,
            max_fev: None,
            x_tol: 1e-4,
            f_tol: 1e-4,
        }
    }
}

/// Result of a simplex search.
#[derive(Debug, Clone, PartialEq)]
pub struct SimplexResult {
    /// Best vertex found.
    pub x: Vec<f64>,
    /// Function value at `x`.
    pub fun: f64,
    pub iterations: usize,
    pub nfev: usize,
    /// Both tolerances were met before a budget ran out.
    pub converged: bool,
}

/// Nelder-Mead simplex algorithm for derivative-free minimization.
///
/// Non-finite function values are treated as `+inf`, so the simplex moves away from them.
///
/// # Arguments
/// * `f` - Function f: R^n -> R to minimize
/// * `x0` - Initial guess
/// * `options` - Solver options
///
/// # Returns
/// Best point found; `converged` is false if a budget ran out first.
pub fn nelder_mead<F>(f: F, x0: &[f64], options: &SimplexOptions) -> ExtractionResult<SimplexResult>
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    if n == 0 {
        return Err(ExtractionError::Configuration(
            "nelder_mead: empty initial guess".to_string(),
        ));
    }
    if x0.iter().any(|x| !x.is_finite()) {
        return Err(ExtractionError::Configuration(format!(
            "nelder_mead: initial guess {x0:?} is not finite"
        )));
    }
    let max_iter = options.max_iter.unwrap_or(200 * n);
    let max_fev = options.max_fev.unwrap_or(200 * n);

    let rho = 1.0; // reflection
    let chi = 2.0; // expansion
    let psi = 0.5; // contraction
    let sigma = 0.5; // shrink

    let eval = |x: &[f64]| -> f64 {
        let value = f(x);
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    };

    // Initialize simplex with n+1 vertices
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(x0.to_vec());
    for i in 0..n {
        let mut vertex = x0.to_vec();
        if vertex[i] != 0.0 {
            vertex[i] *= 1.05;
        } else {
            vertex[i] = 0.00025;
        }
        simplex.push(vertex);
    }

    let mut f_values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();
    let mut nfev = n + 1;
    sort_simplex(&mut simplex, &mut f_values);

    let mut iterations = 1;
    while nfev < max_fev && iterations < max_iter {
        let x_spread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(simplex[0].iter()).map(|(a, b)| (a - b).abs()))
            .fold(0.0_f64, f64::max);
        let f_spread = f_values[1..]
            .iter()
            .map(|fv| (f_values[0] - fv).abs())
            .fold(0.0_f64, f64::max);
        if x_spread <= options.x_tol && f_spread <= options.f_tol {
            break;
        }

        // centroid of all vertices except the worst
        let mut centroid = vec![0.0; n];
        for vertex in simplex.iter().take(n) {
            for (c, v) in centroid.iter_mut().zip(vertex.iter()) {
                *c += v;
            }
        }
        centroid.iter_mut().for_each(|c| *c /= n as f64);
        let worst = simplex[n].clone();
        let along = |t: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(worst.iter())
                .map(|(c, w)| (1.0 + t) * c - t * w)
                .collect()
        };

        let x_r = along(rho);
        let f_r = eval(&x_r);
        nfev += 1;
        let mut shrink = false;

        if f_r < f_values[0] {
            let x_e = along(rho * chi);
            let f_e = eval(&x_e);
            nfev += 1;
            if f_e < f_r {
                simplex[n] = x_e;
                f_values[n] = f_e;
            } else {
                simplex[n] = x_r;
                f_values[n] = f_r;
            }
        } else if f_r < f_values[n - 1] {
            simplex[n] = x_r;
            f_values[n] = f_r;
        } else if f_r < f_values[n] {
            // outside contraction
            let x_c = along(psi * rho);
            let f_c = eval(&x_c);
            nfev += 1;
            if f_c <= f_r {
                simplex[n] = x_c;
                f_values[n] = f_c;
            } else {
                shrink = true;
            }
        } else {
            // inside contraction
            let x_cc = along(-psi);
            let f_cc = eval(&x_cc);
            nfev += 1;
            if f_cc < f_values[n] {
                simplex[n] = x_cc;
                f_values[n] = f_cc;
            } else {
                shrink = true;
            }
        }

        if shrink {
            let best = simplex[0].clone();
            for i in 1..=n {
                for (x, b) in simplex[i].iter_mut().zip(best.iter()) {
                    *x = b + sigma * (*x - b);
                }
                f_values[i] = eval(&simplex[i]);
                nfev += 1;
            }
        }

        sort_simplex(&mut simplex, &mut f_values);
        iterations += 1;
    }

    let converged = nfev < max_fev && iterations < max_iter;
    Ok(SimplexResult {
        x: simplex[0].clone(),
        fun: f_values[0],
        iterations,
        nfev,
        converged,
    })
}

/// Orders the vertices by ascending function value.
fn sort_simplex(simplex: &mut Vec<Vec<f64>>, f_values: &mut Vec<f64>) {
    let mut indices: Vec<usize> = (0..f_values.len()).collect();
    indices.sort_by(|&a, &b| f_values[a].total_cmp(&f_values[b]));
    *simplex = indices.iter().map(|&i| simplex[i].clone()).collect();
    *f_values = indices.iter().map(|&i| f_values[i]).collect();
}
