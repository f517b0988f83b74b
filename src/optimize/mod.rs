//! Bounded derivative-free minimization.
//!
//! The simplex search itself is unconstrained. Box bounds are enforced by searching in a
//! transformed space (see [`bounds`]) and mapping every trial point back before the objective is
//! evaluated, so the objective only ever sees points inside the box.

pub mod bounds;
pub mod nelder_mead;

use crate::error::{ExtractionError, ExtractionResult};
pub use bounds::{BoundClass, BoundTransform, BoundedVariable};
pub use nelder_mead::{nelder_mead, SimplexOptions, SimplexResult};

/// Result of a bounded minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedMinimum {
    /// Solution in physical coordinates, always inside the bounds.
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub fun: f64,
    /// The simplex search met its tolerances.
    pub success: bool,
    pub iterations: usize,
    pub nfev: usize,
}

/// Minimizes `f` subject to `lower <= x <= upper`.
///
/// # Arguments
/// - `f`: Objective in physical coordinates.
/// - `x0`: Initial guess, projected into the box by the transform.
/// - `lower`, `upper`: Bounds per variable, infinite for a missing bound.
/// - `options`: Simplex options.
///
/// # Errors
/// `Configuration` for mismatched lengths, `lower > upper` or a non-finite guess. A search that
/// does not converge is not an error; it is reported through `success`.
pub fn minimize_bounded<F>(
    f: F,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    options: &SimplexOptions,
) -> ExtractionResult<BoundedMinimum>
where
    F: Fn(&[f64]) -> f64,
{
    if x0.len() != lower.len() {
        return Err(ExtractionError::Configuration(format!(
            "initial guess has {} entries but {} bounds were given",
            x0.len(),
            lower.len()
        )));
    }
    if x0.iter().any(|x| !x.is_finite()) {
        return Err(ExtractionError::Configuration(format!(
            "initial guess {x0:?} is not finite"
        )));
    }
    let transform = BoundTransform::new(lower, upper)?;

    if transform.free_len() == 0 {
        // every variable is fixed, nothing to search
        let x = transform.inverse(&[]);
        let fun = f(&x);
        return Ok(BoundedMinimum {
            x,
            fun,
            success: true,
            iterations: 0,
            nfev: 1,
        });
    }

    let u0 = transform.forward(x0);
    let wrapped = |u: &[f64]| f(&transform.inverse(u));
    let result = nelder_mead(wrapped, &u0, options)?;

    let x = transform.inverse(&result.x);
    Ok(BoundedMinimum {
        x,
        fun: result.fun,
        success: result.converged,
        iterations: result.iterations,
        nfev: result.nfev,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bowl(x: &[f64]) -> f64 {
        (x[0] - 3.0).powi(2) + (x[1] + 1.0).powi(2)
    }

    #[test]
    fn test_interior_minimum_is_found() {
        let result = minimize_bounded(
            bowl,
            &[2.5, -0.5],
            &[2.0, -2.0],
            &[4.0, 0.0],
            &SimplexOptions::default(),
        )
        .unwrap();
        assert!(result.success);
        assert_relative_eq!(result.x[0], 3.0, epsilon = 1e-2);
        assert_relative_eq!(result.x[1], -1.0, epsilon = 1e-2);
    }

    #[test]
    fn test_minimum_outside_box_lands_on_bound() {
        let result = minimize_bounded(
            bowl,
            &[1.0, 0.5],
            &[0.0, 0.0],
            &[2.0, 1.0],
            &SimplexOptions::default(),
        )
        .unwrap();
        assert!(result.x[0] <= 2.0 && result.x[0] >= 0.0);
        assert!(result.x[1] <= 1.0 && result.x[1] >= 0.0);
        assert_relative_eq!(result.x[0], 2.0, epsilon = 1e-2);
        assert_relative_eq!(result.x[1], 0.0, epsilon = 1e-2);
    }

    #[test]
    fn test_one_sided_and_fixed_bounds() {
        let result = minimize_bounded(
            bowl,
            &[5.0, -1.0],
            &[4.0, -1.0],
            &[f64::INFINITY, -1.0],
            &SimplexOptions::default(),
        )
        .unwrap();
        assert_relative_eq!(result.x[0], 4.0, epsilon = 1e-2);
        assert_eq!(result.x[1], -1.0);

        let all_fixed =
            minimize_bounded(bowl, &[3.0, 0.0], &[3.0, 0.0], &[3.0, 0.0], &SimplexOptions::default())
                .unwrap();
        assert_eq!(all_fixed.x, vec![3.0, 0.0]);
        assert_relative_eq!(all_fixed.fun, 1.0);
    }

    #[test]
    fn test_configuration_errors() {
        let options = SimplexOptions::default();
        assert!(matches!(
            minimize_bounded(bowl, &[0.0, 0.0], &[1.0, 0.0], &[0.0, 1.0], &options),
            Err(ExtractionError::Configuration(_))
        ));
        assert!(minimize_bounded(bowl, &[0.0], &[0.0, 0.0], &[1.0, 1.0], &options).is_err());
        assert!(minimize_bounded(bowl, &[f64::NAN, 0.0], &[0.0, 0.0], &[1.0, 1.0], &options).is_err());
    }
}
