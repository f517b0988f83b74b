//! Mapping between box-bounded variables and the unconstrained space searched by the simplex.

use crate::error::{ExtractionError, ExtractionResult};
use std::f64::consts::PI;

/// Which bounds of a variable are finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundClass {
    Unbounded,
    LowerOnly,
    UpperOnly,
    Both,
    /// `lower == upper`, the variable is not searched.
    Fixed,
}

/// One variable with its bounds and the transform derived from them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedVariable {
    pub lower: f64,
    pub upper: f64,
    pub class: BoundClass,
}

impl BoundedVariable {
    /// Classifies a pair of bounds. Use `f64::NEG_INFINITY` / `f64::INFINITY` for a missing bound.
    pub fn new(lower: f64, upper: f64) -> ExtractionResult<Self> {
        if lower.is_nan() || upper.is_nan() {
            return Err(ExtractionError::Configuration(format!(
                "bounds [{lower}, {upper}] contain NaN"
            )));
        }
        if lower > upper {
            return Err(ExtractionError::Configuration(format!(
                "lower bound {lower} is above upper bound {upper}"
            )));
        }
        let class = match (lower.is_finite(), upper.is_finite()) {
            (false, false) => BoundClass::Unbounded,
            (true, false) => BoundClass::LowerOnly,
            (false, true) => BoundClass::UpperOnly,
            (true, true) if lower == upper => BoundClass::Fixed,
            (true, true) => BoundClass::Both,
        };
        Ok(BoundedVariable {
            lower,
            upper,
            class,
        })
    }

    /// Maps a physical value to the unconstrained coordinate.
    ///
    /// A fixed variable has no coordinate; its lower bound is returned.
    pub fn forward(&self, x: f64) -> f64 {
        let (l, u) = (self.lower, self.upper);
        match self.class {
            BoundClass::Unbounded => x,
            BoundClass::LowerOnly => (x - l).max(0.0).sqrt(),
            BoundClass::UpperOnly => (u - x).max(0.0).sqrt(),
            BoundClass::Both => {
                let scaled = (2.0 * (x - l) / (u - l) - 1.0).clamp(-1.0, 1.0);
                2.0 * PI + scaled.asin()
            }
            BoundClass::Fixed => l,
        }
    }

    /// Maps an unconstrained coordinate back into `[lower, upper]`.
    pub fn inverse(&self, u_coord: f64) -> f64 {
        let (l, u) = (self.lower, self.upper);
        match self.class {
            BoundClass::Unbounded => u_coord,
            BoundClass::LowerOnly => l + u_coord * u_coord,
            BoundClass::UpperOnly => u - u_coord * u_coord,
            BoundClass::Both => (((u_coord.sin() + 1.0) / 2.0) * (u - l) + l).clamp(l, u),
            BoundClass::Fixed => l,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.class == BoundClass::Fixed
    }
}

/// Transform of a whole parameter vector. Fixed variables are dropped from the search vector.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundTransform {
    variables: Vec<BoundedVariable>,
}

impl BoundTransform {
    /// Builds the transform for `lower[i] <= x[i] <= upper[i]`.
    pub fn new(lower: &[f64], upper: &[f64]) -> ExtractionResult<Self> {
        if lower.len() != upper.len() {
            return Err(ExtractionError::Configuration(format!(
                "{} lower bounds but {} upper bounds",
                lower.len(),
                upper.len()
            )));
        }
        let variables = lower
            .iter()
            .zip(upper.iter())
            .map(|(&l, &u)| BoundedVariable::new(l, u))
            .collect::<ExtractionResult<Vec<_>>>()?;
        Ok(BoundTransform { variables })
    }

    pub fn variables(&self) -> &[BoundedVariable] {
        &self.variables
    }

    /// Dimension of the physical vector.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Dimension of the unconstrained search vector.
    pub fn free_len(&self) -> usize {
        self.variables.iter().filter(|v| !v.is_fixed()).count()
    }

    /// Physical vector to search vector, skipping fixed variables.
    pub fn forward(&self, x: &[f64]) -> Vec<f64> {
        self.variables
            .iter()
            .zip(x.iter())
            .filter(|(v, _)| !v.is_fixed())
            .map(|(v, &xi)| v.forward(xi))
            .collect()
    }

    /// Search vector to physical vector, filling fixed variables with their bound.
    pub fn inverse(&self, u: &[f64]) -> Vec<f64> {
        let mut free = u.iter();
        self.variables
            .iter()
            .map(|v| {
                if v.is_fixed() {
                    v.lower
                } else {
                    v.inverse(free.next().copied().unwrap_or(0.0))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_classification() {
        let inf = f64::INFINITY;
        assert_eq!(
            BoundedVariable::new(-inf, inf).unwrap().class,
            BoundClass::Unbounded
        );
        assert_eq!(
            BoundedVariable::new(0.0, inf).unwrap().class,
            BoundClass::LowerOnly
        );
        assert_eq!(
            BoundedVariable::new(-inf, 0.0).unwrap().class,
            BoundClass::UpperOnly
        );
        assert_eq!(
            BoundedVariable::new(-1.0, 1.0).unwrap().class,
            BoundClass::Both
        );
        assert_eq!(
            BoundedVariable::new(2.0, 2.0).unwrap().class,
            BoundClass::Fixed
        );
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(matches!(
            BoundedVariable::new(1.0, 0.0),
            Err(ExtractionError::Configuration(_))
        ));
        assert!(BoundedVariable::new(f64::NAN, 0.0).is_err());
        assert!(BoundTransform::new(&[0.0, 1.0], &[1.0]).is_err());
    }

    #[test]
    fn test_round_trip_inside_bounds() {
        let inf = f64::INFINITY;
        let cases = [
            (-inf, inf, -3.7),
            (1.5, inf, 4.2),
            (-inf, 1.5, -0.3),
            (1.0, 3.0, 2.7),
            (1.0, 3.0, 1.01),
            (-2.0, -1.0, -1.5),
        ];
        for (l, u, x) in cases {
            let var = BoundedVariable::new(l, u).unwrap();
            assert_relative_eq!(var.inverse(var.forward(x)), x, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_double_bound_mapping_matches_reference_form() {
        let var = BoundedVariable::new(1.0, 3.0).unwrap();
        // center of the box maps to 2π
        assert_relative_eq!(var.forward(2.0), 2.0 * PI);
        assert_relative_eq!(var.forward(3.0), 2.0 * PI + PI / 2.0);
        // out of range inputs are clipped
        assert_relative_eq!(var.forward(10.0), 2.0 * PI + PI / 2.0);
    }

    #[test]
    fn test_inverse_stays_in_bounds() {
        let both = BoundedVariable::new(-0.5, 0.5).unwrap();
        let lower = BoundedVariable::new(2.0, f64::INFINITY).unwrap();
        let upper = BoundedVariable::new(f64::NEG_INFINITY, 2.0).unwrap();
        for k in -200..200 {
            let u = k as f64 * 0.173;
            let x = both.inverse(u);
            assert!((-0.5..=0.5).contains(&x));
            assert!(lower.inverse(u) >= 2.0);
            assert!(upper.inverse(u) <= 2.0);
        }
    }

    #[test]
    fn test_fixed_variable_always_maps_to_lower_bound() {
        let fixed = BoundedVariable::new(0.7, 0.7).unwrap();
        for input in [-10.0, 0.0, 0.7, 3.3] {
            assert_eq!(fixed.forward(input), 0.7);
            assert_eq!(fixed.inverse(input), 0.7);
        }

        let transform = BoundTransform::new(&[0.0, 0.7, 1.0], &[1.0, 0.7, f64::INFINITY]).unwrap();
        assert_eq!(transform.free_len(), 2);
        let u = transform.forward(&[0.25, 5.0, 3.0]);
        assert_eq!(u.len(), 2);
        let x = transform.inverse(&u);
        assert_relative_eq!(x[0], 0.25, epsilon = 1e-12);
        assert_eq!(x[1], 0.7);
        assert_relative_eq!(x[2], 3.0, epsilon = 1e-12);
    }
}
