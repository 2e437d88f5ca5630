//! Quadrature rules for the reference domains used by `cutfem`.
//!
//! Conventions:
//!
//! - The reference interval is `[-1, 1]`.
//! - The reference square is `[-1, 1]^2`.
//! - The reference triangle has vertices `(-1, -1)`, `(1, -1)` and `(-1, 1)`, so its area is 2.
//!
//! All rules are returned as `(weights, points)` pairs. A rule of *strength* `q` integrates
//! all polynomials of total degree `<= q` exactly (up to round-off).

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod simplex;
pub mod tensor;
pub mod univariate;

/// The largest strength for which rules are generated.
///
/// The Newton iteration for the Gauss nodes is robust far beyond this, but no cut integration
/// needs anything close to it and very large requests usually indicate a configuration error.
pub const MAX_STRENGTH: usize = 64;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that a rule satisfying the given requirements is not available.
    NoRuleAvailable { requested_strength: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleAvailable { requested_strength } => {
                write!(
                    f,
                    "There is no quadrature rule of strength {requested_strength} available \
                     (maximum is {MAX_STRENGTH})"
                )
            }
        }
    }
}

impl std::error::Error for Error {}

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A two-dimensional point.
pub type Point2 = Point<2>;

/// A D-dimensional rule.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// A one-dimensional quadrature rule.
pub type Rule1d = Rule<1>;

/// A two-dimensional quadrature rule.
pub type Rule2d = Rule<2>;

/// Approximates the integral of `f` with the given rule.
pub fn integrate<const D: usize>(rule: &Rule<D>, f: impl Fn(&Point<D>) -> f64) -> f64 {
    let (weights, points) = rule;
    weights.iter().zip(points).map(|(w, x)| w * f(x)).sum()
}

fn check_strength(strength: usize) -> Result<(), Error> {
    if strength > MAX_STRENGTH {
        Err(Error::NoRuleAvailable {
            requested_strength: strength,
        })
    } else {
        Ok(())
    }
}
