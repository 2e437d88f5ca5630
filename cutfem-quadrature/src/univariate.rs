//! Quadrature rules for the one-dimensional domain `[-1, 1]`.

use crate::{check_strength, Error, Rule};
use std::f64::consts::PI;

/// Legendre polynomial `p_n` and its predecessor `p_{n-1}` evaluated at a point.
///
/// The derivative formula is singular at `|x| == 1`, so this is only suitable in the open
/// interval `(-1, 1)`, which is where all Gauss nodes lie.
#[derive(Debug, Default, Clone, Copy)]
struct Legendre {
    n: usize,
    x: f64,
    p_n: f64,
    p_n_minus_1: f64,
}

impl Legendre {
    fn evaluate(n: usize, x: f64) -> Self {
        // m P_m(x) = (2m - 1) x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
        let mut p_n = 1.0;
        let mut p_n_minus_1 = 0.0;
        for m in 1..=n {
            let m = m as f64;
            let p_n_minus_2 = p_n_minus_1;
            p_n_minus_1 = p_n;
            p_n = ((2.0 * m - 1.0) * x * p_n_minus_1 - (m - 1.0) * p_n_minus_2) / m;
        }
        Self {
            n,
            x,
            p_n,
            p_n_minus_1,
        }
    }

    fn value(&self) -> f64 {
        self.p_n
    }

    fn derivative(&self) -> f64 {
        // p_n'(x) = n (x p_n(x) - p_{n - 1}(x)) / (x^2 - 1)
        let n = self.n as f64;
        n * (self.x * self.p_n - self.p_n_minus_1) / (self.x * self.x - 1.0)
    }
}

/// Gauss–Legendre quadrature for the reference interval `[-1, 1]`.
///
/// Given `n` points, the rule integrates polynomials of degree up to `2n - 1` exactly.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss(num_points: usize) -> Rule<1> {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    let mut points = vec![[0.0]; n];
    let mut weights = vec![0.0; n];

    // Roots are symmetric about the origin, so only the first half is computed
    for i in 0..(n + 1) / 2 {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut legendre = Legendre::evaluate(n, x);
        // Quadratic convergence from the Chebyshev-like initial guess takes a handful of
        // iterations; the cap only guards against pathological round-off cycling.
        for _ in 0..100 {
            let dx = -legendre.value() / legendre.derivative();
            x += dx;
            legendre = Legendre::evaluate(n, x);
            if dx.abs() <= 1e-15 {
                break;
            }
        }

        let dp = legendre.derivative();
        let w = 2.0 / ((1.0 - x * x) * dp * dp);

        // Roots are produced in decreasing order, so fill from both ends to get ascending points
        points[n - 1 - i] = [x];
        weights[n - 1 - i] = w;
        points[i] = [-x];
        weights[i] = w;
    }

    (weights, points)
}

/// The Gauss–Legendre rule with the fewest points that integrates polynomials of degree
/// `strength` exactly.
pub fn gauss_for_strength(strength: usize) -> Result<Rule<1>, Error> {
    check_strength(strength)?;
    Ok(gauss(num_gauss_points_for_strength(strength)))
}

/// Number of Gauss points required for exact integration of polynomials of degree `strength`.
pub fn num_gauss_points_for_strength(strength: usize) -> usize {
    (strength + 2) / 2
}
