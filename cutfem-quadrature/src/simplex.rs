//! Rules on the reference triangle `(-1, -1), (1, -1), (-1, 1)`.
//!
//! Rules are obtained by collapsing the reference square onto the triangle (the Duffy
//! transformation)
//!
//! ```text
//! x = (1 + u)(1 - v) / 2 - 1,    y = v,
//! ```
//!
//! whose Jacobian determinant is `(1 - v) / 2`. A polynomial of total degree `q` in `(x, y)`
//! becomes a polynomial of degree `q` in `u` and at most `q + 1` in `v` once multiplied by the
//! Jacobian, so Gauss rules of the corresponding sizes yield exact rules of arbitrary strength.
//! These rules are not minimal, but they have positive weights and all points strictly
//! inside the triangle.

use crate::tensor::square_gauss;
use crate::univariate::num_gauss_points_for_strength;
use crate::{check_strength, Error, Rule};

/// A rule of the given strength for the reference triangle.
pub fn triangle(strength: usize) -> Result<Rule<2>, Error> {
    check_strength(strength)?;
    let nu = num_gauss_points_for_strength(strength);
    let nv = num_gauss_points_for_strength(strength + 1);
    let (square_weights, square_points) = square_gauss(nu, nv);

    let (weights, points) = square_weights
        .into_iter()
        .zip(square_points)
        .map(|(w, [u, v])| {
            let x = 0.5 * (1.0 + u) * (1.0 - v) - 1.0;
            (w * 0.5 * (1.0 - v), [x, v])
        })
        .unzip();

    Ok((weights, points))
}
