//! Rules on the reference square formed as tensor products of Gauss rules.

use crate::univariate::gauss;
use crate::Rule;

/// A tensor-product rule on `[-1, 1]^2` with `nx` points along the first axis and `ny` along
/// the second.
pub fn square_gauss(nx: usize, ny: usize) -> Rule<2> {
    let (wx, px) = gauss(nx);
    let (wy, py) = gauss(ny);
    let mut weights = Vec::with_capacity(nx * ny);
    let mut points = Vec::with_capacity(nx * ny);

    for (&w_i, &[x]) in wx.iter().zip(&px) {
        for (&w_j, &[y]) in wy.iter().zip(&py) {
            weights.push(w_i * w_j);
            points.push([x, y]);
        }
    }

    (weights, points)
}
