//! Reference elements: Lagrange triangles of arbitrary order and Lagrange bases in time.
use crate::error::CutFemError;
use crate::util::{convert_scalar, doubled_signed_area};
use crate::Real;
use nalgebra::{Matrix2, Point2, Vector2};
use numeric_literals::replace_float_literals;

/// The largest supported polynomial order for spatial and temporal bases.
pub const MAX_ORDER: usize = 8;

/// A straight-sided triangle given by its three vertices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTriangle<T: Real> {
    vertices: [Point2<T>; 3],
}

impl<T: Real> AffineTriangle<T> {
    pub fn from_vertices(vertices: [Point2<T>; 3]) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[Point2<T>; 3] {
        &self.vertices
    }

    /// Jacobian of the map `(l1, l2) -> x0 + l1 (x1 - x0) + l2 (x2 - x0)`.
    pub fn jacobian(&self) -> Matrix2<T> {
        let [x0, x1, x2] = &self.vertices;
        Matrix2::from_columns(&[x1 - x0, x2 - x0])
    }

    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn area(&self) -> T {
        let [a, b, c] = &self.vertices;
        0.5 * doubled_signed_area(a, b, c).abs()
    }

    /// Length of the longest edge.
    pub fn diameter(&self) -> T {
        let [a, b, c] = &self.vertices;
        (b - a).norm().max((c - b).norm()).max((a - c).norm())
    }

    /// Barycentric coordinates of an arbitrary point.
    ///
    /// Points outside the triangle yield coordinates outside `[0, 1]`, which is exactly what
    /// is needed to extend element polynomials to neighboring elements.
    pub fn barycentric(&self, x: &Point2<T>) -> [T; 3] {
        let [_, l1, l2] = self.barycentric_gradients();
        let d = x - self.vertices[0];
        let lambda1 = l1.dot(&d);
        let lambda2 = l2.dot(&d);
        [T::one() - lambda1 - lambda2, lambda1, lambda2]
    }

    /// Gradients of the three barycentric coordinate functions (constant on the triangle).
    pub fn barycentric_gradients(&self) -> [Vector2<T>; 3] {
        let j = self.jacobian();
        // The triangle is non-degenerate by mesh construction
        let j_inv_t = j
            .try_inverse()
            .unwrap_or_else(Matrix2::zeros)
            .transpose();
        let g1 = j_inv_t.column(0).into_owned();
        let g2 = j_inv_t.column(1).into_owned();
        [-(g1 + g2), g1, g2]
    }

    pub fn map_barycentric(&self, lambda: &[T; 3]) -> Point2<T> {
        let [x0, x1, x2] = &self.vertices;
        Point2::from(x0.coords * lambda[0] + x1.coords * lambda[1] + x2.coords * lambda[2])
    }
}

/// Value and derivative of the one-dimensional factor
/// `P_n(s) = prod_{m=0}^{n-1} (k s - m) / (m + 1)` used by barycentric Lagrange bases.
fn lagrange_factor<T: Real>(order: usize, n: usize, s: T) -> (T, T) {
    let k: T = convert_scalar(order as f64);
    let mut value = T::one();
    let mut derivative = T::zero();
    for m in 0..n {
        let denominator: T = convert_scalar((m + 1) as f64);
        let factor = (k * s - convert_scalar(m as f64)) / denominator;
        let factor_derivative = k / denominator;
        derivative = derivative * factor + value * factor_derivative;
        value *= factor;
    }
    (value, derivative)
}

/// The Lagrange element of order `k` on triangles, expressed in barycentric coordinates.
///
/// Nodes are indexed by multi-indices `(i, j, l)` with `i + j + l = k`, located at
/// barycentric coordinates `(i, j, l) / k`. They are ordered as
///
/// - the three vertices,
/// - `k - 1` nodes per local edge `e = (a, b)`, ordered from `a` towards `b`,
/// - the interior nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LagrangeTriangle {
    order: usize,
    multi_indices: Vec<[usize; 3]>,
}

impl LagrangeTriangle {
    pub fn new(order: usize) -> Result<Self, CutFemError> {
        if order == 0 || order > MAX_ORDER {
            return Err(CutFemError::configuration(format!(
                "Lagrange triangles of order {order} are not supported (must be in 1..={MAX_ORDER})"
            )));
        }
        let k = order;
        let mut multi_indices = vec![[k, 0, 0], [0, k, 0], [0, 0, k]];
        for edge in 0..3 {
            let (a, b) = (edge, (edge + 1) % 3);
            for m in 1..k {
                let mut alpha = [0; 3];
                alpha[a] = k - m;
                alpha[b] = m;
                multi_indices.push(alpha);
            }
        }
        for i in (1..k).rev() {
            for j in (1..k - i).rev() {
                multi_indices.push([i, j, k - i - j]);
            }
        }
        debug_assert_eq!(multi_indices.len(), (k + 1) * (k + 2) / 2);
        Ok(Self { order, multi_indices })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn num_nodes(&self) -> usize {
        self.multi_indices.len()
    }

    pub fn num_nodes_per_edge(&self) -> usize {
        self.order - 1
    }

    pub fn num_interior_nodes(&self) -> usize {
        self.num_nodes() - 3 - 3 * self.num_nodes_per_edge()
    }

    pub fn node_barycentric<T: Real>(&self, node: usize) -> [T; 3] {
        let k = self.order as f64;
        self.multi_indices[node].map(|alpha| convert_scalar(alpha as f64 / k))
    }

    /// Evaluates all basis functions at the given barycentric coordinates.
    pub fn populate_basis<T: Real>(&self, basis: &mut [T], lambda: &[T; 3]) {
        assert_eq!(basis.len(), self.num_nodes());
        for (phi, alpha) in basis.iter_mut().zip(&self.multi_indices) {
            *phi = (0..3)
                .map(|c| lagrange_factor(self.order, alpha[c], lambda[c]).0)
                .fold(T::one(), |acc, factor| acc * factor);
        }
    }

    /// Evaluates all basis functions and their physical gradients, given the barycentric
    /// coordinates of the evaluation point and the (constant) gradients of the barycentric
    /// coordinate functions.
    pub fn populate_basis_and_gradients<T: Real>(
        &self,
        basis: &mut [T],
        gradients: &mut [Vector2<T>],
        lambda: &[T; 3],
        lambda_gradients: &[Vector2<T>; 3],
    ) {
        assert_eq!(basis.len(), self.num_nodes());
        assert_eq!(gradients.len(), self.num_nodes());
        for (phi, grad, alpha) in itertools::izip!(basis.iter_mut(), gradients.iter_mut(), &self.multi_indices) {
            let factors = [0, 1, 2].map(|c| lagrange_factor(self.order, alpha[c], lambda[c]));
            let (f0, d0) = factors[0];
            let (f1, d1) = factors[1];
            let (f2, d2) = factors[2];
            *phi = f0 * f1 * f2;
            *grad = lambda_gradients[0] * (d0 * f1 * f2)
                + lambda_gradients[1] * (f0 * d1 * f2)
                + lambda_gradients[2] * (f0 * f1 * d2);
        }
    }
}

/// Lagrange basis of order `k_t` on the reference time interval `[0, 1]`.
///
/// For `k_t >= 1` the nodes are equidistant and include both end points, so the first and
/// last basis functions are the traces at the bottom and top of a time slab. The constant
/// basis (`k_t = 0`) has its node at the midpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeLagrangeBasis {
    order: usize,
    nodes: Vec<f64>,
}

impl TimeLagrangeBasis {
    pub fn new(order: usize) -> Result<Self, CutFemError> {
        if order > MAX_ORDER {
            return Err(CutFemError::configuration(format!(
                "time order {order} is not supported (must be at most {MAX_ORDER})"
            )));
        }
        let nodes = if order == 0 {
            vec![0.5]
        } else {
            (0..=order).map(|j| j as f64 / order as f64).collect()
        };
        Ok(Self { order, nodes })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    /// Evaluates all basis functions and their derivatives with respect to reference time.
    pub fn populate_basis_and_derivatives<T: Real>(&self, values: &mut [T], derivatives: &mut [T], t: T) {
        assert_eq!(values.len(), self.num_nodes());
        assert_eq!(derivatives.len(), self.num_nodes());
        let nodes: Vec<T> = self.nodes.iter().map(|&t_j| convert_scalar(t_j)).collect();
        for (j, (value, derivative)) in values.iter_mut().zip(derivatives.iter_mut()).enumerate() {
            let mut v = T::one();
            let mut d = T::zero();
            for (m, &t_m) in nodes.iter().enumerate() {
                if m != j {
                    let denominator = nodes[j] - t_m;
                    d = d * (t - t_m) / denominator + v / denominator;
                    v *= (t - t_m) / denominator;
                }
            }
            *value = v;
            *derivative = d;
        }
    }

    pub fn populate_basis<T: Real>(&self, values: &mut [T], t: T) {
        let mut derivatives = vec![T::zero(); self.num_nodes()];
        self.populate_basis_and_derivatives(values, &mut derivatives, t);
    }
}
