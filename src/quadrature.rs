//! Quadrature rules converted to the scalar type of the crate and mapped onto physical
//! simplices.
use crate::error::CutFemError;
use crate::util::convert_scalar;
use crate::Real;
use cutfem_quadrature::simplex::triangle;
use cutfem_quadrature::univariate::gauss_for_strength;
use nalgebra::Point2;

/// Quadrature rules for one combination of spatial and temporal integration order.
///
/// The triangle rule is stored in barycentric coordinates with weights summing to one, and
/// the interval rules live on `[0, 1]` with weights summing to one, so that mapping onto a
/// physical simplex only requires scaling by its measure. Building the table once per
/// assembly avoids recomputing Gauss nodes for every cut element.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureTable<T: Real> {
    spatial_order: usize,
    time_order: usize,
    triangle_weights: Vec<T>,
    triangle_points: Vec<[T; 3]>,
    segment_weights: Vec<T>,
    segment_points: Vec<T>,
    time_weights: Vec<T>,
    time_points: Vec<T>,
}

impl<T: Real> QuadratureTable<T> {
    pub fn new(spatial_order: usize, time_order: usize) -> Result<Self, CutFemError> {
        let (weights, points) = triangle(spatial_order)?;
        // The reference triangle (-1,-1), (1,-1), (-1,1) has area 2
        let triangle_weights = weights.iter().map(|&w| convert_scalar(0.5 * w)).collect();
        let triangle_points = points
            .iter()
            .map(|&[x, y]| {
                let l1 = 0.5 * (x + 1.0);
                let l2 = 0.5 * (y + 1.0);
                [1.0 - l1 - l2, l1, l2].map(convert_scalar)
            })
            .collect();

        let (segment_weights, segment_points) = unit_interval_rule(spatial_order)?;
        let (time_weights, time_points) = unit_interval_rule(time_order)?;

        Ok(Self {
            spatial_order,
            time_order,
            triangle_weights,
            triangle_points,
            segment_weights,
            segment_points,
            time_weights,
            time_points,
        })
    }

    pub fn spatial_order(&self) -> usize {
        self.spatial_order
    }

    pub fn time_order(&self) -> usize {
        self.time_order
    }

    /// Triangle rule as (weights summing to one, barycentric points).
    pub fn triangle_rule(&self) -> (&[T], &[[T; 3]]) {
        (&self.triangle_weights, &self.triangle_points)
    }

    /// Rule on `[0, 1]` of the spatial order, for interface segments.
    pub fn segment_rule(&self) -> (&[T], &[T]) {
        (&self.segment_weights, &self.segment_points)
    }

    /// Rule on `[0, 1]` of the temporal order.
    pub fn time_rule(&self) -> (&[T], &[T]) {
        (&self.time_weights, &self.time_points)
    }

    /// Calls `f(point, weight)` for the triangle rule mapped onto a physical triangle.
    pub fn for_each_triangle_point(&self, vertices: &[Point2<T>; 3], area: T, mut f: impl FnMut(Point2<T>, T)) {
        let [x0, x1, x2] = vertices;
        for (&w, lambda) in self.triangle_weights.iter().zip(&self.triangle_points) {
            let x = Point2::from(x0.coords * lambda[0] + x1.coords * lambda[1] + x2.coords * lambda[2]);
            f(x, w * area);
        }
    }

    /// Calls `f(point, weight)` for the segment rule mapped onto the segment `[a, b]`.
    pub fn for_each_segment_point(&self, a: &Point2<T>, b: &Point2<T>, mut f: impl FnMut(Point2<T>, T)) {
        let d = b - a;
        let length = d.norm();
        for (&w, &s) in self.segment_weights.iter().zip(&self.segment_points) {
            f(a + d * s, w * length);
        }
    }
}

fn unit_interval_rule<T: Real>(order: usize) -> Result<(Vec<T>, Vec<T>), CutFemError> {
    let (weights, points) = gauss_for_strength(order)?;
    Ok(weights
        .iter()
        .zip(&points)
        .map(|(&w, &[x])| (convert_scalar::<T>(0.5 * w), convert_scalar::<T>(0.5 * (x + 1.0))))
        .unzip())
}
