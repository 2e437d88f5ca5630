//! Proptest strategies for meshes, triangles and level sets.
use crate::levelset::Circle;
use crate::mesh::procedural::create_rectangular_uniform_tri_mesh_2d;
use crate::mesh::TriangleMesh2d;
use crate::util::doubled_signed_area;
use ::proptest::prelude::*;
use nalgebra::Point2;
use std::cmp::max;

pub fn point2() -> impl Strategy<Value = Point2<f64>> {
    // Pick a reasonably small range, so that areas and level-set values stay well scaled
    let range = -10.0..10.0;
    [range.clone(), range].prop_map(|[x, y]| Point2::new(x, y))
}

/// Counter-clockwise triangles whose area is not vanishingly small relative to their size.
pub fn nondegenerate_triangle() -> impl Strategy<Value = [Point2<f64>; 3]> {
    [point2(), point2(), point2()]
        .prop_map(|[a, b, c]| {
            if doubled_signed_area(&a, &b, &c) < 0.0 {
                [a, c, b]
            } else {
                [a, b, c]
            }
        })
        .prop_filter("Triangle must not be degenerate", |[a, b, c]| {
            let diameter = (b - a).norm().max((c - b).norm()).max((a - c).norm());
            doubled_signed_area(a, b, c) > 1e-2 * diameter * diameter
        })
}

/// Level-set values at the three vertices of a triangle. Exact zeros are generated
/// frequently, since they exercise the tie-break.
pub fn vertex_levelset_values() -> impl Strategy<Value = [f64; 3]> {
    let value = prop_oneof![1 => Just(0.0), 4 => -1.0..1.0];
    [value.clone(), value.clone(), value]
}

/// Uniform triangle meshes of the unit square with at most `max_cells` cells per dimension.
pub fn uniform_unit_square_mesh(max_cells: usize) -> impl Strategy<Value = TriangleMesh2d<f64>> {
    (1..=max(1, max_cells), 1..=max(1, max_cells)).prop_filter_map("Mesh construction failed", |(nx, ny)| {
        create_rectangular_uniform_tri_mesh_2d(&Point2::new(0.0, 0.0), &Point2::new(1.0, 1.0), nx, ny).ok()
    })
}

/// Circles with centers and radii chosen so that they usually intersect the unit square.
pub fn circle() -> impl Strategy<Value = Circle<f64>> {
    ([0.0..1.0, 0.0..1.0], 0.05..0.6).prop_map(|([x, y], radius)| Circle {
        center: Point2::new(x, y),
        radius,
    })
}
