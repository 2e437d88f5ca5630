//! Uniform (red) refinement of triangle meshes.
use crate::connectivity::Tri3d2Connectivity;
use crate::error::CutFemError;
use crate::mesh::TriangleMesh2d;
use crate::Real;
use nalgebra::{center, Point2};

/// Splits every triangle into four by connecting its edge midpoints.
///
/// Vertices of the input mesh keep their indices; the midpoint of facet `f` becomes vertex
/// `num_vertices + f`. Children are ordered `[v0, m0, m2], [m0, v1, m1], [m2, m1, v2],
/// [m0, m1, m2]`, where `m_i` is the midpoint of local edge `i`, so every child is again
/// counter-clockwise.
pub fn refine_uniformly<T: Real>(mesh: &TriangleMesh2d<T>) -> Result<TriangleMesh2d<T>, CutFemError> {
    let num_old_vertices = mesh.num_vertices();
    let mut vertices: Vec<Point2<T>> = Vec::with_capacity(num_old_vertices + mesh.num_facets());
    vertices.extend_from_slice(mesh.vertices());
    vertices.extend(mesh.facets().iter().map(|facet| {
        let [a, b] = facet.vertices().0;
        center(&mesh.vertices()[a], &mesh.vertices()[b])
    }));

    let mut connectivity = Vec::with_capacity(4 * mesh.num_elements());
    for (element_index, conn) in mesh.connectivity().iter().enumerate() {
        let [v0, v1, v2] = conn.0;
        let [m0, m1, m2] = mesh
            .element_facets(element_index)
            .map(|facet_index| num_old_vertices + facet_index);
        connectivity.push(Tri3d2Connectivity([v0, m0, m2]));
        connectivity.push(Tri3d2Connectivity([m0, v1, m1]));
        connectivity.push(Tri3d2Connectivity([m2, m1, v2]));
        connectivity.push(Tri3d2Connectivity([m0, m1, m2]));
    }

    TriangleMesh2d::from_vertices_and_connectivity(vertices, connectivity)
}
