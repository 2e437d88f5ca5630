//! Basic procedural mesh generation routines.
use crate::connectivity::Tri3d2Connectivity;
use crate::error::CutFemError;
use crate::mesh::TriangleMesh2d;
use crate::Real;
use nalgebra::Point2;

/// Generates an axis-aligned rectangular mesh with `cells_x * cells_y` quadrilateral cells,
/// each split into two triangles along the diagonal from its lower-left to its upper-right
/// corner.
pub fn create_rectangular_uniform_tri_mesh_2d<T: Real>(
    min: &Point2<T>,
    max: &Point2<T>,
    cells_x: usize,
    cells_y: usize,
) -> Result<TriangleMesh2d<T>, CutFemError> {
    if cells_x == 0 || cells_y == 0 {
        return Err(CutFemError::configuration("a rectangular mesh needs at least one cell per dimension"));
    }
    if max.x <= min.x || max.y <= min.y {
        return Err(CutFemError::configuration("rectangle bounds are empty"));
    }

    let to_t = |i: usize| T::from_usize(i).expect("Must be able to fit usize in T");
    let mut vertices = Vec::with_capacity((cells_x + 1) * (cells_y + 1));
    for j in 0..=cells_y {
        let s_y = to_t(j) / to_t(cells_y);
        let y = min.y * (T::one() - s_y) + max.y * s_y;
        for i in 0..=cells_x {
            let s_x = to_t(i) / to_t(cells_x);
            let x = min.x * (T::one() - s_x) + max.x * s_x;
            vertices.push(Point2::new(x, y));
        }
    }

    let vertex_index = |i: usize, j: usize| (cells_x + 1) * j + i;
    let mut connectivity = Vec::with_capacity(2 * cells_x * cells_y);
    for j in 0..cells_y {
        for i in 0..cells_x {
            let v00 = vertex_index(i, j);
            let v10 = vertex_index(i + 1, j);
            let v11 = vertex_index(i + 1, j + 1);
            let v01 = vertex_index(i, j + 1);
            connectivity.push(Tri3d2Connectivity([v00, v10, v11]));
            connectivity.push(Tri3d2Connectivity([v00, v11, v01]));
        }
    }

    TriangleMesh2d::from_vertices_and_connectivity(vertices, connectivity)
}

/// Generates a uniform triangle mesh of the square `[-half_width, half_width]^2` whose
/// cells have side length at most `max_cell_size`.
pub fn create_square_tri_mesh_2d<T: Real>(half_width: T, max_cell_size: T) -> Result<TriangleMesh2d<T>, CutFemError> {
    if max_cell_size <= T::zero() || half_width <= T::zero() {
        return Err(CutFemError::configuration("square mesh needs positive size parameters"));
    }
    let two = T::one() + T::one();
    let cells = (two * half_width / max_cell_size)
        .ceil()
        .to_subset()
        .map(|cells: f64| cells.max(1.0) as usize)
        .ok_or_else(|| CutFemError::configuration("number of cells is not representable"))?;
    let max = Point2::new(half_width, half_width);
    create_rectangular_uniform_tri_mesh_2d(&(-max), &max, cells, cells)
}
