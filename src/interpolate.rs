//! Nodal interpolation of functions into finite element spaces.
//!
//! Interpolation always acts on the undeformed background geometry.
use crate::error::CutFemError;
use crate::levelset::TimeSlab;
use crate::mesh::TriangleMesh2d;
use crate::space::{LagrangeSpace, PerSubdomain, SpaceTimeSpace, Subdomain, TwoDomainSpace};
use crate::util::convert_scalar;
use crate::Real;
use nalgebra::{DVector, Point2};

/// Interpolates `f` at the nodes of a Lagrange space.
pub fn interpolate<T, F>(space: &LagrangeSpace, mesh: &TriangleMesh2d<T>, f: F) -> Result<DVector<T>, CutFemError>
where
    T: Real,
    F: Fn(&Point2<T>) -> T,
{
    let nodes = space.node_positions(mesh)?;
    Ok(DVector::from_iterator(nodes.len(), nodes.iter().map(f)))
}

/// Interpolates one function per subdomain into the components of a product space.
pub fn interpolate_components<T, F>(
    space: &TwoDomainSpace,
    mesh: &TriangleMesh2d<T>,
    functions: &PerSubdomain<F>,
) -> Result<DVector<T>, CutFemError>
where
    T: Real,
    F: Fn(&Point2<T>) -> T,
{
    let component_space = space.component_space();
    let mut coefficients = DVector::zeros(space.num_dofs());
    for subdomain in [Subdomain::Neg, Subdomain::Pos] {
        let values = interpolate(component_space, mesh, &functions[subdomain])?;
        coefficients
            .rows_mut(space.component_offset(subdomain), component_space.num_dofs())
            .copy_from(&values);
    }
    Ok(coefficients)
}

/// Interpolates `f(x, t)` at the space-time nodes of a slab, with `t` the physical time of
/// each temporal node.
pub fn interpolate_space_time<T, F>(
    space: &SpaceTimeSpace,
    mesh: &TriangleMesh2d<T>,
    slab: &TimeSlab<T>,
    f: F,
) -> Result<DVector<T>, CutFemError>
where
    T: Real,
    F: Fn(&Point2<T>, T) -> T,
{
    let nodes = space.spatial().node_positions(mesh)?;
    let mut coefficients = DVector::zeros(space.num_dofs());
    for (m, &t_ref) in space.time_basis().nodes().iter().enumerate() {
        let t = slab.physical_time(convert_scalar(t_ref));
        for (i, x) in nodes.iter().enumerate() {
            coefficients[space.global_dof(i, m)] = f(x, t);
        }
    }
    Ok(coefficients)
}

/// Space-time coefficients that are constant in time, equal to the spatial coefficients.
pub fn extend_constant_in_time<T: Real>(
    space: &SpaceTimeSpace,
    spatial: &DVector<T>,
) -> Result<DVector<T>, CutFemError> {
    let n = space.spatial().num_dofs();
    if spatial.len() != n {
        return Err(CutFemError::configuration(format!(
            "spatial coefficient vector has length {}, expected {}",
            spatial.len(),
            n
        )));
    }
    let mut coefficients = DVector::zeros(space.num_dofs());
    for m in 0..space.time_basis().num_nodes() {
        coefficients.rows_mut(m * n, n).copy_from(spatial);
    }
    Ok(coefficients)
}
