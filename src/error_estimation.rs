//! Functionality for error estimation on cut domains.
//!
//! Errors are integrated with the cut rules of a [`CutDomain`], so a set mesh deformation is
//! honored: the exact solution is evaluated at the deformed quadrature points, while the
//! finite element function is evaluated through the (undeformed) reference element.
use crate::cut_quadrature::{CutDomain, IntegrationPoint, LevelSetDomain};
use crate::error::CutFemError;
use crate::mask::ElementSet;
use crate::space::{LagrangeSpace, PerSubdomain, SpaceTimeSpace, Subdomain, TwoDomainSpace};
use crate::Real;
use nalgebra::{DVector, Point2};

fn check_coefficients(expected: usize, actual: usize) -> Result<(), CutFemError> {
    if expected == actual {
        Ok(())
    } else {
        Err(CutFemError::configuration(format!(
            "coefficient vector has length {}, expected {}",
            actual, expected
        )))
    }
}

/// The region with a quadrature strength sufficient for squared errors of order-`k` functions,
/// unless the region already specifies one.
fn error_region(region: &LevelSetDomain, space_order: usize, time_order: usize) -> LevelSetDomain {
    let mut region = *region;
    region.order = region.order.or(Some(2 * space_order + 2));
    region.time_order = region.time_order.or(Some(2 * time_order + 2));
    region
}

/// Estimates the squared error `|u_h - u|^2` over a region of a cut domain.
#[allow(non_snake_case)]
pub fn estimate_L2_error_squared<T, F>(
    domain: &CutDomain<'_, T>,
    space: &LagrangeSpace,
    u_h: &DVector<T>,
    region: &LevelSetDomain,
    subset: Option<&ElementSet>,
    u: F,
) -> Result<T, CutFemError>
where
    T: Real,
    F: Fn(&Point2<T>) -> T + Sync,
{
    space.check_mesh(domain.mesh())?;
    check_coefficients(space.num_dofs(), u_h.len())?;
    let region = error_region(region, space.order(), 0);
    domain.integrate(&region, subset, |point| {
        let error = space.evaluate(u_h, point.element, &point.barycentric) - u(&point.point);
        error * error
    })
}

/// Estimates the error `|u_h - u|` in the L2 norm over a region of a cut domain.
#[allow(non_snake_case)]
pub fn estimate_L2_error<T, F>(
    domain: &CutDomain<'_, T>,
    space: &LagrangeSpace,
    u_h: &DVector<T>,
    region: &LevelSetDomain,
    subset: Option<&ElementSet>,
    u: F,
) -> Result<T, CutFemError>
where
    T: Real,
    F: Fn(&Point2<T>) -> T + Sync,
{
    estimate_L2_error_squared(domain, space, u_h, region, subset, u).map(|e| e.sqrt())
}

/// L2 error of a function on a two-domain product space: every component is compared to
/// its own exact solution on its own subdomain.
#[allow(non_snake_case)]
pub fn estimate_two_domain_L2_error<T, F>(
    domain: &CutDomain<'_, T>,
    space: &TwoDomainSpace,
    u_h: &DVector<T>,
    u: &PerSubdomain<F>,
) -> Result<T, CutFemError>
where
    T: Real,
    F: Fn(&Point2<T>) -> T + Sync,
{
    check_coefficients(space.num_dofs(), u_h.len())?;
    let mut squared = T::zero();
    for subdomain in [Subdomain::Neg, Subdomain::Pos] {
        let component = space.component(u_h, subdomain);
        let region = LevelSetDomain::new(subdomain.into());
        squared +=
            estimate_L2_error_squared(domain, space.component_space(), &component, &region, None, &u[subdomain])?;
    }
    Ok(squared.sqrt())
}

/// Evaluates a space-time finite element function at a quadrature point of a space-time
/// rule.
fn evaluate_space_time<T: Real>(
    space: &SpaceTimeSpace,
    u_h: &DVector<T>,
    point: &IntegrationPoint<T>,
    phi: &mut [T],
    psi: &mut [T],
) -> T {
    let spatial = space.spatial();
    spatial.element().populate_basis(phi, &point.barycentric);
    space
        .time_basis()
        .populate_basis(psi, point.time.unwrap_or_else(T::zero));
    let dofs = spatial.element_dofs(point.element);
    let mut value = T::zero();
    for (m, &psi_m) in psi.iter().enumerate() {
        for (&dof, &phi_i) in dofs.iter().zip(phi.iter()) {
            value += u_h[space.global_dof(dof, m)] * phi_i * psi_m;
        }
    }
    value
}

/// Estimates the space-time error `(int_slab |u_h - u|^2 dx dt)^(1/2)` over a region of a
/// space-time domain. The exact solution receives physical time.
#[allow(non_snake_case)]
pub fn estimate_space_time_L2_error<T, F>(
    domain: &CutDomain<'_, T>,
    space: &SpaceTimeSpace,
    u_h: &DVector<T>,
    region: &LevelSetDomain,
    u: F,
) -> Result<T, CutFemError>
where
    T: Real,
    F: Fn(&Point2<T>, T) -> T + Sync,
{
    let slab = domain
        .time_slab()
        .ok_or_else(|| CutFemError::configuration("space-time errors require a space-time domain"))?;
    space.spatial().check_mesh(domain.mesh())?;
    check_coefficients(space.num_dofs(), u_h.len())?;
    let region = error_region(region, space.spatial().order(), space.time_basis().order());
    let num_time_nodes = space.time_basis().num_nodes();
    let num_spatial_nodes = space.spatial().dofs_per_element();
    let squared = domain.integrate(&region, None, |point| {
        let mut phi = vec![T::zero(); num_spatial_nodes];
        let mut psi = vec![T::zero(); num_time_nodes];
        let t = slab.physical_time(point.time.unwrap_or_else(T::zero));
        let error = evaluate_space_time(space, u_h, point, &mut phi, &mut psi) - u(&point.point, t);
        error * error
    })?;
    Ok(squared.sqrt())
}
