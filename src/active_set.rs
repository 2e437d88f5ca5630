//! Degree-of-freedom activity: which dofs touch a given set of elements.
//!
//! Masks are always recomputed from the current classification; they carry no state that
//! could go stale across level-set updates.
use crate::cut_info::{CutInfo, ElementCategory};
use crate::error::CutFemError;
use crate::mask::{DofMask, ElementSet};
use crate::space::{LagrangeSpace, PerSubdomain, SpaceTimeSpace, Subdomain, TwoDomainSpace};
use crate::Real;

fn check_element_set(space: &LagrangeSpace, elements: &ElementSet) -> Result<(), CutFemError> {
    if elements.len() == space.num_elements() {
        Ok(())
    } else {
        Err(CutFemError::configuration(format!(
            "element set has length {}, but the space has {} elements",
            elements.len(),
            space.num_elements()
        )))
    }
}

/// Dofs whose support intersects at least one element of `elements`.
pub fn active_dofs(space: &LagrangeSpace, elements: &ElementSet) -> Result<DofMask, CutFemError> {
    check_element_set(space, elements)?;
    let mut mask = DofMask::new(space.num_dofs());
    for element_index in elements.iter() {
        for &dof in space.element_dofs(element_index) {
            mask.insert(dof);
        }
    }
    Ok(mask)
}

/// Space-time dofs whose spatial support intersects `elements`, at every temporal node.
pub fn active_space_time_dofs(space: &SpaceTimeSpace, elements: &ElementSet) -> Result<DofMask, CutFemError> {
    let spatial = active_dofs(space.spatial(), elements)?;
    Ok(DofMask::concatenate(
        std::iter::repeat(&spatial).take(space.time_basis().num_nodes()),
    ))
}

/// Active dofs of the elements of one category of a classification.
pub fn active_dofs_of<T: Real>(
    space: &LagrangeSpace,
    cut_info: &CutInfo<T>,
    category: ElementCategory,
) -> Result<DofMask, CutFemError> {
    active_dofs(space, &cut_info.elements(category))
}

/// Per-component activity of a two-domain product space: the negative component is
/// active on `HASNEG` elements, the positive one on `HASPOS` elements.
pub fn active_component_dofs<T: Real>(
    space: &TwoDomainSpace,
    cut_info: &CutInfo<T>,
) -> Result<PerSubdomain<DofMask>, CutFemError> {
    let neg = active_dofs_of(space.component_space(), cut_info, ElementCategory::HasNeg)?;
    let pos = active_dofs_of(space.component_space(), cut_info, ElementCategory::HasPos)?;
    Ok(PerSubdomain::new(neg, pos))
}

/// Stacks per-component masks into a mask over the product space.
pub fn product_mask(space: &TwoDomainSpace, components: &PerSubdomain<DofMask>) -> Result<DofMask, CutFemError> {
    for (_, mask) in components.iter() {
        if mask.len() != space.component_space().num_dofs() {
            return Err(CutFemError::configuration(
                "component mask does not match the component space",
            ));
        }
    }
    debug_assert!(space.component_offset(Subdomain::Neg) < space.component_offset(Subdomain::Pos));
    Ok(DofMask::concatenate([&components[Subdomain::Neg], &components[Subdomain::Pos]]))
}

/// Component dofs active in both components, i.e. dofs of cut elements.
pub fn active_in_both(components: &PerSubdomain<DofMask>) -> DofMask {
    &components[Subdomain::Neg] & &components[Subdomain::Pos]
}

/// Component dofs active in at least one component.
pub fn active_in_either(components: &PerSubdomain<DofMask>) -> DofMask {
    &components[Subdomain::Neg] | &components[Subdomain::Pos]
}

/// The dofs solved for: active dofs that are not constrained by boundary conditions.
///
/// The result is always a subset of `boundary_free`.
pub fn free_dofs(boundary_free: &DofMask, active: &DofMask) -> Result<DofMask, CutFemError> {
    if boundary_free.len() != active.len() {
        return Err(CutFemError::configuration(format!(
            "boundary mask has length {}, but the activity mask has length {}",
            boundary_free.len(),
            active.len()
        )));
    }
    Ok(boundary_free & active)
}
