//! Classification of background elements relative to the zero level set.
//!
//! Classification only looks at signs of nodal level-set values. The cut ratio of cut
//! elements is the only quantity that needs geometry and is computed through the same
//! sub-triangulation the integrator uses, so the two always agree.
use crate::cut_quadrature::{decompose_triangle, time_breakpoints};
use crate::element::TimeLagrangeBasis;
use crate::error::CutFemError;
use crate::levelset::{LevelSetField, SpaceTimeLevelSetField};
use crate::mask::{ElementSet, FacetSet};
use crate::mesh::TriangleMesh2d;
use crate::quadrature::QuadratureTable;
use crate::space::Subdomain;
use crate::util::{convert_scalar, Generation};
use crate::Real;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Which side exact zeros of the level set count towards.
///
/// Interfaces passing exactly through mesh vertices are resolved by this sign instead of by
/// perturbation. Sub-cells and interface pieces of zero measure that the tie-break produces
/// are discarded during integration.
///
/// In time, signs of temporal polynomials of order `k_t >= 2` are only checked on a grid of
/// `16 k_t` sub-intervals (see [`time_breakpoints`](crate::cut_quadrature::time_breakpoints)),
/// so a zero crossing that returns within one sub-interval is missed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZeroSign {
    Negative,
    #[default]
    Positive,
}

impl ZeroSign {
    pub fn is_negative<T: Real>(&self, value: T) -> bool {
        match self {
            ZeroSign::Negative => value <= T::zero(),
            ZeroSign::Positive => value < T::zero(),
        }
    }

    pub fn subdomain<T: Real>(&self, value: T) -> Subdomain {
        if self.is_negative(value) {
            Subdomain::Neg
        } else {
            Subdomain::Pos
        }
    }
}

/// Sign classification of one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Neg,
    Pos,
    Cut,
}

/// Element sets derived from a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementCategory {
    Neg,
    Pos,
    /// Cut elements, i.e. elements intersected by the interface.
    If,
    HasNeg,
    HasPos,
}

impl ElementCategory {
    pub fn contains(&self, element_type: ElementType) -> bool {
        match self {
            ElementCategory::Neg => element_type == ElementType::Neg,
            ElementCategory::Pos => element_type == ElementType::Pos,
            ElementCategory::If => element_type == ElementType::Cut,
            ElementCategory::HasNeg => element_type != ElementType::Pos,
            ElementCategory::HasPos => element_type != ElementType::Neg,
        }
    }
}

impl From<Subdomain> for ElementCategory {
    fn from(subdomain: Subdomain) -> Self {
        match subdomain {
            Subdomain::Neg => ElementCategory::HasNeg,
            Subdomain::Pos => ElementCategory::HasPos,
        }
    }
}

/// Cached element classification and cut ratios for one level-set state.
///
/// A `CutInfo` records the generation of the level-set field it was computed from.
/// Consumers call [`CutInfo::check_current`] (integration domains do so on construction)
/// and receive a `StaleState` error if the field changed without a matching
/// [`CutInfo::update`]. There is no unclassified state: construction already classifies.
#[derive(Debug, Clone, PartialEq)]
pub struct CutInfo<T: Real> {
    element_types: Vec<ElementType>,
    cut_ratios: Vec<T>,
    zero_sign: ZeroSign,
    mesh_generation: Generation,
    levelset_generation: Generation,
    space_time: bool,
}

impl<T: Real> CutInfo<T> {
    pub fn new(
        mesh: &TriangleMesh2d<T>,
        levelset: &LevelSetField<T>,
        zero_sign: ZeroSign,
    ) -> Result<Self, CutFemError> {
        let mut cut_info = Self::unclassified(mesh, zero_sign, levelset.generation());
        cut_info.update(mesh, levelset)?;
        Ok(cut_info)
    }

    pub fn new_space_time(
        mesh: &TriangleMesh2d<T>,
        levelset: &SpaceTimeLevelSetField<T>,
        zero_sign: ZeroSign,
    ) -> Result<Self, CutFemError> {
        let mut cut_info = Self::unclassified(mesh, zero_sign, levelset.generation());
        cut_info.update_space_time(mesh, levelset)?;
        Ok(cut_info)
    }

    fn unclassified(mesh: &TriangleMesh2d<T>, zero_sign: ZeroSign, levelset_generation: Generation) -> Self {
        Self {
            element_types: Vec::new(),
            cut_ratios: Vec::new(),
            zero_sign,
            mesh_generation: mesh.generation(),
            levelset_generation,
            space_time: false,
        }
    }

    /// Reclassifies all elements for a (changed) spatial level-set field.
    pub fn update(&mut self, mesh: &TriangleMesh2d<T>, levelset: &LevelSetField<T>) -> Result<(), CutFemError> {
        levelset.check_mesh(mesh)?;
        let zero_sign = self.zero_sign;
        let (element_types, cut_ratios) = (0..mesh.num_elements())
            .into_par_iter()
            .map(|element_index| {
                let values = levelset.element_values(mesh, element_index);
                let element_type = classify_signs(values.iter().copied(), zero_sign);
                let ratio = match element_type {
                    ElementType::Neg => T::one(),
                    ElementType::Pos => T::zero(),
                    ElementType::Cut => {
                        let vertices = mesh.element_vertices(element_index);
                        decompose_triangle(&vertices, &values, zero_sign).negative_fraction()
                    }
                };
                (element_type, ratio)
            })
            .unzip();
        self.finish_update(mesh, element_types, cut_ratios, levelset.generation(), false);
        Ok(())
    }

    /// Reclassifies all elements for a space-time level-set field on its slab.
    ///
    /// An element is cut if the sign of the field changes anywhere on the element during the
    /// slab, either between vertices or in time. The cut ratio is the time average of the
    /// negative volume fraction.
    pub fn update_space_time(
        &mut self,
        mesh: &TriangleMesh2d<T>,
        levelset: &SpaceTimeLevelSetField<T>,
    ) -> Result<(), CutFemError> {
        if levelset.mesh_generation() != mesh.generation() {
            return Err(CutFemError::configuration(
                "space-time level set was built for a different mesh topology",
            ));
        }
        let zero_sign = self.zero_sign;
        let time = levelset.time_basis();
        let table = QuadratureTable::<T>::new(1, 2 * time.order() + 1)?;
        let (element_types, cut_ratios) = (0..mesh.num_elements())
            .into_par_iter()
            .map(|element_index| {
                let vertex_values = mesh.connectivity()[element_index].0.map(|v| levelset.vertex_time_values(v));
                let samples = vertex_values
                    .iter()
                    .flat_map(|nodal| sample_time_polynomial(time, nodal));
                let element_type = classify_signs(samples, zero_sign);
                let ratio = match element_type {
                    ElementType::Neg => T::one(),
                    ElementType::Pos => T::zero(),
                    ElementType::Cut => {
                        let vertices = mesh.element_vertices(element_index);
                        let breakpoints = time_breakpoints(time, &vertex_values, zero_sign);
                        let (weights, points) = table.time_rule();
                        let mut ratio = T::zero();
                        for window in breakpoints.windows(2) {
                            let length = window[1] - window[0];
                            for (&w, &s) in weights.iter().zip(points) {
                                let t_ref = window[0] + s * length;
                                let values = levelset.element_values_at(mesh, element_index, t_ref);
                                let fraction = decompose_triangle(&vertices, &values, zero_sign).negative_fraction();
                                ratio += w * length * fraction;
                            }
                        }
                        ratio
                    }
                };
                (element_type, ratio)
            })
            .unzip();
        self.finish_update(mesh, element_types, cut_ratios, levelset.generation(), true);
        Ok(())
    }

    fn finish_update(
        &mut self,
        mesh: &TriangleMesh2d<T>,
        element_types: Vec<ElementType>,
        cut_ratios: Vec<T>,
        levelset_generation: Generation,
        space_time: bool,
    ) {
        self.element_types = element_types;
        self.cut_ratios = cut_ratios;
        self.mesh_generation = mesh.generation();
        self.levelset_generation = levelset_generation;
        self.space_time = space_time;
        debug!(
            "Classified {} elements for level set {}: {} neg, {} pos, {} cut",
            self.num_elements(),
            levelset_generation,
            self.count(ElementCategory::Neg),
            self.count(ElementCategory::Pos),
            self.count(ElementCategory::If)
        );
    }

    pub fn num_elements(&self) -> usize {
        self.element_types.len()
    }

    pub fn zero_sign(&self) -> ZeroSign {
        self.zero_sign
    }

    pub fn mesh_generation(&self) -> Generation {
        self.mesh_generation
    }

    pub fn levelset_generation(&self) -> Generation {
        self.levelset_generation
    }

    /// Whether the classification was computed from a space-time level set.
    pub fn is_space_time(&self) -> bool {
        self.space_time
    }

    pub fn element_type(&self, element_index: usize) -> ElementType {
        self.element_types[element_index]
    }

    pub fn element_types(&self) -> &[ElementType] {
        &self.element_types
    }

    pub fn has_neg(&self, element_index: usize) -> bool {
        ElementCategory::HasNeg.contains(self.element_type(element_index))
    }

    pub fn has_pos(&self, element_index: usize) -> bool {
        ElementCategory::HasPos.contains(self.element_type(element_index))
    }

    /// Fraction of the element volume on the negative side: `1` for negative elements, `0`
    /// for positive ones.
    pub fn cut_ratio(&self, element_index: usize) -> T {
        self.cut_ratios[element_index]
    }

    pub fn cut_ratios(&self) -> &[T] {
        &self.cut_ratios
    }

    pub fn elements(&self, category: ElementCategory) -> ElementSet {
        ElementSet::from_vec(
            self.element_types
                .iter()
                .map(|&element_type| category.contains(element_type))
                .collect(),
        )
    }

    pub fn count(&self, category: ElementCategory) -> usize {
        self.element_types
            .iter()
            .filter(|&&element_type| category.contains(element_type))
            .count()
    }

    /// Interior facets with one neighbor in category `a` and the other in category `b`.
    pub fn facets_with_neighbor_types(
        &self,
        mesh: &TriangleMesh2d<T>,
        a: ElementCategory,
        b: ElementCategory,
    ) -> Result<FacetSet, CutFemError> {
        self.check_mesh(mesh)?;
        Ok(facets_with_neighbor_types(mesh, &self.elements(a), &self.elements(b)))
    }

    pub fn check_mesh(&self, mesh: &TriangleMesh2d<T>) -> Result<(), CutFemError> {
        if self.mesh_generation == mesh.generation() {
            Ok(())
        } else {
            Err(CutFemError::configuration(format!(
                "classification was computed for mesh {}, but was used with mesh {}",
                self.mesh_generation,
                mesh.generation()
            )))
        }
    }

    /// Verifies that this classification belongs to the given mesh and level-set state.
    pub fn check_current(&self, mesh: &TriangleMesh2d<T>, levelset_generation: Generation) -> Result<(), CutFemError> {
        self.check_mesh(mesh)?;
        if self.levelset_generation == levelset_generation {
            Ok(())
        } else {
            Err(CutFemError::stale(format!(
                "classification is for level set {}, but the current level set is {}; \
                 update the classification after changing the level set",
                self.levelset_generation, levelset_generation
            )))
        }
    }
}

/// Interior facets whose two adjacent elements lie in `a` and `b` respectively (in either
/// order).
pub fn facets_with_neighbor_types<T: Real>(mesh: &TriangleMesh2d<T>, a: &ElementSet, b: &ElementSet) -> FacetSet {
    assert_eq!(a.len(), mesh.num_elements(), "Element set does not match the mesh");
    assert_eq!(b.len(), mesh.num_elements(), "Element set does not match the mesh");
    FacetSet::from_vec(
        mesh.facets()
            .iter()
            .map(|facet| match facet.interior_elements() {
                Some([e1, e2]) => (a.contains(e1) && b.contains(e2)) || (b.contains(e1) && a.contains(e2)),
                None => false,
            })
            .collect(),
    )
}

fn classify_signs<T: Real>(values: impl IntoIterator<Item = T>, zero_sign: ZeroSign) -> ElementType {
    let mut has_neg = false;
    let mut has_pos = false;
    for value in values {
        if zero_sign.is_negative(value) {
            has_neg = true;
        } else {
            has_pos = true;
        }
    }
    match (has_neg, has_pos) {
        (true, true) => ElementType::Cut,
        (true, false) => ElementType::Neg,
        _ => ElementType::Pos,
    }
}

/// Number of uniform sub-intervals of `[0, 1]` per unit of temporal order used to detect
/// sign changes of temporal polynomials.
///
/// For temporal orders of at least 2, a sign excursion that starts and ends within one
/// sub-interval of width `1 / (16 k_t)` is not detected: the element counts as uncut during
/// it. Linear-in-time level sets are classified exactly.
pub(crate) const TIME_SAMPLES_PER_ORDER: usize = 16;

/// Values of a temporal polynomial at the sign-detection grid, which contains the nodes.
pub(crate) fn sample_time_polynomial<T: Real>(time: &TimeLagrangeBasis, nodal_values: &[T]) -> Vec<T> {
    if time.order() <= 1 {
        return nodal_values.to_vec();
    }
    let num_intervals = TIME_SAMPLES_PER_ORDER * time.order();
    let mut psi = vec![T::zero(); time.num_nodes()];
    (0..=num_intervals)
        .map(|i| {
            let t: T = convert_scalar(i as f64 / num_intervals as f64);
            time.populate_basis(&mut psi, t);
            psi.iter()
                .zip(nodal_values)
                .fold(T::zero(), |acc, (&p, &v)| acc + p * v)
        })
        .collect()
}
