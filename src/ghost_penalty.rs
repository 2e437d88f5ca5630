//! Ghost-penalty stabilization on facet patches near the interface.
//!
//! Restricting a discretization to the dofs of elements that touch a region leaves basis
//! functions whose support barely intersects the region. The ghost penalty couples them to
//! their neighbors across the facets of the active band, which restores the conditioning of
//! the restricted system independently of the cut position.
use crate::assembly::{BasisValues, ElementConnectivityAssembler, ElementMatrixAssembler, FormSpace};
use crate::cut_info::{CutInfo, ElementCategory};
use crate::cut_quadrature::IntegrationPoint;
use crate::error::CutFemError;
use crate::levelset::TimeSlab;
use crate::mask::FacetSet;
use crate::mesh::TriangleMesh2d;
use crate::quadrature::QuadratureTable;
use crate::space::{Subdomain, TwoDomainSpace};
use crate::util::{convert_scalar, perpendicular};
use crate::Real;
use log::debug;
use nalgebra::{DMatrixViewMut, Matrix2, Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use thread_local::ThreadLocal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GhostPenaltyKind {
    /// Jump of the polynomial extensions of the two elements over the whole facet patch.
    Jump,
    /// Jump of the normal derivative across the facet.
    GradientJump,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostPenaltyConfig {
    pub kind: GhostPenaltyKind,
    /// Stabilization weight `gamma`.
    pub weight: f64,
    /// Power of the patch diameter scaling the penalty. Defaults to `-2` for
    /// [`GhostPenaltyKind::Jump`] and `1` for [`GhostPenaltyKind::GradientJump`].
    pub h_power: Option<i32>,
}

impl Default for GhostPenaltyConfig {
    fn default() -> Self {
        Self {
            kind: GhostPenaltyKind::Jump,
            weight: 0.1,
            h_power: None,
        }
    }
}

impl GhostPenaltyConfig {
    pub fn effective_h_power(&self) -> i32 {
        self.h_power.unwrap_or(match self.kind {
            GhostPenaltyKind::Jump => -2,
            GhostPenaltyKind::GradientJump => 1,
        })
    }
}

/// Interior facets between elements touching `subdomain` and cut elements.
pub fn ghost_penalty_facets<T: Real>(
    mesh: &TriangleMesh2d<T>,
    cut_info: &CutInfo<T>,
    subdomain: Subdomain,
) -> Result<FacetSet, CutFemError> {
    cut_info.facets_with_neighbor_types(mesh, ElementCategory::from(subdomain), ElementCategory::If)
}

#[derive(Debug)]
struct PatchWorkspace<T: Real> {
    dofs: [Vec<usize>; 2],
    patch: Vec<usize>,
    local_to_patch: [Vec<usize>; 2],
    basis: [BasisValues<T>; 2],
    jump: Vec<T>,
}

impl<T: Real> Default for PatchWorkspace<T> {
    fn default() -> Self {
        Self {
            dofs: [Vec::new(), Vec::new()],
            patch: Vec::new(),
            local_to_patch: [Vec::new(), Vec::new()],
            basis: [BasisValues::default(), BasisValues::default()],
            jump: Vec::new(),
        }
    }
}

/// Element assembler whose "elements" are the facet patches of a facet set.
pub struct GhostPenaltyStabilizer<'a, T: Real> {
    mesh: &'a TriangleMesh2d<T>,
    space: FormSpace<'a>,
    facets: Vec<usize>,
    config: GhostPenaltyConfig,
    scale: T,
    slab: Option<TimeSlab<T>>,
    table: QuadratureTable<T>,
    offset: usize,
    total: usize,
    workspace: ThreadLocal<RefCell<PatchWorkspace<T>>>,
}

impl<'a, T: Real> GhostPenaltyStabilizer<'a, T> {
    /// A spatial ghost penalty on the given facets.
    pub fn new(
        mesh: &'a TriangleMesh2d<T>,
        space: impl Into<FormSpace<'a>>,
        facets: &FacetSet,
        config: GhostPenaltyConfig,
    ) -> Result<Self, CutFemError> {
        let space = space.into();
        if space.is_space_time() {
            return Err(CutFemError::configuration(
                "space-time ghost penalties must be created with a time slab",
            ));
        }
        Self::build(mesh, space, facets, config, None)
    }

    /// A ghost penalty for a space-time space, integrated over the whole slab.
    pub fn space_time(
        mesh: &'a TriangleMesh2d<T>,
        space: impl Into<FormSpace<'a>>,
        facets: &FacetSet,
        config: GhostPenaltyConfig,
        slab: TimeSlab<T>,
    ) -> Result<Self, CutFemError> {
        let space = space.into();
        if !space.is_space_time() {
            return Err(CutFemError::configuration(
                "time slabs are only meaningful for space-time spaces",
            ));
        }
        Self::build(mesh, space, facets, config, Some(slab))
    }

    fn build(
        mesh: &'a TriangleMesh2d<T>,
        space: FormSpace<'a>,
        facets: &FacetSet,
        config: GhostPenaltyConfig,
        slab: Option<TimeSlab<T>>,
    ) -> Result<Self, CutFemError> {
        space.spatial().check_mesh(mesh)?;
        if facets.len() != mesh.num_facets() {
            return Err(CutFemError::configuration(format!(
                "facet set has length {}, but the mesh has {} facets",
                facets.len(),
                mesh.num_facets()
            )));
        }
        if config.weight < 0.0 {
            return Err(CutFemError::configuration("ghost penalty weight must be non-negative"));
        }
        let facets: Vec<usize> = facets
            .iter()
            .filter(|&f| !mesh.facets()[f].is_boundary())
            .collect();
        let table = QuadratureTable::new(2 * space.order(), 2 * space.time_order())?;
        debug!("Ghost penalty ({:?}) on {} facets", config.kind, facets.len());
        Ok(Self {
            mesh,
            space,
            facets,
            config,
            scale: convert_scalar(config.weight),
            slab,
            table,
            offset: 0,
            total: space.num_dofs(),
            workspace: ThreadLocal::new(),
        })
    }

    /// Scales the penalty by an additional factor, e.g. a diffusion coefficient.
    pub fn with_coefficient(mut self, coefficient: T) -> Self {
        self.scale *= coefficient;
        self
    }

    /// Places the penalty in the diagonal block of one component of a product space.
    pub fn in_product_space(mut self, space: &TwoDomainSpace, component: Subdomain) -> Self {
        self.offset = space.component_offset(component);
        self.total = space.num_dofs();
        self
    }

    pub fn facets(&self) -> &[usize] {
        &self.facets
    }

    pub fn config(&self) -> &GhostPenaltyConfig {
        &self.config
    }

    fn patch_elements(&self, patch_index: usize) -> [usize; 2] {
        let facet = &self.mesh.facets()[self.facets[patch_index]];
        // Boundary facets were filtered out on construction
        facet
            .interior_elements()
            .unwrap_or([facet.elements().0, facet.elements().0])
    }

    fn populate_patch(&self, ws: &mut PatchWorkspace<T>, patch_index: usize) {
        let elements = self.patch_elements(patch_index);
        let n = self.space.dofs_per_element();
        ws.patch.clear();
        for side in 0..2 {
            ws.dofs[side].resize(n, 0);
            self.space
                .populate_element_dofs(&mut ws.dofs[side], elements[side]);
            ws.local_to_patch[side].clear();
            for &dof in &ws.dofs[side] {
                let position = match ws.patch.iter().position(|&p| p == dof) {
                    Some(position) => position,
                    None => {
                        ws.patch.push(dof);
                        ws.patch.len() - 1
                    }
                };
                ws.local_to_patch[side].push(position);
            }
        }
    }

    /// Time points and physical weights of the slab, or a single dummy point.
    fn time_points(&self) -> Vec<(Option<T>, T)> {
        match &self.slab {
            None => vec![(None, T::one())],
            Some(slab) => {
                let (weights, points) = self.table.time_rule();
                weights
                    .iter()
                    .zip(points)
                    .map(|(&w, &t)| (Some(t), w * slab.dt()))
                    .collect()
            }
        }
    }
}

fn synthetic_point<T: Real>(element: usize, barycentric: [T; 3], x: Point2<T>, time: Option<T>) -> IntegrationPoint<T> {
    IntegrationPoint {
        element,
        weight: T::one(),
        reference_point: x,
        barycentric,
        point: x,
        deformation_gradient: Matrix2::identity(),
        normal: None,
        time,
    }
}

impl<'a, T: Real> ElementConnectivityAssembler for GhostPenaltyStabilizer<'a, T> {
    fn num_elements(&self) -> usize {
        self.facets.len()
    }

    fn num_rows(&self) -> usize {
        self.total
    }

    fn num_cols(&self) -> usize {
        self.total
    }

    fn element_row_count(&self, element_index: usize) -> usize {
        let ws = &mut *self.workspace.get_or_default().borrow_mut();
        self.populate_patch(ws, element_index);
        ws.patch.len()
    }

    fn element_col_count(&self, element_index: usize) -> usize {
        self.element_row_count(element_index)
    }

    fn populate_element_rows(&self, output: &mut [usize], element_index: usize) {
        let ws = &mut *self.workspace.get_or_default().borrow_mut();
        self.populate_patch(ws, element_index);
        for (out, &dof) in output.iter_mut().zip(&ws.patch) {
            *out = dof + self.offset;
        }
    }

    fn populate_element_cols(&self, output: &mut [usize], element_index: usize) {
        self.populate_element_rows(output, element_index);
    }
}

impl<'a, T: Real> ElementMatrixAssembler<T> for GhostPenaltyStabilizer<'a, T> {
    fn assemble_element_matrix_into(&self, element_index: usize, mut output: DMatrixViewMut<T>) -> eyre::Result<()> {
        let ws = &mut *self.workspace.get_or_default().borrow_mut();
        self.populate_patch(ws, element_index);
        let elements = self.patch_elements(element_index);
        let geometries = elements.map(|e| self.mesh.element(e));
        let facet_index = self.facets[element_index];
        let h = self.mesh.facet_patch_diameter(facet_index);
        let scale = self.scale * h.powi(self.config.effective_h_power());
        let time_points = self.time_points();

        // Collects (point, spatial weight, facet normal) for the chosen penalty kind
        let mut samples: Vec<(Point2<T>, T, Option<Vector2<T>>)> = Vec::new();
        match self.config.kind {
            GhostPenaltyKind::Jump => {
                for geometry in &geometries {
                    let area = geometry.area();
                    self.table
                        .for_each_triangle_point(geometry.vertices(), area, |x, w| samples.push((x, w, None)));
                }
            }
            GhostPenaltyKind::GradientJump => {
                let [a, b] = self.mesh.facets()[facet_index].vertices().0;
                let (xa, xb) = (self.mesh.vertices()[a], self.mesh.vertices()[b]);
                let normal = perpendicular(&(xb - xa)).normalize();
                self.table
                    .for_each_segment_point(&xa, &xb, |x, w| samples.push((x, w, Some(normal))));
            }
        }

        let PatchWorkspace {
            local_to_patch,
            basis,
            jump,
            patch,
            ..
        } = ws;
        jump.resize(patch.len(), T::zero());
        for &(time, time_weight) in &time_points {
            for &(x, w, normal) in &samples {
                jump.fill(T::zero());
                for side in 0..2 {
                    let lambda = geometries[side].barycentric(&x);
                    let point = synthetic_point(elements[side], lambda, x, time);
                    basis[side].populate(self.space, self.mesh, &point, None, T::one());
                    let sign = if side == 0 { T::one() } else { -T::one() };
                    for (shape, &p) in basis[side].shapes().iter().zip(&local_to_patch[side]) {
                        let value = match normal {
                            None => shape.value,
                            Some(n) => shape.gradient.dot(&n),
                        };
                        jump[p] += sign * value;
                    }
                }
                let weight = scale * w * time_weight;
                for (i, &ji) in jump.iter().enumerate() {
                    for (j, &jj) in jump.iter().enumerate() {
                        output[(i, j)] += weight * ji * jj;
                    }
                }
            }
        }
        Ok(())
    }
}
