//! Isoparametric mesh deformation raising the geometric accuracy of piecewise linear
//! interfaces.
//!
//! Every node `x` of an order-`k` Lagrange space near the interface is moved along the
//! normalized gradient `g` of the exact level set by the step `s` solving
//! `phi(x + s g) = phi_lin(x)`. The deformed zero level of the linear interpolant then
//! coincides with the exact interface at all nodes, and the order-`k` interpolation of the
//! mapping approximates the exact interface to order `k + 1`. Nodes of cut elements are
//! moved fully; other nodes are blended to zero with the distance to the interface.
use crate::cut_info::{CutInfo, ElementCategory};
use crate::error::CutFemError;
use crate::levelset::{LevelSetField, LevelSetFunction};
use crate::mesh::TriangleMesh2d;
use crate::space::LagrangeSpace;
use crate::util::{convert_scalar, to_f64, Generation};
use crate::Real;
use log::{debug, warn};
use nalgebra::{Matrix2, Vector2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshDeformationConfig {
    /// Polynomial order of the deformation field.
    pub order: usize,
    /// Nodes outside cut elements with `|phi_lin| / h` at or above this value stay fixed.
    pub threshold: f64,
    /// Maximal number of Newton steps of the line search per node.
    pub max_iterations: usize,
    /// Absolute tolerance on the level-set residual, relative to the local mesh size.
    pub tolerance: f64,
    /// Upper bound on the displacement of a node, relative to the local mesh size.
    pub max_relative_displacement: f64,
}

impl Default for MeshDeformationConfig {
    fn default() -> Self {
        Self {
            order: 2,
            threshold: 1.0,
            max_iterations: 20,
            tolerance: 1e-12,
            max_relative_displacement: 0.5,
        }
    }
}

impl MeshDeformationConfig {
    pub fn with_order(order: usize) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }
}

/// A vector-valued order-`k` Lagrange field of nodal displacements on the background mesh.
///
/// The deformation records the mesh topology and the level-set state it was computed for.
/// Integration domains reject it once either has changed.
#[derive(Debug, Clone)]
pub struct MeshDeformation<T: Real> {
    space: LagrangeSpace,
    displacements: Vec<Vector2<T>>,
    mesh_generation: Generation,
    levelset_generation: Generation,
}

impl<T: Real> MeshDeformation<T> {
    /// A deformation from explicit nodal displacements of an order-`k` space.
    pub fn from_displacements(
        mesh: &TriangleMesh2d<T>,
        space: LagrangeSpace,
        displacements: Vec<Vector2<T>>,
        levelset_generation: Generation,
    ) -> Result<Self, CutFemError> {
        space.check_mesh(mesh)?;
        if displacements.len() != space.num_dofs() {
            return Err(CutFemError::configuration(format!(
                "deformation has {} nodal displacements, but the space has {} dofs",
                displacements.len(),
                space.num_dofs()
            )));
        }
        Ok(Self {
            space,
            displacements,
            mesh_generation: mesh.generation(),
            levelset_generation,
        })
    }

    pub fn order(&self) -> usize {
        self.space.order()
    }

    pub fn space(&self) -> &LagrangeSpace {
        &self.space
    }

    pub fn displacements(&self) -> &[Vector2<T>] {
        &self.displacements
    }

    pub fn mesh_generation(&self) -> Generation {
        self.mesh_generation
    }

    pub fn levelset_generation(&self) -> Generation {
        self.levelset_generation
    }

    pub fn max_displacement(&self) -> T {
        self.displacements
            .iter()
            .fold(T::zero(), |max, d| max.max(d.norm()))
    }

    /// Displacements of the mesh vertices (the first dofs of the space).
    pub fn vertex_displacements(&self, mesh: &TriangleMesh2d<T>) -> &[Vector2<T>] {
        &self.displacements[..mesh.num_vertices()]
    }

    /// Displacement and its gradient with respect to undeformed coordinates on an element.
    pub fn evaluate(
        &self,
        mesh: &TriangleMesh2d<T>,
        element_index: usize,
        lambda: &[T; 3],
    ) -> (Vector2<T>, Matrix2<T>) {
        let element = self.space.element();
        let n = element.num_nodes();
        let mut basis = vec![T::zero(); n];
        let mut gradients = vec![Vector2::zeros(); n];
        let lambda_gradients = mesh.element(element_index).barycentric_gradients();
        element.populate_basis_and_gradients(&mut basis, &mut gradients, lambda, &lambda_gradients);

        let mut displacement = Vector2::zeros();
        let mut gradient = Matrix2::zeros();
        for (&dof, phi, grad) in itertools::izip!(self.space.element_dofs(element_index), &basis, &gradients) {
            let d = &self.displacements[dof];
            displacement += d * *phi;
            gradient += d * grad.transpose();
        }
        (displacement, gradient)
    }
}

/// Computes isoparametric mesh deformations from an exact level-set function.
#[derive(Debug, Clone, Default)]
pub struct IsoparametricCorrector {
    config: MeshDeformationConfig,
}

impl IsoparametricCorrector {
    pub fn new(config: MeshDeformationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MeshDeformationConfig {
        &self.config
    }

    /// Computes the deformation for the current linear interpolant `field` of `levelset`.
    ///
    /// `cut_info` must be the classification of `field`; its cut elements define where the
    /// full correction is applied.
    pub fn compute<T: Real>(
        &self,
        mesh: &TriangleMesh2d<T>,
        levelset: &impl LevelSetFunction<T>,
        field: &LevelSetField<T>,
        cut_info: &CutInfo<T>,
    ) -> Result<MeshDeformation<T>, CutFemError> {
        field.check_mesh(mesh)?;
        cut_info.check_current(mesh, field.generation())?;
        if self.config.threshold <= 0.0 {
            return Err(CutFemError::configuration("deformation threshold must be positive"));
        }
        let space = LagrangeSpace::new(mesh, self.config.order)?;
        let element = space.element();

        // For every node: one element containing it with its local barycentric coordinates,
        // whether it belongs to a cut element and the largest adjacent element diameter
        let mut locations = vec![(0, [T::zero(); 3]); space.num_dofs()];
        let mut in_cut_element = vec![false; space.num_dofs()];
        let mut length_scale = vec![T::zero(); space.num_dofs()];
        let cut_elements = cut_info.elements(ElementCategory::If);
        for element_index in 0..mesh.num_elements() {
            let h = mesh.element_diameter(element_index);
            let is_cut = cut_elements.contains(element_index);
            for (local, &dof) in space.element_dofs(element_index).iter().enumerate() {
                locations[dof] = (element_index, element.node_barycentric(local));
                in_cut_element[dof] |= is_cut;
                length_scale[dof] = length_scale[dof].max(h);
            }
        }

        let threshold: T = convert_scalar(self.config.threshold);
        let unconverged = AtomicUsize::new(0);
        let displacements: Vec<Vector2<T>> = (0..space.num_dofs())
            .into_par_iter()
            .map(|dof| {
                let (element_index, lambda) = locations[dof];
                let h = length_scale[dof];
                let target = field.evaluate(mesh, element_index, &lambda);
                let weight = if in_cut_element[dof] {
                    T::one()
                } else {
                    (T::one() - target.abs() / (h * threshold)).max(T::zero())
                };
                if weight == T::zero() {
                    return Vector2::zeros();
                }
                let x = mesh.element(element_index).map_barycentric(&lambda);
                match self.line_search(levelset, &x, target, h) {
                    Ok(step) => step * weight,
                    Err(clamped) => {
                        unconverged.fetch_add(1, Ordering::Relaxed);
                        clamped * weight
                    }
                }
            })
            .collect();

        let unconverged = unconverged.into_inner();
        if unconverged > 0 {
            warn!(
                "Deformation line search did not converge for {} nodes, displacements were clamped",
                unconverged
            );
        }
        let deformation = MeshDeformation {
            space,
            displacements,
            mesh_generation: mesh.generation(),
            levelset_generation: field.generation(),
        };
        debug!(
            "Computed order {} mesh deformation for level set {}: max displacement {:.3e}",
            deformation.order(),
            field.generation(),
            to_f64(deformation.max_displacement())
        );
        Ok(deformation)
    }

    /// Newton iteration for `phi(x + s g) = target` along the normalized gradient `g`.
    ///
    /// Returns the displacement `s g`, or the clamped displacement as the error value if
    /// the iteration did not converge.
    fn line_search<T: Real>(
        &self,
        levelset: &impl LevelSetFunction<T>,
        x: &nalgebra::Point2<T>,
        target: T,
        h: T,
    ) -> Result<Vector2<T>, Vector2<T>> {
        let gradient = levelset.gradient(x);
        let norm = gradient.norm();
        if norm <= T::zero() {
            return Err(Vector2::zeros());
        }
        let direction = gradient / norm;
        let max_step = convert_scalar::<T>(self.config.max_relative_displacement) * h;
        let tolerance = convert_scalar::<T>(self.config.tolerance) * h;

        let mut s = T::zero();
        for _ in 0..self.config.max_iterations {
            let y = x + direction * s;
            let residual = levelset.evaluate(&y) - target;
            if residual.abs() <= tolerance {
                return Ok(direction * s);
            }
            let slope = levelset.gradient(&y).dot(&direction);
            if slope.abs() <= T::default_epsilon() {
                break;
            }
            s = (s - residual / slope).max(-max_step).min(max_step);
        }
        let y = x + direction * s;
        // Stagnation at round-off level counts as converged
        if (levelset.evaluate(&y) - target).abs() <= convert_scalar::<T>(1e-10) * h {
            Ok(direction * s)
        } else {
            Err(direction * s)
        }
    }
}
