//! Finite element spaces on triangle meshes: continuous Lagrange spaces, the two-subdomain
//! product space used by interface problems and tensor-product space-time spaces.
use crate::element::{LagrangeTriangle, TimeLagrangeBasis};
use crate::error::CutFemError;
use crate::mask::DofMask;
use crate::mesh::TriangleMesh2d;
use crate::util::{convert_scalar, Generation};
use crate::Real;
use nalgebra::{DVector, Point2};
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// A continuous (H1-conforming) Lagrange space of order `k` on a triangle mesh.
///
/// Dofs are numbered as
///
/// - one dof per mesh vertex (same index as the vertex),
/// - `k - 1` dofs per facet, ordered from the lower to the higher vertex index,
/// - `(k - 1)(k - 2) / 2` interior dofs per element.
///
/// The space only stores dof maps; geometry is always taken from the mesh it was built for,
/// which is verified through the mesh generation.
#[derive(Debug, Clone)]
pub struct LagrangeSpace {
    element: LagrangeTriangle,
    mesh_generation: Generation,
    num_dofs: usize,
    element_dofs: Vec<usize>,
}

impl LagrangeSpace {
    pub fn new<T: Real>(mesh: &TriangleMesh2d<T>, order: usize) -> Result<Self, CutFemError> {
        let element = LagrangeTriangle::new(order)?;
        let nodes_per_edge = element.num_nodes_per_edge();
        let interior_per_element = element.num_interior_nodes();
        let n_local = element.num_nodes();

        let edge_offset = mesh.num_vertices();
        let interior_offset = edge_offset + mesh.num_facets() * nodes_per_edge;
        let num_dofs = interior_offset + mesh.num_elements() * interior_per_element;

        let mut element_dofs = Vec::with_capacity(mesh.num_elements() * n_local);
        for (element_index, conn) in mesh.connectivity().iter().enumerate() {
            element_dofs.extend_from_slice(&conn.0);
            let facets = mesh.element_facets(element_index);
            for (local_edge, &facet_index) in facets.iter().enumerate() {
                let edge = conn.edge(local_edge);
                let forward = edge[0] < edge[1];
                for m in 1..order {
                    let slot = if forward { m - 1 } else { order - 1 - m };
                    element_dofs.push(edge_offset + facet_index * nodes_per_edge + slot);
                }
            }
            let first_interior = interior_offset + element_index * interior_per_element;
            element_dofs.extend(first_interior..first_interior + interior_per_element);
        }

        Ok(Self {
            element,
            mesh_generation: mesh.generation(),
            num_dofs,
            element_dofs,
        })
    }

    pub fn order(&self) -> usize {
        self.element.order()
    }

    pub fn element(&self) -> &LagrangeTriangle {
        &self.element
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn num_elements(&self) -> usize {
        self.element_dofs.len() / self.dofs_per_element()
    }

    pub fn dofs_per_element(&self) -> usize {
        self.element.num_nodes()
    }

    pub fn element_dofs(&self, element_index: usize) -> &[usize] {
        let n = self.dofs_per_element();
        &self.element_dofs[n * element_index..n * (element_index + 1)]
    }

    pub fn mesh_generation(&self) -> Generation {
        self.mesh_generation
    }

    /// Verifies that the space was built for the given mesh topology.
    pub fn check_mesh<T: Real>(&self, mesh: &TriangleMesh2d<T>) -> Result<(), CutFemError> {
        if self.mesh_generation == mesh.generation() {
            Ok(())
        } else {
            Err(CutFemError::configuration(format!(
                "finite element space was built for mesh {}, but was used with mesh {}",
                self.mesh_generation,
                mesh.generation()
            )))
        }
    }

    /// Physical positions of all nodes on the undeformed mesh.
    pub fn node_positions<T: Real>(&self, mesh: &TriangleMesh2d<T>) -> Result<Vec<Point2<T>>, CutFemError> {
        self.check_mesh(mesh)?;
        let mut positions = vec![Point2::origin(); self.num_dofs];
        for element_index in 0..mesh.num_elements() {
            let triangle = mesh.element(element_index);
            for (local, &dof) in self.element_dofs(element_index).iter().enumerate() {
                positions[dof] = triangle.map_barycentric(&self.element.node_barycentric(local));
            }
        }
        Ok(positions)
    }

    /// Dofs located on the boundary of the mesh.
    pub fn boundary_dofs<T: Real>(&self, mesh: &TriangleMesh2d<T>) -> Result<DofMask, CutFemError> {
        self.check_mesh(mesh)?;
        let mut mask = DofMask::new(self.num_dofs);
        let nodes_per_edge = self.element.num_nodes_per_edge();
        for facet in mesh.facets().iter().filter(|facet| facet.is_boundary()) {
            let (element_index, _) = facet.elements();
            let (local_edge, _) = facet.local_indices();
            let dofs = self.element_dofs(element_index);
            let (a, b) = crate::connectivity::Tri3d2Connectivity::local_edge(local_edge);
            mask.insert(dofs[a]);
            mask.insert(dofs[b]);
            let first = 3 + local_edge * nodes_per_edge;
            for &dof in &dofs[first..first + nodes_per_edge] {
                mask.insert(dof);
            }
        }
        Ok(mask)
    }

    /// Evaluates a finite element function given by `coefficients` on an element at the
    /// given barycentric coordinates.
    pub fn evaluate<T: Real>(&self, coefficients: &DVector<T>, element_index: usize, lambda: &[T; 3]) -> T {
        let mut basis = vec![T::zero(); self.dofs_per_element()];
        self.element.populate_basis(&mut basis, lambda);
        self.element_dofs(element_index)
            .iter()
            .zip(&basis)
            .map(|(&dof, &phi)| coefficients[dof] * phi)
            .fold(T::zero(), |a, b| a + b)
    }
}

/// The two subdomains `{phi < 0}` and `{phi > 0}` separated by the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subdomain {
    Neg,
    Pos,
}

impl Subdomain {
    pub const ALL: [Subdomain; 2] = [Subdomain::Neg, Subdomain::Pos];

    /// Sign of this side in the jump `[u] = u_neg - u_pos`.
    pub fn jump_sign<T: Real>(&self) -> T {
        match self {
            Self::Neg => T::one(),
            Self::Pos => -T::one(),
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::Neg => Self::Pos,
            Self::Pos => Self::Neg,
        }
    }
}

/// A fixed pair of values, one per [`Subdomain`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerSubdomain<X> {
    pub neg: X,
    pub pos: X,
}

impl<X> PerSubdomain<X> {
    pub fn new(neg: X, pos: X) -> Self {
        Self { neg, pos }
    }

    pub fn from_fn(mut f: impl FnMut(Subdomain) -> X) -> Self {
        Self {
            neg: f(Subdomain::Neg),
            pos: f(Subdomain::Pos),
        }
    }

    pub fn map<Y>(&self, mut f: impl FnMut(&X) -> Y) -> PerSubdomain<Y> {
        PerSubdomain {
            neg: f(&self.neg),
            pos: f(&self.pos),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Subdomain, &X)> {
        [(Subdomain::Neg, &self.neg), (Subdomain::Pos, &self.pos)].into_iter()
    }
}

impl<X> Index<Subdomain> for PerSubdomain<X> {
    type Output = X;

    fn index(&self, subdomain: Subdomain) -> &X {
        match subdomain {
            Subdomain::Neg => &self.neg,
            Subdomain::Pos => &self.pos,
        }
    }
}

impl<X> IndexMut<Subdomain> for PerSubdomain<X> {
    fn index_mut(&mut self, subdomain: Subdomain) -> &mut X {
        match subdomain {
            Subdomain::Neg => &mut self.neg,
            Subdomain::Pos => &mut self.pos,
        }
    }
}

/// The product of two copies of a Lagrange space, one per subdomain.
///
/// Global dofs of the `Neg` component come first, followed by those of the `Pos` component.
#[derive(Debug, Clone)]
pub struct TwoDomainSpace {
    space: LagrangeSpace,
}

impl TwoDomainSpace {
    pub fn new(space: LagrangeSpace) -> Self {
        Self { space }
    }

    pub fn component_space(&self) -> &LagrangeSpace {
        &self.space
    }

    pub fn num_dofs(&self) -> usize {
        2 * self.space.num_dofs()
    }

    pub fn component_offset(&self, subdomain: Subdomain) -> usize {
        match subdomain {
            Subdomain::Neg => 0,
            Subdomain::Pos => self.space.num_dofs(),
        }
    }

    pub fn global_dof(&self, subdomain: Subdomain, component_dof: usize) -> usize {
        self.component_offset(subdomain) + component_dof
    }

    /// Extracts the coefficients of one component from a global coefficient vector.
    pub fn component<T: Real>(&self, coefficients: &DVector<T>, subdomain: Subdomain) -> DVector<T> {
        let n = self.space.num_dofs();
        coefficients.rows(self.component_offset(subdomain), n).into_owned()
    }
}

/// Tensor product of a spatial Lagrange space and a Lagrange basis in reference time.
///
/// The global dof of spatial dof `i` at temporal node `m` is `m * n_spatial + i`.
#[derive(Debug, Clone)]
pub struct SpaceTimeSpace {
    spatial: LagrangeSpace,
    time: TimeLagrangeBasis,
}

impl SpaceTimeSpace {
    pub fn new(spatial: LagrangeSpace, time_order: usize) -> Result<Self, CutFemError> {
        Ok(Self {
            spatial,
            time: TimeLagrangeBasis::new(time_order)?,
        })
    }

    pub fn spatial(&self) -> &LagrangeSpace {
        &self.spatial
    }

    pub fn time_basis(&self) -> &TimeLagrangeBasis {
        &self.time
    }

    pub fn num_dofs(&self) -> usize {
        self.spatial.num_dofs() * self.time.num_nodes()
    }

    pub fn dofs_per_element(&self) -> usize {
        self.spatial.dofs_per_element() * self.time.num_nodes()
    }

    pub fn global_dof(&self, spatial_dof: usize, time_node: usize) -> usize {
        time_node * self.spatial.num_dofs() + spatial_dof
    }

    /// Space-time dofs of an element, time node major: all spatial dofs of time node 0, then
    /// all of time node 1, and so on.
    pub fn populate_element_dofs(&self, output: &mut [usize], element_index: usize) {
        let spatial_dofs = self.spatial.element_dofs(element_index);
        let n = spatial_dofs.len();
        assert_eq!(output.len(), n * self.time.num_nodes());
        for m in 0..self.time.num_nodes() {
            for (i, &dof) in spatial_dofs.iter().enumerate() {
                output[m * n + i] = self.global_dof(dof, m);
            }
        }
    }

    /// Evaluates a space-time coefficient vector at a fixed reference time, producing
    /// coefficients of the spatial space.
    pub fn restrict_to_time<T: Real>(&self, coefficients: &DVector<T>, t_ref: T) -> Result<DVector<T>, CutFemError> {
        check_reference_time(t_ref)?;
        if coefficients.len() != self.num_dofs() {
            return Err(CutFemError::configuration(format!(
                "space-time coefficient vector has length {}, expected {}",
                coefficients.len(),
                self.num_dofs()
            )));
        }
        let mut psi = vec![T::zero(); self.time.num_nodes()];
        self.time.populate_basis(&mut psi, t_ref);
        let n = self.spatial.num_dofs();
        let mut restricted = DVector::zeros(n);
        for (m, &psi_m) in psi.iter().enumerate() {
            restricted += coefficients.rows(m * n, n) * psi_m;
        }
        Ok(restricted)
    }
}

/// Rejects reference times outside the closed slab `[0, 1]`.
pub fn check_reference_time<T: Real>(t_ref: T) -> Result<(), CutFemError> {
    let tolerance: T = convert_scalar(1e-12);
    if t_ref >= -tolerance && t_ref <= T::one() + tolerance {
        Ok(())
    } else {
        Err(CutFemError::configuration(format!(
            "reference time {} lies outside [0, 1]",
            crate::util::to_f64(t_ref)
        )))
    }
}
