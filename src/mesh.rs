use crate::connectivity::{Segment2d2Connectivity, Tri3d2Connectivity};
use crate::deformation::MeshDeformation;
use crate::element::AffineTriangle;
use crate::error::CutFemError;
use crate::util::{doubled_signed_area, Generation};
use crate::Real;
use log::debug;
use nalgebra::Point2;
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;

pub mod procedural;
pub mod refinement;

/// An edge of a triangle mesh together with its one or two adjacent elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Facet {
    vertices: Segment2d2Connectivity,
    elements: (usize, Option<usize>),
    local_indices: (usize, Option<usize>),
}

impl Facet {
    /// Vertex indices in increasing order.
    pub fn vertices(&self) -> &Segment2d2Connectivity {
        &self.vertices
    }

    /// The first adjacent element and, for interior facets, the second one.
    pub fn elements(&self) -> (usize, Option<usize>) {
        self.elements
    }

    /// The local edge index of this facet in each adjacent element.
    pub fn local_indices(&self) -> (usize, Option<usize>) {
        self.local_indices
    }

    pub fn is_boundary(&self) -> bool {
        self.elements.1.is_none()
    }

    /// Both adjacent elements, if the facet is interior.
    pub fn interior_elements(&self) -> Option<[usize; 2]> {
        self.elements.1.map(|second| [self.elements.0, second])
    }
}

/// A conforming two-dimensional triangle mesh with edge topology.
///
/// Triangles are stored counter-clockwise. The topology (connectivity and facets) is
/// immutable; operations that change it produce a new mesh with a fresh [`Generation`], which
/// invalidates every field, classification and deformation built for the old one.
#[derive(Debug, Clone)]
pub struct TriangleMesh2d<T: Real> {
    vertices: Vec<Point2<T>>,
    connectivity: Vec<Tri3d2Connectivity>,
    facets: Vec<Facet>,
    element_facets: Vec<[usize; 3]>,
    generation: Generation,
}

impl<T: Real> TriangleMesh2d<T> {
    /// Construct a mesh from vertices and counter-clockwise triangle connectivity.
    ///
    /// Fails if an index is out of bounds, a triangle is degenerate or clockwise, or an edge
    /// is shared by more than two triangles.
    pub fn from_vertices_and_connectivity(
        vertices: Vec<Point2<T>>,
        connectivity: Vec<Tri3d2Connectivity>,
    ) -> Result<Self, CutFemError> {
        for (element_index, conn) in connectivity.iter().enumerate() {
            if let Some(&index) = conn.iter().find(|&&index| index >= vertices.len()) {
                return Err(CutFemError::configuration(format!(
                    "element {element_index} references vertex {index}, but the mesh only has {} vertices",
                    vertices.len()
                )));
            }
            let [a, b, c] = conn.0;
            if doubled_signed_area(&vertices[a], &vertices[b], &vertices[c]) <= T::zero() {
                return Err(CutFemError::configuration(format!(
                    "element {element_index} is degenerate or not counter-clockwise"
                )));
            }
        }

        let (facets, element_facets) = compute_facets(&connectivity)?;
        debug!(
            "Constructed triangle mesh with {} vertices, {} elements and {} facets",
            vertices.len(),
            connectivity.len(),
            facets.len()
        );
        Ok(Self {
            vertices,
            connectivity,
            facets,
            element_facets,
            generation: Generation::next(),
        })
    }

    pub fn vertices(&self) -> &[Point2<T>] {
        &self.vertices
    }

    pub fn connectivity(&self) -> &[Tri3d2Connectivity] {
        &self.connectivity
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_elements(&self) -> usize {
        self.connectivity.len()
    }

    pub fn facets(&self) -> &[Facet] {
        &self.facets
    }

    pub fn num_facets(&self) -> usize {
        self.facets.len()
    }

    /// Facet indices of the local edges of the given element.
    pub fn element_facets(&self, element_index: usize) -> [usize; 3] {
        self.element_facets[element_index]
    }

    /// The generation of this topology.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn element_vertices(&self, element_index: usize) -> [Point2<T>; 3] {
        let [a, b, c] = self.connectivity[element_index].0;
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }

    pub fn element(&self, element_index: usize) -> AffineTriangle<T> {
        AffineTriangle::from_vertices(self.element_vertices(element_index))
    }

    /// Element diameter `h_K`, the length of the longest edge.
    pub fn element_diameter(&self, element_index: usize) -> T {
        self.element(element_index).diameter()
    }

    /// Mesh size of a facet patch: the mean diameter of the adjacent elements.
    pub fn facet_patch_diameter(&self, facet_index: usize) -> T {
        let facet = &self.facets[facet_index];
        match facet.elements() {
            (first, Some(second)) => {
                let two = T::one() + T::one();
                (self.element_diameter(first) + self.element_diameter(second)) / two
            }
            (first, None) => self.element_diameter(first),
        }
    }

    pub fn facet_length(&self, facet_index: usize) -> T {
        let [a, b] = self.facets[facet_index].vertices().0;
        (self.vertices[b] - self.vertices[a]).norm()
    }

    /// Largest element diameter.
    pub fn max_diameter(&self) -> T {
        (0..self.num_elements())
            .map(|i| self.element_diameter(i))
            .fold(T::zero(), |a, b| a.max(b))
    }

    /// Per-vertex flag indicating whether the vertex lies on a boundary facet.
    pub fn boundary_vertices(&self) -> Vec<bool> {
        let mut on_boundary = vec![false; self.num_vertices()];
        for facet in self.facets.iter().filter(|facet| facet.is_boundary()) {
            for &v in facet.vertices().iter() {
                on_boundary[v] = true;
            }
        }
        on_boundary
    }

    /// Produce a new mesh with each triangle split into four congruent children.
    pub fn refine_uniformly(&self) -> Result<Self, CutFemError> {
        refinement::refine_uniformly(self)
    }
}

fn compute_facets(connectivity: &[Tri3d2Connectivity]) -> Result<(Vec<Facet>, Vec<[usize; 3]>), CutFemError> {
    let mut facets: Vec<Facet> = Vec::new();
    let mut element_facets = Vec::with_capacity(connectivity.len());
    let mut lookup: FxHashMap<[usize; 2], usize> = FxHashMap::default();

    for (element_index, conn) in connectivity.iter().enumerate() {
        let mut local_facets = [usize::MAX; 3];
        for (local_index, local_facet) in local_facets.iter_mut().enumerate() {
            let sorted = conn.edge(local_index).sorted();
            match lookup.entry(sorted.0) {
                Entry::Vacant(entry) => {
                    let facet_index = facets.len();
                    facets.push(Facet {
                        vertices: sorted,
                        elements: (element_index, None),
                        local_indices: (local_index, None),
                    });
                    entry.insert(facet_index);
                    *local_facet = facet_index;
                }
                Entry::Occupied(entry) => {
                    let facet_index = *entry.get();
                    let facet = &mut facets[facet_index];
                    if facet.elements.1.is_some() {
                        return Err(CutFemError::configuration(format!(
                            "edge {:?} is shared by more than two elements",
                            sorted.0
                        )));
                    }
                    facet.elements.1 = Some(element_index);
                    facet.local_indices.1 = Some(local_index);
                    *local_facet = facet_index;
                }
            }
        }
        element_facets.push(local_facets);
    }

    Ok((facets, element_facets))
}

/// A background mesh together with an optional isoparametric deformation.
///
/// The deformation is *set* explicitly before assembly that should see the higher-order
/// geometry, and must be *unset* before the topology is changed: refining while a
/// deformation is set is rejected, because the deformation is tied to the old topology.
#[derive(Debug, Clone)]
pub struct BackgroundMesh<T: Real> {
    mesh: TriangleMesh2d<T>,
    deformation: Option<MeshDeformation<T>>,
}

impl<T: Real> BackgroundMesh<T> {
    pub fn new(mesh: TriangleMesh2d<T>) -> Self {
        Self {
            mesh,
            deformation: None,
        }
    }

    pub fn mesh(&self) -> &TriangleMesh2d<T> {
        &self.mesh
    }

    pub fn deformation(&self) -> Option<&MeshDeformation<T>> {
        self.deformation.as_ref()
    }

    /// Set the deformation used by subsequent integration.
    ///
    /// Fails if the deformation was computed on a different topology.
    pub fn set_deformation(&mut self, deformation: MeshDeformation<T>) -> Result<(), CutFemError> {
        if deformation.mesh_generation() != self.mesh.generation() {
            return Err(CutFemError::configuration(
                "deformation was computed for a different mesh topology",
            ));
        }
        self.deformation = Some(deformation);
        Ok(())
    }

    /// Remove and return the current deformation, if any.
    pub fn unset_deformation(&mut self) -> Option<MeshDeformation<T>> {
        self.deformation.take()
    }

    /// Uniformly refine the mesh. Requires the deformation to be unset.
    pub fn refine_uniformly(&mut self) -> Result<(), CutFemError> {
        if self.deformation.is_some() {
            return Err(CutFemError::stale(
                "mesh deformation must be unset before the mesh topology is refined",
            ));
        }
        self.mesh = self.mesh.refine_uniformly()?;
        Ok(())
    }

    pub fn into_mesh(self) -> TriangleMesh2d<T> {
        self.mesh
    }
}
