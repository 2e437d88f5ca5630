//! Unfitted finite element geometry, integration and assembly on implicitly defined domains.
//!
//! The crate approximates a level-set function on a background triangle mesh, classifies
//! elements relative to its zero level set, integrates exactly over the resulting cut
//! sub-regions and the interface, raises the geometric order by isoparametric mesh
//! deformation, stabilizes restricted systems with ghost penalties and drives space-time
//! discontinuous Galerkin time slabs on moving domains.
//!
//! The typical workflow for a stationary problem is
//!
//! 1. build a [`mesh::TriangleMesh2d`] and interpolate a level set into a
//!    [`levelset::LevelSetField`],
//! 2. classify elements with [`cut_info::CutInfo`],
//! 3. optionally compute a [`deformation::MeshDeformation`],
//! 4. bundle everything into a validated [`cut_quadrature::CutDomain`] and assemble forms
//!    restricted to the active elements and dofs.
use nalgebra::RealField;

pub mod active_set;
pub mod assembly;
pub mod connectivity;
pub mod cut_info;
pub mod cut_quadrature;
pub mod deformation;
pub mod element;
pub mod error;
pub mod error_estimation;
pub mod ghost_penalty;
pub mod interpolate;
pub mod io;
pub mod levelset;
pub mod mask;
pub mod mesh;
pub mod problems;
pub mod quadrature;
pub mod reorder;
pub mod solve;
pub mod space;
pub mod time_slab;
pub mod util;

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
pub extern crate vtkio;

pub use error::CutFemError;

/// Scalar type used throughout the crate.
///
/// A trait alias for real fields that are cheap to copy, i.e. `f32` and `f64`.
pub trait Real: RealField + Copy {}

impl<T> Real for T where T: RealField + Copy {}
