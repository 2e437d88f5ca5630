//! Complete unfitted discretizations built from the geometry, integration and assembly
//! components of the crate.
pub mod interface_poisson;
pub mod trace_fem;

pub use interface_poisson::*;
pub use trace_fem::*;
