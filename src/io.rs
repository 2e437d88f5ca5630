//! Export of meshes, level sets and classifications for visualization.
pub mod vtk;
