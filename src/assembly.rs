//! Assembly of global sparse matrices and vectors from element-level contributions.
//!
//! An "element" of an assembler is whatever local unit it integrates over: a (cut) mesh
//! element for volume and interface forms, a facet patch for ghost penalties. Restricted
//! assembly is expressed by assemblers that only enumerate the elements of a subset.
use nalgebra::{DMatrixViewMut, DVectorViewMut, Scalar};

pub mod forms;
pub mod global;

pub use forms::*;
pub use global::*;

/// Local-to-global dof maps of an element assembler.
///
/// Rows correspond to test functions and columns to trial functions.
pub trait ElementConnectivityAssembler {
    fn num_elements(&self) -> usize;

    fn num_rows(&self) -> usize;

    fn num_cols(&self) -> usize;

    fn element_row_count(&self, element_index: usize) -> usize;

    fn element_col_count(&self, element_index: usize) -> usize;

    fn populate_element_rows(&self, output: &mut [usize], element_index: usize);

    fn populate_element_cols(&self, output: &mut [usize], element_index: usize);
}

pub trait ElementMatrixAssembler<T: Scalar>: ElementConnectivityAssembler {
    /// Adds the element matrix to `output`, which has dimensions
    /// `element_row_count x element_col_count` and is zeroed by the caller.
    fn assemble_element_matrix_into(&self, element_index: usize, output: DMatrixViewMut<T>) -> eyre::Result<()>;
}

pub trait ElementVectorAssembler<T: Scalar>: ElementConnectivityAssembler {
    /// Adds the element vector to `output` of length `element_row_count`.
    fn assemble_element_vector_into(&self, element_index: usize, output: DVectorViewMut<T>) -> eyre::Result<()>;
}
