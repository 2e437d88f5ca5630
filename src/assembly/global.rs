use crate::assembly::{ElementMatrixAssembler, ElementVectorAssembler};
use crate::Real;
use eyre::eyre;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use std::cell::RefCell;
use thread_local::ThreadLocal;

/// A parallel assembler for CSR matrices and dense vectors.
///
/// Elements are processed in parallel. Every worker accumulates its element contributions
/// into a local triplet buffer, and the buffers are concatenated and summed into the global
/// matrix at the end, so no locking is needed during integration. Element scratch buffers
/// are kept per thread and reused across assemblies.
#[derive(Debug)]
pub struct CsrAssembler<T: Real> {
    workspace: ThreadLocal<RefCell<AssemblerWorkspace<T>>>,
}

#[derive(Debug)]
struct AssemblerWorkspace<T: Real> {
    element_rows: Vec<usize>,
    element_cols: Vec<usize>,
    element_matrix: DMatrix<T>,
    element_vector: DVector<T>,
}

impl<T: Real> Default for AssemblerWorkspace<T> {
    fn default() -> Self {
        Self {
            element_rows: Vec::new(),
            element_cols: Vec::new(),
            element_matrix: DMatrix::zeros(0, 0),
            element_vector: DVector::zeros(0),
        }
    }
}

impl<T: Real> Default for CsrAssembler<T> {
    fn default() -> Self {
        Self {
            workspace: ThreadLocal::new(),
        }
    }
}

type Triplets<T> = Vec<(usize, usize, T)>;

impl<T: Real> CsrAssembler<T> {
    pub fn assemble(&self, element_assembler: &(dyn Sync + ElementMatrixAssembler<T>)) -> eyre::Result<CsrMatrix<T>> {
        self.assemble_sum(&[element_assembler])
    }

    /// Assembles the sum of several forms acting on the same row and column spaces.
    pub fn assemble_sum(
        &self,
        element_assemblers: &[&(dyn Sync + ElementMatrixAssembler<T>)],
    ) -> eyre::Result<CsrMatrix<T>> {
        let (num_rows, num_cols) = common_dimensions(element_assemblers.iter().map(|a| (a.num_rows(), a.num_cols())))?;
        let mut coo = CooMatrix::new(num_rows, num_cols);
        for element_assembler in element_assemblers {
            for (i, j, v) in self.collect_triplets(*element_assembler)? {
                coo.push(i, j, v);
            }
        }
        Ok(CsrMatrix::from(&coo))
    }

    fn collect_triplets(
        &self,
        element_assembler: &(dyn Sync + ElementMatrixAssembler<T>),
    ) -> eyre::Result<Triplets<T>> {
        (0..element_assembler.num_elements())
            .into_par_iter()
            .try_fold(Vec::new, |mut triplets: Triplets<T>, element_index| {
                let ws = &mut *self.workspace.get_or_default().borrow_mut();
                let num_rows = element_assembler.element_row_count(element_index);
                let num_cols = element_assembler.element_col_count(element_index);
                ws.element_rows.resize(num_rows, 0);
                ws.element_cols.resize(num_cols, 0);
                element_assembler.populate_element_rows(&mut ws.element_rows, element_index);
                element_assembler.populate_element_cols(&mut ws.element_cols, element_index);
                ws.element_matrix.resize_mut(num_rows, num_cols, T::zero());
                ws.element_matrix.fill(T::zero());

                let matrix_view = DMatrixViewMut::from(&mut ws.element_matrix);
                element_assembler.assemble_element_matrix_into(element_index, matrix_view)?;

                for (local_row, &global_row) in ws.element_rows.iter().enumerate() {
                    for (local_col, &global_col) in ws.element_cols.iter().enumerate() {
                        let value = ws.element_matrix[(local_row, local_col)];
                        if value != T::zero() {
                            triplets.push((global_row, global_col, value));
                        }
                    }
                }
                Ok::<_, eyre::Report>(triplets)
            })
            .try_reduce(Vec::new, |mut a, mut b| {
                if a.len() < b.len() {
                    std::mem::swap(&mut a, &mut b);
                }
                a.append(&mut b);
                Ok(a)
            })
    }

    pub fn assemble_vector(
        &self,
        element_assembler: &(dyn Sync + ElementVectorAssembler<T>),
    ) -> eyre::Result<DVector<T>> {
        self.assemble_vector_sum(&[element_assembler])
    }

    /// Assembles the sum of several linear forms acting on the same space.
    pub fn assemble_vector_sum(
        &self,
        element_assemblers: &[&(dyn Sync + ElementVectorAssembler<T>)],
    ) -> eyre::Result<DVector<T>> {
        let (num_rows, _) = common_dimensions(element_assemblers.iter().map(|a| (a.num_rows(), 0)))?;
        let mut vector = DVector::zeros(num_rows);
        for element_assembler in element_assemblers {
            let entries = (0..element_assembler.num_elements())
                .into_par_iter()
                .try_fold(Vec::new, |mut entries: Vec<(usize, T)>, element_index| {
                    let ws = &mut *self.workspace.get_or_default().borrow_mut();
                    let num_rows = element_assembler.element_row_count(element_index);
                    ws.element_rows.resize(num_rows, 0);
                    element_assembler.populate_element_rows(&mut ws.element_rows, element_index);
                    ws.element_vector.resize_vertically_mut(num_rows, T::zero());
                    ws.element_vector.fill(T::zero());

                    let vector_view = DVectorViewMut::from(&mut ws.element_vector);
                    element_assembler.assemble_element_vector_into(element_index, vector_view)?;
                    entries.extend(
                        ws.element_rows
                            .iter()
                            .copied()
                            .zip(ws.element_vector.iter().copied()),
                    );
                    Ok::<_, eyre::Report>(entries)
                })
                .try_reduce(Vec::new, |mut a, mut b| {
                    a.append(&mut b);
                    Ok(a)
                })?;
            for (i, value) in entries {
                vector[i] += value;
            }
        }
        Ok(vector)
    }
}

fn common_dimensions(mut dimensions: impl Iterator<Item = (usize, usize)>) -> eyre::Result<(usize, usize)> {
    let first = dimensions
        .next()
        .ok_or_else(|| eyre!("at least one element assembler is required"))?;
    for other in dimensions {
        if other != first {
            return Err(eyre!(
                "element assemblers have mismatched dimensions {:?} and {:?}",
                first,
                other
            ));
        }
    }
    Ok(first)
}

/// Sparse matrix-vector product `y = A x`.
pub fn spmv<T: Real>(matrix: &CsrMatrix<T>, x: &DVector<T>) -> DVector<T> {
    let mut y = DVector::zeros(matrix.nrows());
    for (i, row) in matrix.row_iter().enumerate() {
        y[i] = row
            .col_indices()
            .iter()
            .zip(row.values())
            .fold(T::zero(), |acc, (&j, &v)| acc + v * x[j]);
    }
    y
}
