//! Linear solves restricted to a mask of free degrees of freedom.
//!
//! Dofs outside the mask keep prescribed values (boundary data, or zero for inactive dofs).
//! Their contributions are moved to the right-hand side and only the free block
//! `A_ff x_f = b_f - A_fc x_c` is solved.
use crate::assembly::spmv;
use crate::error::CutFemError;
use crate::mask::DofMask;
use crate::reorder::{reverse_cuthill_mckee, Permutation};
use crate::util::convert_scalar;
use crate::Real;
use log::debug;
use nalgebra::DVector;
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix, CsrMatrix};
use serde::{Deserialize, Serialize};

/// Solver used for the restricted system.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum LinearSolver {
    /// Sparse Cholesky factorization in Reverse Cuthill-McKee order. Requires a symmetric
    /// positive definite system.
    ///
    /// The ordering only limits the fill to the band of the reordered matrix, so the cost
    /// grows roughly with the square of the number of free dofs. For P2 interface problems
    /// beyond a few tens of thousands of dofs, [`LinearSolver::ConjugateGradient`] is the
    /// better choice.
    #[default]
    SparseCholesky,
    /// Jacobi-preconditioned conjugate gradients. Requires a symmetric positive definite
    /// system.
    ConjugateGradient { tolerance: f64, max_iterations: usize },
    /// Dense LU factorization with partial pivoting. Handles non-symmetric systems such as
    /// space-time convection-diffusion, but only suits small restricted systems.
    DenseLu,
}

impl LinearSolver {
    pub fn conjugate_gradient() -> Self {
        LinearSolver::ConjugateGradient {
            tolerance: 1e-12,
            max_iterations: 10_000,
        }
    }
}

/// The block of a system on the free dofs, with the right-hand side corrected for the
/// prescribed values.
#[derive(Debug, Clone)]
pub struct RestrictedSystem<T: Real> {
    pub matrix: CsrMatrix<T>,
    pub rhs: DVector<T>,
    /// Global index of every free dof, in reduced order.
    pub free_dofs: Vec<usize>,
}

/// Extracts the free block of `matrix` and moves the columns of fixed dofs to the
/// right-hand side.
pub fn restrict_system<T: Real>(
    matrix: &CsrMatrix<T>,
    rhs: &DVector<T>,
    free: &DofMask,
    fixed_values: &DVector<T>,
) -> Result<RestrictedSystem<T>, CutFemError> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return Err(CutFemError::configuration("system matrix must be square"));
    }
    if rhs.len() != n || free.len() != n || fixed_values.len() != n {
        return Err(CutFemError::configuration(format!(
            "system of size {} with right-hand side of length {}, mask of length {} and {} fixed values",
            n,
            rhs.len(),
            free.len(),
            fixed_values.len()
        )));
    }

    let free_dofs = free.indices();
    let mut reduced_index = vec![usize::MAX; n];
    for (reduced, &global) in free_dofs.iter().enumerate() {
        reduced_index[global] = reduced;
    }

    let mut coo = CooMatrix::new(free_dofs.len(), free_dofs.len());
    let mut reduced_rhs = DVector::zeros(free_dofs.len());
    for (i_reduced, &i) in free_dofs.iter().enumerate() {
        let row = matrix.row(i);
        let mut value = rhs[i];
        for (&j, &a_ij) in row.col_indices().iter().zip(row.values()) {
            if free.contains(j) {
                coo.push(i_reduced, reduced_index[j], a_ij);
            } else {
                value -= a_ij * fixed_values[j];
            }
        }
        reduced_rhs[i_reduced] = value;
    }

    Ok(RestrictedSystem {
        matrix: CsrMatrix::from(&coo),
        rhs: reduced_rhs,
        free_dofs,
    })
}

/// Solves `A x = b` for the dofs in `free`, with `x = fixed_values` on all other dofs.
pub fn solve_restricted<T: Real>(
    matrix: &CsrMatrix<T>,
    rhs: &DVector<T>,
    free: &DofMask,
    fixed_values: &DVector<T>,
    solver: &LinearSolver,
) -> Result<DVector<T>, CutFemError> {
    let system = restrict_system(matrix, rhs, free, fixed_values)?;
    debug!(
        "Solving restricted system with {} of {} dofs free ({:?})",
        system.free_dofs.len(),
        matrix.nrows(),
        solver
    );

    let mut solution = fixed_values.clone();
    if system.free_dofs.is_empty() {
        return Ok(solution);
    }
    let reduced = solve_system(&system.matrix, &system.rhs, solver)?;
    if reduced.iter().any(|x| !x.is_finite()) {
        return Err(CutFemError::singular("solution contains non-finite values"));
    }
    for (&global, &value) in system.free_dofs.iter().zip(reduced.iter()) {
        solution[global] = value;
    }
    Ok(solution)
}

/// Solves a square sparse system with the given solver.
pub fn solve_system<T: Real>(
    matrix: &CsrMatrix<T>,
    rhs: &DVector<T>,
    solver: &LinearSolver,
) -> Result<DVector<T>, CutFemError> {
    match *solver {
        LinearSolver::SparseCholesky => {
            // Factor P A P^T in Reverse Cuthill-McKee order to keep the fill within a band
            let perm = reverse_cuthill_mckee(matrix.pattern())?;
            let permuted = permute_symmetrically(matrix, &perm);
            let cholesky = CscCholesky::factor(&permuted)
                .map_err(|err| CutFemError::singular(format!("sparse Cholesky factorization failed: {}", err)))?;
            let permuted_rhs = DVector::from_vec(perm.apply_to_slice(rhs.as_slice()));
            let permuted_solution = cholesky.solve(&permuted_rhs);
            let mut solution = DVector::zeros(rhs.len());
            for (target, &value) in permuted_solution.column(0).iter().enumerate() {
                solution[perm.source_index(target)] = value;
            }
            Ok(solution)
        }
        LinearSolver::ConjugateGradient {
            tolerance,
            max_iterations,
        } => jacobi_cg(matrix, rhs, convert_scalar(tolerance), max_iterations),
        LinearSolver::DenseLu => {
            let dense = nalgebra::DMatrix::from(matrix);
            dense
                .lu()
                .solve(rhs)
                .ok_or_else(|| CutFemError::singular("dense LU factorization found a singular matrix"))
        }
    }
}

/// The matrix `P A P^T`, i.e. entry `(i, j)` of the result is `A[perm[i], perm[j]]`.
fn permute_symmetrically<T: Real>(matrix: &CsrMatrix<T>, perm: &Permutation) -> CscMatrix<T> {
    let inverse = perm.inverse();
    let mut coo = CooMatrix::new(matrix.nrows(), matrix.ncols());
    for (i, j, &value) in matrix.triplet_iter() {
        coo.push(inverse.source_index(i), inverse.source_index(j), value);
    }
    CscMatrix::from(&coo)
}

/// Conjugate gradients with the diagonal of `matrix` as preconditioner.
///
/// Stops when the residual satisfies `|r| <= tolerance |b|`.
#[allow(non_snake_case)]
fn jacobi_cg<T: Real>(
    matrix: &CsrMatrix<T>,
    b: &DVector<T>,
    tolerance: T,
    max_iterations: usize,
) -> Result<DVector<T>, CutFemError> {
    let n = b.len();
    let mut inverse_diagonal = DVector::zeros(n);
    for (i, row) in matrix.row_iter().enumerate() {
        let diagonal = row
            .col_indices()
            .iter()
            .zip(row.values())
            .find(|&(&j, _)| j == i)
            .map(|(_, &v)| v)
            .unwrap_or_else(T::zero);
        if diagonal <= T::zero() {
            return Err(CutFemError::singular(format!(
                "non-positive diagonal entry at row {} in conjugate gradient solve",
                i
            )));
        }
        inverse_diagonal[i] = T::one() / diagonal;
    }

    let mut x = DVector::zeros(n);
    let b_norm = b.norm();
    if b_norm == T::zero() {
        return Ok(x);
    }

    let mut r = b.clone();
    let mut z = r.component_mul(&inverse_diagonal);
    let mut p = z.clone();
    let mut zTr = z.dot(&r);

    for iteration in 0..max_iterations {
        if r.norm() <= tolerance * b_norm {
            debug!("Conjugate gradients converged after {} iterations", iteration);
            return Ok(x);
        }
        let Ap = spmv(matrix, &p);
        let pAp = p.dot(&Ap);
        if pAp <= T::zero() {
            return Err(CutFemError::singular("operator appears to be indefinite"));
        }
        let alpha = zTr / pAp;
        x.axpy(alpha, &p, T::one());
        r.axpy(-alpha, &Ap, T::one());
        z = r.component_mul(&inverse_diagonal);
        let zTr_next = z.dot(&r);
        let beta = zTr_next / zTr;
        p = &z + &p * beta;
        zTr = zTr_next;
    }

    if r.norm() <= tolerance * b_norm {
        Ok(x)
    } else {
        Err(CutFemError::singular(format!(
            "conjugate gradients did not converge in {} iterations",
            max_iterations
        )))
    }
}
