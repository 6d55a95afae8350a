// src/kernels.rs

//! Dense kernels the projected eigensolve relies on.
//!
//! The solver only talks to the two traits below. [`NalgebraKernels`] implements both on
//! top of nalgebra's self-adjoint eigendecomposition and SVD; an outer solver linked
//! against LAPACK can plug in its own implementation instead.

use crate::scalar::RitzScalar;
use nalgebra::{DMatrix, SVD};

/// Kernel status reported when nalgebra gives up before converging.
pub const NOT_CONVERGED: i32 = 1;

pub struct EigenDecomposition<T: RitzScalar> {
    /// Eigenvalues in ascending order.
    pub values: Vec<f64>,
    /// Orthonormal eigenvectors, column `i` belonging to `values[i]`.
    pub vectors: DMatrix<T>,
}

pub struct RightSingularVectors<T: RitzScalar> {
    /// Singular values in descending order.
    pub singular_values: Vec<f64>,
    /// `Vᴴ`: row `i` is the (conjugated) right singular vector of `singular_values[i]`.
    pub v_t: DMatrix<T>,
}

pub trait SymmetricEigenKernel<T: RitzScalar> {
    /// Full eigendecomposition of a Hermitian matrix. Both triangles of `matrix` are
    /// populated. A non-zero `Err` status is reported when the kernel fails.
    fn eigh(&mut self, matrix: DMatrix<T>) -> Result<EigenDecomposition<T>, i32>;
}

pub trait SvdKernel<T: RitzScalar> {
    /// Singular values and right singular vectors of a square matrix.
    fn right_svd(&mut self, matrix: DMatrix<T>) -> Result<RightSingularVectors<T>, i32>;
}

/// Default iteration budget per matrix dimension, as in LAPACK's QR sweeps.
pub const DEFAULT_SWEEPS_PER_DIMENSION: usize = 30;

#[derive(Debug, Clone, Copy)]
pub struct NalgebraKernels {
    /// Convergence tolerance handed to the iterative nalgebra routines.
    pub eps: f64,
    /// The iteration cap is this many sweeps per row of the input. `0` removes the cap.
    pub sweeps_per_dimension: usize,
}

impl Default for NalgebraKernels {
    fn default() -> Self {
        NalgebraKernels { eps: f64::EPSILON, sweeps_per_dimension: DEFAULT_SWEEPS_PER_DIMENSION }
    }
}

impl NalgebraKernels {
    fn max_iterations(&self, n: usize) -> usize {
        self.sweeps_per_dimension.saturating_mul(n.max(1))
    }
}

fn all_finite<T: RitzScalar>(matrix: &DMatrix<T>) -> bool {
    matrix.iter().all(|x| x.is_finite())
}

impl<T: RitzScalar> SymmetricEigenKernel<T> for NalgebraKernels {
    fn eigh(&mut self, matrix: DMatrix<T>) -> Result<EigenDecomposition<T>, i32> {
        let n = matrix.nrows();
        if !all_finite(&matrix) {
            return Err(NOT_CONVERGED);
        }
        let decomposition = matrix
            .try_symmetric_eigen(self.eps, self.max_iterations(n))
            .ok_or(NOT_CONVERGED)?;
        if !decomposition.eigenvalues.iter().all(|v| v.is_finite()) {
            return Err(NOT_CONVERGED);
        }

        // nalgebra leaves the spectrum unordered.
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| decomposition.eigenvalues[a].total_cmp(&decomposition.eigenvalues[b]));

        let values = order.iter().map(|&i| decomposition.eigenvalues[i]).collect();
        let vectors = DMatrix::from_fn(n, n, |row, col| decomposition.eigenvectors[(row, order[col])]);

        Ok(EigenDecomposition { values, vectors })
    }
}

impl<T: RitzScalar> SvdKernel<T> for NalgebraKernels {
    fn right_svd(&mut self, matrix: DMatrix<T>) -> Result<RightSingularVectors<T>, i32> {
        let n = matrix.ncols();
        if !all_finite(&matrix) {
            return Err(NOT_CONVERGED);
        }
        let max_iterations = self.max_iterations(matrix.nrows().max(n));
        let svd = SVD::try_new(matrix, false, true, self.eps, max_iterations).ok_or(NOT_CONVERGED)?;
        if !svd.singular_values.iter().all(|v| v.is_finite()) {
            return Err(NOT_CONVERGED);
        }
        let v_t = svd.v_t.ok_or(NOT_CONVERGED)?;

        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

        let singular_values = order.iter().map(|&i| svd.singular_values[i]).collect();
        let v_t = DMatrix::from_fn(order.len(), n, |row, col| v_t[(order[row], col)]);

        Ok(RightSingularVectors { singular_values, v_t })
    }
}

/// Dense Hermitian copy of the leading `n × n` block of `h`, built from its upper
/// triangle only. With `negate`, every entry is negated.
pub(crate) fn hermitian_from_upper<T: RitzScalar>(h: &DMatrix<T>, n: usize, negate: bool) -> DMatrix<T> {
    let mut work = DMatrix::<T>::zeros(n, n);
    for j in 0..n {
        for i in 0..=j {
            let value = if negate { -h[(i, j)] } else { h[(i, j)] };
            work[(i, j)] = value;
            if i != j {
                work[(j, i)] = value.conjugate();
            }
        }
    }
    work
}
