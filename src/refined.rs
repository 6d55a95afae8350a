// src/refined.rs

//! Refined extraction of the Ritz pair closest to an interior shift.
//!
//! With `V` the search basis and `W = A·V`, the refined vector minimizes
//! `‖(A - σI)·V·y‖` over unit `y`. Keeping a QR factorization `Q·R = W - σV` reduces this
//! to the right singular vector of the small triangular `R` for its smallest singular
//! value. The factorization is rebuilt once per restart cycle and then extended by one
//! column per inner iteration.

use crate::error::ProjectionError;
use crate::kernels::{hermitian_from_upper, RightSingularVectors, SvdKernel};
use crate::ortho::Orthogonalizer;
use crate::scalar::RitzScalar;
use log::debug;
use nalgebra::DMatrix;

/// `Q` and `R` of the shifted basis, kept across inner iterations.
pub struct RefinedState<T: RitzScalar> {
    q: DMatrix<T>,
    r: DMatrix<T>,
    needs_full_rebuild: bool,
}

impl<T: RitzScalar> RefinedState<T> {
    /// Storage for a basis of `n_local` rows (this worker's share) and up to
    /// `max_basis_size` columns. The first extraction rebuilds the factorization.
    pub fn new(n_local: usize, max_basis_size: usize) -> Self {
        RefinedState {
            q: DMatrix::zeros(n_local, max_basis_size),
            r: DMatrix::zeros(max_basis_size, max_basis_size),
            needs_full_rebuild: true,
        }
    }

    /// Starts a new restart cycle: the next extraction refactors the whole basis.
    pub fn restart(&mut self) {
        self.needs_full_rebuild = true;
    }

    pub fn needs_full_rebuild(&self) -> bool {
        self.needs_full_rebuild
    }

    pub fn n_local(&self) -> usize {
        self.q.nrows()
    }

    pub fn max_basis_size(&self) -> usize {
        self.r.ncols()
    }

    pub fn q(&self) -> &DMatrix<T> {
        &self.q
    }

    pub fn r(&self) -> &DMatrix<T> {
        &self.r
    }
}

/// Basis data handed to a refined solve.
pub struct RefinedBasis<'a, T: RitzScalar> {
    pub state: &'a mut RefinedState<T>,
    /// Search basis, `n_local` rows, at least `basis_size` columns.
    pub v: &'a DMatrix<T>,
    /// `A·V`, same shape as `v`.
    pub w: &'a DMatrix<T>,
    /// Pairs converged since the last locking step; they advance the refined shift.
    pub recently_converged: usize,
}

impl<'a, T: RitzScalar> RefinedBasis<'a, T> {
    pub fn new(state: &'a mut RefinedState<T>, v: &'a DMatrix<T>, w: &'a DMatrix<T>) -> Self {
        RefinedBasis { state, v, w, recently_converged: 0 }
    }

    pub fn recently_converged(mut self, count: usize) -> Self {
        self.recently_converged = count;
        self
    }

    pub(crate) fn validate(&self, basis_size: usize) -> Result<(), ProjectionError> {
        let n_local = self.state.n_local();
        if self.v.nrows() != n_local || self.w.nrows() != n_local {
            return Err(ProjectionError::InvalidInput(format!(
                "V and W must have {} rows, got {} and {}",
                n_local,
                self.v.nrows(),
                self.w.nrows()
            )));
        }
        if self.v.ncols() < basis_size || self.w.ncols() < basis_size {
            return Err(ProjectionError::InvalidInput(format!(
                "V and W must hold at least {basis_size} columns"
            )));
        }
        if basis_size > self.state.max_basis_size() {
            return Err(ProjectionError::InvalidInput(format!(
                "basis size {} exceeds refined capacity {}",
                basis_size,
                self.state.max_basis_size()
            )));
        }
        Ok(())
    }
}

/// Replaces `h_vecs` by the right singular vectors of the shifted triangular factor in
/// ascending singular-value order and `h_vals[0]` by the Rayleigh quotient of the first
/// one. Returns the ascending singular values.
#[allow(clippy::too_many_arguments)]
pub(crate) fn extract<T, S, O>(
    basis: RefinedBasis<'_, T>,
    shift: f64,
    h: &DMatrix<T>,
    basis_size: usize,
    h_vals: &mut [f64],
    h_vecs: &mut DMatrix<T>,
    svd: &mut S,
    ortho: &mut O,
    machine_eps: f64,
) -> Result<Vec<f64>, ProjectionError>
where
    T: RitzScalar,
    S: SvdKernel<T>,
    O: Orthogonalizer<T>,
{
    let n = basis_size;
    let RefinedBasis { state, v, w, .. } = basis;
    let rebuild = state.needs_full_rebuild;
    let columns = if rebuild { 0..n } else { n - 1..n };

    for k in columns.clone() {
        let mut column = state.q.column_mut(k);
        column.copy_from(&w.column(k));
        column.axpy(T::from_real(-shift), &v.column(k), T::one());
    }

    if rebuild {
        // Stale entries would otherwise leak into the reduction of the first columns.
        state.r.fill(T::zero());
    }
    ortho
        .orthogonalize(&mut state.q, &mut state.r, columns, machine_eps)
        .map_err(|status| ProjectionError::OrthogonalizationFailure { status })?;
    if rebuild {
        state.needs_full_rebuild = false;
    }

    let triangular = DMatrix::from_fn(n, n, |i, j| if i <= j { state.r[(i, j)] } else { T::zero() });
    let RightSingularVectors { mut singular_values, v_t } = svd
        .right_svd(triangular)
        .map_err(|info| ProjectionError::DenseSvdFailure { info })?;

    let max_basis_size = state.max_basis_size();
    if n + 1 == max_basis_size {
        state.r.column_mut(max_basis_size - 1).fill(T::zero());
    }

    // Rows of Vᴴ come in descending order; column j takes row n-1-j back to V.
    *h_vecs = DMatrix::from_fn(n, n, |i, j| v_t[(n - 1 - j, i)].conjugate());
    singular_values.reverse();

    let y = h_vecs.column(0).into_owned();
    let hy = hermitian_from_upper(h, n, false) * &y;
    h_vals[0] = y.dotc(&hy).real();

    debug!(
        "refined extraction: shift {shift}, rebuild {rebuild}, value {}, smallest singular value {}",
        h_vals[0],
        singular_values.first().copied().unwrap_or(0.0)
    );

    Ok(singular_values)
}
