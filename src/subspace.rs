// src/subspace.rs

//! A search subspace of an explicit dense operator.
//!
//! Outer solvers keep `V`, `W = A·V` and `H = Vᴴ·W` in sync while the basis grows. This
//! snapshot does the same for a small in-memory operator, which is enough to drive the
//! projected solver from the command line and from tests.

use crate::error::ProjectionError;
use crate::ortho::{GramSchmidt, Orthogonalizer};
use crate::scalar::RitzScalar;
use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub struct SubspaceSnapshot<T: RitzScalar> {
    operator: DMatrix<T>,
    v: DMatrix<T>,
    w: DMatrix<T>,
    h: DMatrix<T>,
    r: DMatrix<T>,
    basis_size: usize,
    ortho: GramSchmidt,
    machine_eps: f64,
}

impl<T: RitzScalar> SubspaceSnapshot<T> {
    /// Orthonormal random basis of `basis_size` columns with room for `capacity` columns.
    pub fn from_operator(
        operator: DMatrix<T>,
        basis_size: usize,
        capacity: usize,
        seed: u64,
    ) -> Result<Self, ProjectionError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let start = DMatrix::from_fn(operator.nrows(), basis_size, |_, _| T::from_real(rng.gen_range(-1.0..1.0)));
        Self::from_columns(operator, &start, capacity, seed)
    }

    /// Basis spanned by the columns of `start`, orthonormalized in order.
    pub fn from_columns(
        operator: DMatrix<T>,
        start: &DMatrix<T>,
        capacity: usize,
        seed: u64,
    ) -> Result<Self, ProjectionError> {
        let n = operator.nrows();
        if operator.ncols() != n {
            return Err(ProjectionError::InvalidInput("operator must be square".into()));
        }
        if start.nrows() != n || start.ncols() > capacity || capacity > n {
            return Err(ProjectionError::InvalidInput(format!(
                "cannot hold {} start columns of length {} in a capacity of {} for an operator of order {}",
                start.ncols(),
                start.nrows(),
                capacity,
                n
            )));
        }

        let mut snapshot = SubspaceSnapshot {
            operator,
            v: DMatrix::zeros(n, capacity),
            w: DMatrix::zeros(n, capacity),
            h: DMatrix::zeros(capacity, capacity),
            r: DMatrix::zeros(capacity, capacity),
            basis_size: 0,
            ortho: GramSchmidt::new(seed),
            machine_eps: f64::EPSILON,
        };
        for column in start.column_iter() {
            snapshot.extend(&column.into_owned())?;
        }
        Ok(snapshot)
    }

    /// Appends `column`, orthonormalized against the current basis, and updates `W` and
    /// the new column (and mirrored row) of `H`.
    pub fn extend(&mut self, column: &DVector<T>) -> Result<(), ProjectionError> {
        let k = self.basis_size;
        if k == self.v.ncols() {
            return Err(ProjectionError::InvalidInput(format!("subspace is full at {k} columns")));
        }
        if column.len() != self.v.nrows() {
            return Err(ProjectionError::InvalidInput(format!(
                "column has length {}, expected {}",
                column.len(),
                self.v.nrows()
            )));
        }

        self.v.column_mut(k).copy_from(column);
        self.ortho
            .orthogonalize(&mut self.v, &mut self.r, k..k + 1, self.machine_eps)
            .map_err(|status| ProjectionError::OrthogonalizationFailure { status })?;

        let image = &self.operator * self.v.column(k);
        self.w.column_mut(k).copy_from(&image);

        for i in 0..=k {
            let entry = self.v.column(i).dotc(&self.w.column(k));
            self.h[(i, k)] = entry;
            self.h[(k, i)] = entry.conjugate();
        }
        self.basis_size = k + 1;
        Ok(())
    }

    pub fn basis_size(&self) -> usize {
        self.basis_size
    }

    pub fn capacity(&self) -> usize {
        self.v.ncols()
    }

    pub fn operator(&self) -> &DMatrix<T> {
        &self.operator
    }

    pub fn v(&self) -> &DMatrix<T> {
        &self.v
    }

    pub fn w(&self) -> &DMatrix<T> {
        &self.w
    }

    /// `capacity × capacity`; the leading `basis_size` block is current.
    pub fn h(&self) -> &DMatrix<T> {
        &self.h
    }

    /// The full-length vector `V·y` for subspace coefficients `y`.
    pub fn lift(&self, y: &DVector<T>) -> DVector<T> {
        self.v.columns(0, y.len()) * y
    }

    /// `‖A·V·y - λ·V·y‖`, computed from the stored `W`.
    pub fn residual_norm(&self, y: &DVector<T>, lambda: f64) -> f64 {
        let k = y.len();
        let image = self.w.columns(0, k) * y;
        let lifted = self.v.columns(0, k) * y;
        (image - lifted * T::from_real(lambda)).norm()
    }
}
