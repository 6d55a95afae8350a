// src/ortho.rs

//! Orthonormalization of new basis columns against the existing ones.
//!
//! Rows of a basis may be spread over several workers. Every inner product is therefore
//! computed locally and then summed through [`GlobalReduce`]; a single worker uses
//! [`SingleProcess`], whose reduction is the identity.

use crate::scalar::RitzScalar;
use log::warn;
use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::ops::Range;

/// Requested columns do not fit in the basis or the triangular factor.
pub const BAD_COLUMN_RANGE: i32 = -1;
/// A column stayed in the span of the others after repeated random replacement.
pub const RANK_DEFICIENT: i32 = -3;

const DEFAULT_SEED: u64 = 0x5EED_CAFE;

/// Sums partial inner products across the workers that share the basis rows.
pub trait GlobalReduce<T> {
    /// Replaces every entry of `values` by its sum over all workers. Blocking; an `Err`
    /// status means the collective failed.
    fn sum_in_place(&mut self, values: &mut [T]) -> Result<(), i32>;
}

/// Reduction for a basis held entirely by the calling process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl<T> GlobalReduce<T> for SingleProcess {
    fn sum_in_place(&mut self, _values: &mut [T]) -> Result<(), i32> {
        Ok(())
    }
}

pub trait Orthogonalizer<T: RitzScalar> {
    /// Orthonormalizes the columns `columns` of `basis` against columns `0..columns.start`
    /// and against each other, writing the coefficients into column `i` of `r` for every
    /// processed column `i`, so that `old basis[:, i] = basis[:, 0..=i] * r[0..=i, i]`.
    fn orthogonalize(
        &mut self,
        basis: &mut DMatrix<T>,
        r: &mut DMatrix<T>,
        columns: Range<usize>,
        machine_eps: f64,
    ) -> Result<(), i32>;
}

/// Classical Gram-Schmidt with iterated reorthogonalization.
///
/// A pass is repeated while it removes more than a quarter of the column norm. A column
/// whose norm collapses to `machine_eps` times its original norm lies in the span of the
/// previous ones: it is replaced by a random vector, which is orthogonalized without
/// touching `r` (its diagonal entry stays zero).
pub struct GramSchmidt<G = SingleProcess> {
    reduce: G,
    rng: ChaCha8Rng,
    max_passes: usize,
    max_randomizations: usize,
}

impl GramSchmidt<SingleProcess> {
    pub fn new(seed: u64) -> Self {
        GramSchmidt::with_reduce(SingleProcess, seed)
    }
}

impl Default for GramSchmidt<SingleProcess> {
    fn default() -> Self {
        GramSchmidt::new(DEFAULT_SEED)
    }
}

impl<G> GramSchmidt<G> {
    pub fn with_reduce(reduce: G, seed: u64) -> Self {
        GramSchmidt {
            reduce,
            rng: ChaCha8Rng::seed_from_u64(seed),
            max_passes: 3,
            max_randomizations: 10,
        }
    }

    pub fn max_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes.max(1);
        self
    }

    pub fn max_randomizations(mut self, randomizations: usize) -> Self {
        self.max_randomizations = randomizations;
        self
    }

    pub fn reduce(&self) -> &G {
        &self.reduce
    }

    fn global_norm<T>(&mut self, basis: &DMatrix<T>, column: usize) -> Result<f64, i32>
    where
        T: RitzScalar,
        G: GlobalReduce<T>,
    {
        let mut buffer = [T::from_real(basis.column(column).norm_squared())];
        self.reduce.sum_in_place(&mut buffer)?;
        Ok(buffer[0].real().max(0.0).sqrt())
    }

    fn orthogonalize_column<T>(
        &mut self,
        basis: &mut DMatrix<T>,
        r: &mut DMatrix<T>,
        i: usize,
        machine_eps: f64,
    ) -> Result<(), i32>
    where
        T: RitzScalar,
        G: GlobalReduce<T>,
    {
        let mut update_r = true;
        let mut randomizations = 0;

        loop {
            let original_norm = self.global_norm(basis, i)?;
            let mut previous_norm = original_norm;

            for _ in 0..self.max_passes {
                if i > 0 {
                    let mut coefficients: Vec<T> =
                        basis.columns(0, i).ad_mul(&basis.column(i)).iter().copied().collect();
                    self.reduce.sum_in_place(&mut coefficients)?;

                    let coefficients = DVector::from_vec(coefficients);
                    let projection = basis.columns(0, i) * &coefficients;
                    let mut target = basis.column_mut(i);
                    target -= projection;

                    if update_r {
                        for (j, &c) in coefficients.iter().enumerate() {
                            r[(j, i)] += c;
                        }
                    }
                }

                let norm = self.global_norm(basis, i)?;
                if norm <= machine_eps * original_norm {
                    break;
                }
                if norm > 0.75 * previous_norm {
                    if update_r {
                        r[(i, i)] = T::from_real(norm);
                    }
                    let scale = T::from_real(norm.recip());
                    basis.column_mut(i).iter_mut().for_each(|x| *x *= scale);
                    return Ok(());
                }
                previous_norm = norm;
            }

            randomizations += 1;
            if randomizations > self.max_randomizations {
                return Err(RANK_DEFICIENT);
            }
            warn!("column {i} is numerically dependent, replacing it with a random vector");

            update_r = false;
            for x in basis.column_mut(i).iter_mut() {
                *x = T::from_real(self.rng.gen_range(-1.0..1.0));
            }
        }
    }
}

impl<T: RitzScalar, G: GlobalReduce<T>> Orthogonalizer<T> for GramSchmidt<G> {
    fn orthogonalize(
        &mut self,
        basis: &mut DMatrix<T>,
        r: &mut DMatrix<T>,
        columns: Range<usize>,
        machine_eps: f64,
    ) -> Result<(), i32> {
        if columns.end > basis.ncols() || columns.end > r.nrows() || columns.end > r.ncols() {
            return Err(BAD_COLUMN_RANGE);
        }
        for i in columns {
            for row in 0..=i {
                r[(row, i)] = T::zero();
            }
            self.orthogonalize_column(basis, r, i, machine_eps)?;
        }
        Ok(())
    }
}
