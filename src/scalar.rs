use nalgebra::{Complex, ComplexField};

/// Scalar field the projected eigensolve runs over.
///
/// Eigenvalues and singular values are always real (`f64`); entries of `H`, the basis
/// and the Ritz vectors are either real or complex. Conjugation, scaling and dot
/// products come from [`ComplexField`].
pub trait RitzScalar: ComplexField<RealField = f64> + Copy {}

impl RitzScalar for f64 {}

impl RitzScalar for Complex<f64> {}
