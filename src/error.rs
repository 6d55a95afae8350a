// src/error.rs

//! Failure kinds of a projected eigensolve.
//!
//! Every variant is fatal to the call that produced it. The outer driver is expected to
//! abort the corresponding solve attempt; nothing here is retried.

/// Status returned when the dense symmetric eigensolve kernel fails.
pub const DENSE_EIGENSOLVE_FAILURE: i32 = -1;
/// Status returned when the dense SVD kernel fails.
pub const DENSE_SVD_FAILURE: i32 = -2;
/// Status returned when orthogonalization of the shifted basis fails.
pub const ORTHOGONALIZATION_FAILURE: i32 = -3;
/// Status returned when the call arguments violate the solver contract.
pub const INVALID_INPUT: i32 = -4;

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// The symmetric/Hermitian eigensolve kernel did not converge.
    #[error("dense symmetric eigensolve failed (info = {info})")]
    DenseEigensolveFailure { info: i32 },

    /// The SVD kernel used by refined extraction did not converge.
    #[error("dense SVD failed (info = {info})")]
    DenseSvdFailure { info: i32 },

    /// Rank deficiency or a failed global reduction while orthogonalizing.
    #[error("orthogonalization failed (status = {status})")]
    OrthogonalizationFailure { status: i32 },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ProjectionError {
    /// Integer status distinguishing the failure kinds, for outer-solver diagnostics.
    pub fn code(&self) -> i32 {
        match self {
            Self::DenseEigensolveFailure { .. } => DENSE_EIGENSOLVE_FAILURE,
            Self::DenseSvdFailure { .. } => DENSE_SVD_FAILURE,
            Self::OrthogonalizationFailure { .. } => ORTHOGONALIZATION_FAILURE,
            Self::InvalidInput(_) => INVALID_INPUT,
        }
    }
}
