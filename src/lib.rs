pub mod error;
pub mod io;
pub mod kernels;
pub mod ortho;
pub mod permute;
pub mod refined;
pub mod report;
pub mod scalar;
pub mod solve;
pub mod subspace;
pub mod target;

pub use error::ProjectionError;
pub use kernels::{NalgebraKernels, SvdKernel, SymmetricEigenKernel};
pub use ortho::{GlobalReduce, GramSchmidt, Orthogonalizer, SingleProcess};
pub use permute::{permute_columns, permute_in_place};
pub use refined::{RefinedBasis, RefinedState};
pub use scalar::RitzScalar;
pub use solve::{
    ProjectedEigensolver, ProjectedProblem, Projection, RefinedScheme, RitzPairs, SolveContext,
    SolverConfig,
};
pub use target::{ordering_permutation, Target, TargetSpec};
