// src/solve.rs

//! Solving the projected eigenproblem `H = Vᴴ·A·V` of one outer iteration.
//!
//! The eigenpairs of `H` come back from the dense kernel in ascending order. They are
//! reordered for the configured target and, for interior targets with refined
//! projection, the leading pair is replaced by the refined one.

use crate::error::ProjectionError;
use crate::kernels::{hermitian_from_upper, EigenDecomposition, NalgebraKernels, SvdKernel, SymmetricEigenKernel};
use crate::ortho::{GramSchmidt, Orthogonalizer};
use crate::permute::{permute_columns, permute_in_place};
use crate::refined::{self, RefinedBasis};
use crate::scalar::RitzScalar;
use crate::target::{ordering_permutation, Target, TargetSpec};
use log::{debug, trace, warn};
use nalgebra::DMatrix;
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinedScheme {
    /// One accurate shift per restart cycle, QR of `W - σV` updated one column at a time.
    OneAccuShiftQr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    RayleighRitz,
    Refined(RefinedScheme),
}

/// Solver configuration, fixed for the lifetime of a [`ProjectedEigensolver`].
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub target: TargetSpec,
    pub projection: Projection,
    pub machine_eps: f64,
    pub max_basis_size: usize,
}

impl SolverConfig {
    pub fn new(max_basis_size: usize, target: TargetSpec) -> Result<Self, ProjectionError> {
        let config = SolverConfig {
            target,
            projection: Projection::RayleighRitz,
            machine_eps: f64::EPSILON,
            max_basis_size,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_machine_eps(mut self, machine_eps: f64) -> Self {
        self.machine_eps = machine_eps;
        self
    }

    pub fn validate(&self) -> Result<(), ProjectionError> {
        if self.max_basis_size == 0 {
            return Err(ProjectionError::InvalidInput("max basis size must be positive".into()));
        }
        if !(self.machine_eps > 0.0 && self.machine_eps < 1.0) {
            return Err(ProjectionError::InvalidInput(format!(
                "machine epsilon {} outside (0, 1)",
                self.machine_eps
            )));
        }
        self.target.validate()
    }

    fn mode(&self) -> ExtractionMode {
        match self.target.target {
            Target::Smallest => ExtractionMode::Smallest,
            Target::Largest => ExtractionMode::Largest,
            target => ExtractionMode::Interior {
                target,
                refined: self.projection == Projection::Refined(RefinedScheme::OneAccuShiftQr),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ExtractionMode {
    Smallest,
    Largest,
    Interior { target: Target, refined: bool },
}

/// State owned by the calling solve and carried across projected solves.
#[derive(Debug, Clone, Default)]
pub struct SolveContext {
    largest_ritz_value: f64,
}

impl SolveContext {
    pub fn new() -> Self {
        SolveContext::default()
    }

    /// Largest absolute Ritz value seen so far; an estimate of `‖A‖`.
    pub fn largest_ritz_value(&self) -> f64 {
        self.largest_ritz_value
    }

    /// Forgets the norm estimate, for the start of a fresh solve.
    pub fn reset(&mut self) {
        self.largest_ritz_value = 0.0;
    }

    fn observe(&mut self, first: f64, last: f64) {
        self.largest_ritz_value = self.largest_ritz_value.max(first.abs()).max(last.abs());
    }
}

/// Ritz values and vectors of `H` in target order.
#[derive(Debug, Clone)]
pub struct RitzPairs<T: RitzScalar> {
    pub values: Vec<f64>,
    /// `basis_size × basis_size`, column `i` belongs to `values[i]`.
    pub vectors: DMatrix<T>,
    /// Ascending singular values of the shifted factor, after a refined extraction.
    pub singular_values: Option<Vec<f64>>,
}

/// One projected eigenproblem.
pub struct ProjectedProblem<'a, T: RitzScalar> {
    /// Upper triangle of the leading `basis_size` block is read.
    pub h: &'a DMatrix<T>,
    pub basis_size: usize,
    pub num_locked: usize,
    /// Required by refined projection, ignored otherwise.
    pub refined: Option<RefinedBasis<'a, T>>,
}

impl<'a, T: RitzScalar> ProjectedProblem<'a, T> {
    pub fn new(h: &'a DMatrix<T>, basis_size: usize, num_locked: usize) -> Self {
        ProjectedProblem { h, basis_size, num_locked, refined: None }
    }

    pub fn with_refined(mut self, refined: RefinedBasis<'a, T>) -> Self {
        self.refined = Some(refined);
        self
    }
}

pub struct ProjectedEigensolver<T: RitzScalar, K = NalgebraKernels, O = GramSchmidt> {
    config: SolverConfig,
    kernels: K,
    ortho: O,
    _scalar: PhantomData<T>,
}

impl<T: RitzScalar> ProjectedEigensolver<T> {
    pub fn new(config: SolverConfig) -> Result<Self, ProjectionError> {
        Self::with_collaborators(config, NalgebraKernels::default(), GramSchmidt::default())
    }
}

impl<T, K, O> ProjectedEigensolver<T, K, O>
where
    T: RitzScalar,
    K: SymmetricEigenKernel<T> + SvdKernel<T>,
    O: Orthogonalizer<T>,
{
    pub fn with_collaborators(config: SolverConfig, kernels: K, ortho: O) -> Result<Self, ProjectionError> {
        config.validate()?;
        Ok(ProjectedEigensolver { config, kernels, ortho, _scalar: PhantomData })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Computes the Ritz pairs of `problem.h` in target order and updates the norm
    /// estimate in `ctx`. On error no pairs are returned and `ctx` may already hold the
    /// update from this call's eigenvalues.
    pub fn solve(
        &mut self,
        ctx: &mut SolveContext,
        problem: ProjectedProblem<'_, T>,
    ) -> Result<RitzPairs<T>, ProjectionError> {
        let ProjectedProblem { h, basis_size, num_locked, refined: refined_basis } = problem;
        let n = basis_size;
        self.check_dimensions(h, n)?;
        let mode = self.config.mode();

        let work = hermitian_from_upper(h, n, matches!(mode, ExtractionMode::Largest));
        let EigenDecomposition { mut values, mut vectors } = self
            .kernels
            .eigh(work)
            .map_err(|info| ProjectionError::DenseEigensolveFailure { info })?;

        ctx.observe(values[0], values[n - 1]);

        let mut singular_values = None;
        match mode {
            ExtractionMode::Smallest => {}
            ExtractionMode::Largest => values.iter_mut().for_each(|v| *v = -*v),
            ExtractionMode::Interior { target, refined: use_refined } => {
                let shift = self.active_shift(num_locked)?;
                let perm = ordering_permutation(target, &values, shift);
                trace!("ordering {target:?} around {shift}: {perm:?}");

                let mut value_perm = perm.clone();
                permute_in_place(&mut values, 1, &mut value_perm, &mut [0.0]);
                let mut vector_perm = perm;
                permute_columns(&mut vectors, &mut vector_perm);

                match (use_refined, refined_basis) {
                    (true, Some(basis)) => {
                        basis.validate(n)?;
                        let refined_shift = self.active_shift(num_locked + basis.recently_converged)?;
                        singular_values = Some(refined::extract(
                            basis,
                            refined_shift,
                            h,
                            n,
                            &mut values,
                            &mut vectors,
                            &mut self.kernels,
                            &mut self.ortho,
                            self.config.machine_eps,
                        )?);
                    }
                    (true, None) => {
                        return Err(ProjectionError::InvalidInput(
                            "refined projection requires the basis V and W = A·V".into(),
                        ));
                    }
                    (false, Some(_)) => warn!("refined basis supplied to a Rayleigh-Ritz solve, ignoring it"),
                    (false, None) => {}
                }
            }
        }

        debug!(
            "projected solve: basis size {n}, locked {num_locked}, first Ritz value {}, norm estimate {}",
            values[0],
            ctx.largest_ritz_value()
        );

        Ok(RitzPairs { values, vectors, singular_values })
    }

    fn active_shift(&self, num_locked: usize) -> Result<f64, ProjectionError> {
        self.config
            .target
            .active_shift(num_locked)
            .ok_or_else(|| ProjectionError::InvalidInput("interior target without shifts".into()))
    }

    fn check_dimensions(&self, h: &DMatrix<T>, n: usize) -> Result<(), ProjectionError> {
        if n == 0 || n > self.config.max_basis_size {
            return Err(ProjectionError::InvalidInput(format!(
                "basis size {} outside 1..={}",
                n, self.config.max_basis_size
            )));
        }
        if h.nrows() < n || h.ncols() < n {
            return Err(ProjectionError::InvalidInput(format!(
                "H is {}x{}, smaller than the basis size {}",
                h.nrows(),
                h.ncols(),
                n
            )));
        }
        Ok(())
    }
}
