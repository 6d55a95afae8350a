// tests/test_refined.rs

use approx::assert_abs_diff_eq;
use nalgebra::{Complex, DMatrix, DVector};
use projeig::kernels::{EigenDecomposition, RightSingularVectors};
use projeig::subspace::SubspaceSnapshot;
use projeig::{
    NalgebraKernels, Orthogonalizer, ProjectedEigensolver, ProjectedProblem, Projection, ProjectionError,
    RefinedBasis, RefinedScheme, RefinedState, RitzScalar, SolveContext, SolverConfig, SvdKernel,
    SymmetricEigenKernel, Target, TargetSpec,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::ops::Range;

const ORDER: usize = 30;
const PLANTED: usize = 14; // eigenvalue 15

fn diagonal_operator(n: usize) -> DMatrix<f64> {
    DMatrix::from_diagonal(&DVector::from_fn(n, |i, _| (i + 1) as f64))
}

// The first columns are the unit vectors `planted` perturbed by `delta`, the rest are
// random. The same seed always gives the same perturbations.
fn start_columns(n: usize, k: usize, planted: &[usize], delta: f64, seed: u64) -> DMatrix<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut start = DMatrix::from_fn(n, k, |_, _| normal.sample(&mut rng));
    for (j, &axis) in planted.iter().enumerate() {
        let mut column = start.column_mut(j);
        column *= delta;
        column[axis] += 1.0;
    }
    start
}

fn refined_config(max_basis_size: usize, shifts: Vec<f64>) -> SolverConfig {
    SolverConfig::new(max_basis_size, TargetSpec::interior(Target::ClosestAbs, shifts).unwrap())
        .unwrap()
        .with_projection(Projection::Refined(RefinedScheme::OneAccuShiftQr))
}

fn refined_solver(max_basis_size: usize, shifts: Vec<f64>) -> ProjectedEigensolver<f64> {
    ProjectedEigensolver::new(refined_config(max_basis_size, shifts)).unwrap()
}

// Norm of the part of `x` off the coordinate axis `axis`, relative to `‖x‖`.
fn off_axis<T: RitzScalar>(x: &DVector<T>, axis: usize) -> f64 {
    let off: f64 = x
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != axis)
        .map(|(_, v)| v.modulus_squared())
        .sum();
    off.sqrt() / x.norm()
}

fn leading_block<T: RitzScalar>(h: &DMatrix<T>, n: usize) -> DMatrix<T> {
    h.view((0, 0), (n, n)).into_owned()
}

#[test]
fn test_refined_vector_converges_with_the_perturbation() {
    let mut previous = f64::INFINITY;

    for delta in [1e-1, 1e-3, 1e-6] {
        let start = start_columns(ORDER, 6, &[PLANTED], delta, 21);
        let snapshot = SubspaceSnapshot::from_columns(diagonal_operator(ORDER), &start, 7, 3).unwrap();
        let mut state = RefinedState::new(ORDER, 7);
        let mut ctx = SolveContext::new();

        let problem = ProjectedProblem::new(snapshot.h(), 6, 0)
            .with_refined(RefinedBasis::new(&mut state, snapshot.v(), snapshot.w()));
        let pairs = refined_solver(7, vec![15.0]).solve(&mut ctx, problem).unwrap();

        let y = pairs.vectors.column(0).into_owned();
        let error = off_axis(&snapshot.lift(&y), PLANTED);
        assert!(error < 200.0 * delta, "delta {delta}: error {error}");
        assert!(error < previous, "delta {delta}: error {error} not below {previous}");
        previous = error;

        // The returned value is the Rayleigh quotient of the refined vector.
        let h = leading_block(snapshot.h(), 6);
        assert_abs_diff_eq!(pairs.values[0], y.dot(&(&h * &y)), epsilon = 1e-10);
        assert!((pairs.values[0] - 15.0).abs() < 30.0 * (200.0 * delta).powi(2) + 1e-10);

        // The smallest singular value is the residual of the refined vector at the shift.
        let singular_values = pairs.singular_values.expect("refined solve returns singular values");
        assert_eq!(singular_values.len(), 6);
        assert!(singular_values.windows(2).all(|w| w[0] <= w[1]));
        assert_abs_diff_eq!(singular_values[0], snapshot.residual_norm(&y, 15.0), epsilon = 1e-10);
    }
}

#[test]
fn test_refined_vectors_are_orthonormal() {
    let start = start_columns(ORDER, 5, &[PLANTED], 1e-2, 5);
    let snapshot = SubspaceSnapshot::from_columns(diagonal_operator(ORDER), &start, 6, 5).unwrap();
    let mut state = RefinedState::new(ORDER, 6);

    let problem = ProjectedProblem::new(snapshot.h(), 5, 0)
        .with_refined(RefinedBasis::new(&mut state, snapshot.v(), snapshot.w()));
    let pairs = refined_solver(6, vec![15.0]).solve(&mut SolveContext::new(), problem).unwrap();

    let gram = pairs.vectors.transpose() * &pairs.vectors;
    assert_abs_diff_eq!(gram, DMatrix::identity(5, 5), epsilon = 1e-10);
}

#[test]
fn test_incremental_update_matches_a_rebuild() {
    let start = start_columns(ORDER, 6, &[PLANTED], 1e-2, 8);
    let mut snapshot =
        SubspaceSnapshot::from_columns(diagonal_operator(ORDER), &start.columns(0, 5).into_owned(), 7, 8).unwrap();
    let mut solver = refined_solver(7, vec![15.0]);
    let mut ctx = SolveContext::new();
    let mut state = RefinedState::new(ORDER, 7);

    {
        let problem = ProjectedProblem::new(snapshot.h(), 5, 0)
            .with_refined(RefinedBasis::new(&mut state, snapshot.v(), snapshot.w()));
        solver.solve(&mut ctx, problem).unwrap();
    }
    assert!(!state.needs_full_rebuild());
    assert_eq!(snapshot.basis_size(), 5);
    assert_eq!(snapshot.capacity(), 7);

    snapshot.extend(&start.column(5).into_owned()).unwrap();
    assert_eq!(snapshot.basis_size(), 6);

    let incremental = {
        let problem = ProjectedProblem::new(snapshot.h(), 6, 0)
            .with_refined(RefinedBasis::new(&mut state, snapshot.v(), snapshot.w()));
        solver.solve(&mut ctx, problem).unwrap()
    };

    let mut fresh_state = RefinedState::new(ORDER, 7);
    let fresh = {
        let problem = ProjectedProblem::new(snapshot.h(), 6, 0)
            .with_refined(RefinedBasis::new(&mut fresh_state, snapshot.v(), snapshot.w()));
        solver.solve(&mut ctx, problem).unwrap()
    };

    let incremental_sv = incremental.singular_values.unwrap();
    let fresh_sv = fresh.singular_values.unwrap();
    for (a, b) in incremental_sv.iter().zip(fresh_sv.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
    }
    assert_abs_diff_eq!(incremental.values[0], fresh.values[0], epsilon = 1e-10);

    let overlap = incremental.vectors.column(0).dot(&fresh.vectors.column(0)).abs();
    assert_abs_diff_eq!(overlap, 1.0, epsilon = 1e-8);

    // Q·R reproduces the shifted basis column by column.
    let q = state.q().columns(0, 6);
    let r = state.r().view((0, 0), (6, 6)).upper_triangle();
    let shifted = snapshot.w().columns(0, 6) - snapshot.v().columns(0, 6) * 15.0;
    assert_abs_diff_eq!(q * r, shifted, epsilon = 1e-10);
}

#[test]
fn test_restart_forces_a_rebuild() {
    let start = start_columns(ORDER, 4, &[PLANTED], 1e-2, 9);
    let snapshot = SubspaceSnapshot::from_columns(diagonal_operator(ORDER), &start, 6, 9).unwrap();
    let mut state = RefinedState::new(ORDER, 6);
    assert!(state.needs_full_rebuild());
    assert_eq!(state.n_local(), ORDER);
    assert_eq!(state.max_basis_size(), 6);

    {
        let problem = ProjectedProblem::new(snapshot.h(), 4, 0)
            .with_refined(RefinedBasis::new(&mut state, snapshot.v(), snapshot.w()));
        refined_solver(6, vec![15.0]).solve(&mut SolveContext::new(), problem).unwrap();
    }
    assert!(!state.needs_full_rebuild());

    state.restart();
    assert!(state.needs_full_rebuild());
}

#[test]
fn test_trailing_column_of_r_is_cleared_one_below_capacity() {
    let start = start_columns(ORDER, 7, &[PLANTED], 1e-2, 10);
    let snapshot = SubspaceSnapshot::from_columns(diagonal_operator(ORDER), &start, 7, 10).unwrap();
    let mut state = RefinedState::new(ORDER, 7);
    let mut solver = refined_solver(7, vec![15.0]);
    let mut ctx = SolveContext::new();

    {
        let problem = ProjectedProblem::new(snapshot.h(), 7, 0)
            .with_refined(RefinedBasis::new(&mut state, snapshot.v(), snapshot.w()));
        solver.solve(&mut ctx, problem).unwrap();
    }
    assert!(state.r()[(6, 6)].abs() > 0.0);

    {
        let problem = ProjectedProblem::new(snapshot.h(), 6, 0)
            .with_refined(RefinedBasis::new(&mut state, snapshot.v(), snapshot.w()));
        solver.solve(&mut ctx, problem).unwrap();
    }
    assert!(state.r().column(6).iter().all(|&x| x == 0.0));
}

#[test]
fn test_recently_converged_pairs_advance_the_refined_shift() {
    let start = start_columns(ORDER, 6, &[PLANTED, 19], 1e-6, 12);
    let snapshot = SubspaceSnapshot::from_columns(diagonal_operator(ORDER), &start, 7, 12).unwrap();
    let mut state = RefinedState::new(ORDER, 7);

    let problem = ProjectedProblem::new(snapshot.h(), 6, 0).with_refined(
        RefinedBasis::new(&mut state, snapshot.v(), snapshot.w()).recently_converged(1),
    );
    let pairs = refined_solver(7, vec![15.0, 20.0]).solve(&mut SolveContext::new(), problem).unwrap();

    let y = pairs.vectors.column(0).into_owned();
    let singular_values = pairs.singular_values.unwrap();
    assert_abs_diff_eq!(singular_values[0], snapshot.residual_norm(&y, 20.0), epsilon = 1e-10);
    assert!(off_axis(&snapshot.lift(&y), 19) < 1e-2);
    assert!((pairs.values[0] - 20.0).abs() < 1e-3);
}

#[test]
fn test_extreme_targets_skip_refinement() {
    let start = start_columns(ORDER, 4, &[PLANTED], 1e-2, 13);
    let snapshot = SubspaceSnapshot::from_columns(diagonal_operator(ORDER), &start, 5, 13).unwrap();
    let mut state = RefinedState::new(ORDER, 5);

    let config = SolverConfig::new(5, TargetSpec::smallest())
        .unwrap()
        .with_projection(Projection::Refined(RefinedScheme::OneAccuShiftQr));
    let problem = ProjectedProblem::new(snapshot.h(), 4, 0)
        .with_refined(RefinedBasis::new(&mut state, snapshot.v(), snapshot.w()));
    let pairs = ProjectedEigensolver::<f64>::new(config)
        .unwrap()
        .solve(&mut SolveContext::new(), problem)
        .unwrap();

    assert!(pairs.singular_values.is_none());
    assert!(pairs.values.windows(2).all(|w| w[0] <= w[1]));
    assert!(state.needs_full_rebuild());
}

#[test]
fn test_mismatched_basis_is_rejected() {
    let start = start_columns(ORDER, 4, &[PLANTED], 1e-2, 14);
    let snapshot = SubspaceSnapshot::from_columns(diagonal_operator(ORDER), &start, 5, 14).unwrap();
    let mut state = RefinedState::new(ORDER - 1, 5);

    let problem = ProjectedProblem::new(snapshot.h(), 4, 0)
        .with_refined(RefinedBasis::new(&mut state, snapshot.v(), snapshot.w()));
    let err = refined_solver(5, vec![15.0]).solve(&mut SolveContext::new(), problem).unwrap_err();
    assert!(matches!(err, ProjectionError::InvalidInput(_)));
}

struct FailingOrtho;

impl Orthogonalizer<f64> for FailingOrtho {
    fn orthogonalize(
        &mut self,
        _basis: &mut DMatrix<f64>,
        _r: &mut DMatrix<f64>,
        _columns: Range<usize>,
        _machine_eps: f64,
    ) -> Result<(), i32> {
        Err(projeig::ortho::RANK_DEFICIENT)
    }
}

struct FailingSvd(NalgebraKernels);

impl SymmetricEigenKernel<f64> for FailingSvd {
    fn eigh(&mut self, matrix: DMatrix<f64>) -> Result<EigenDecomposition<f64>, i32> {
        self.0.eigh(matrix)
    }
}

impl SvdKernel<f64> for FailingSvd {
    fn right_svd(&mut self, _matrix: DMatrix<f64>) -> Result<RightSingularVectors<f64>, i32> {
        Err(5)
    }
}

#[test]
fn test_collaborator_failures_are_reported() {
    let start = start_columns(ORDER, 4, &[PLANTED], 1e-2, 15);
    let snapshot = SubspaceSnapshot::from_columns(diagonal_operator(ORDER), &start, 5, 15).unwrap();

    let mut state = RefinedState::new(ORDER, 5);
    let mut solver = ProjectedEigensolver::<f64, _, _>::with_collaborators(
        refined_config(5, vec![15.0]),
        NalgebraKernels::default(),
        FailingOrtho,
    )
    .unwrap();
    let problem = ProjectedProblem::new(snapshot.h(), 4, 0)
        .with_refined(RefinedBasis::new(&mut state, snapshot.v(), snapshot.w()));
    let err = solver.solve(&mut SolveContext::new(), problem).unwrap_err();
    assert!(matches!(err, ProjectionError::OrthogonalizationFailure { status: -3 }));
    assert_eq!(err.code(), projeig::error::ORTHOGONALIZATION_FAILURE);

    let mut state = RefinedState::new(ORDER, 5);
    let mut solver = ProjectedEigensolver::<f64, _, _>::with_collaborators(
        refined_config(5, vec![15.0]),
        FailingSvd(NalgebraKernels::default()),
        projeig::GramSchmidt::default(),
    )
    .unwrap();
    let problem = ProjectedProblem::new(snapshot.h(), 4, 0)
        .with_refined(RefinedBasis::new(&mut state, snapshot.v(), snapshot.w()));
    let err = solver.solve(&mut SolveContext::new(), problem).unwrap_err();
    assert!(matches!(err, ProjectionError::DenseSvdFailure { info: 5 }));
    assert_eq!(err.code(), projeig::error::DENSE_SVD_FAILURE);
}

#[test]
fn test_non_finite_shifted_basis_is_an_svd_failure() {
    let start = start_columns(ORDER, 4, &[PLANTED], 1e-2, 17);
    let snapshot = SubspaceSnapshot::from_columns(diagonal_operator(ORDER), &start, 5, 17).unwrap();
    let mut w = snapshot.w().clone();
    w[(0, 2)] = f64::NAN;

    // H stays finite, so only the factor of the shifted basis sees the NaN.
    let mut state = RefinedState::new(ORDER, 5);
    let problem = ProjectedProblem::new(snapshot.h(), 4, 0)
        .with_refined(RefinedBasis::new(&mut state, snapshot.v(), &w));
    let err = refined_solver(5, vec![15.0]).solve(&mut SolveContext::new(), problem).unwrap_err();

    assert!(matches!(err, ProjectionError::DenseSvdFailure { info: 1 }));
    assert_eq!(err.code(), projeig::error::DENSE_SVD_FAILURE);
}

#[test]
fn test_complex_hermitian_refinement() {
    let n = 12;
    let operator = DMatrix::from_diagonal(&DVector::from_fn(n, |i, _| Complex::new((i + 1) as f64, 0.0)));
    let mut rng = ChaCha8Rng::seed_from_u64(16);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut start =
        DMatrix::from_fn(n, 4, |_, _| Complex::new(normal.sample(&mut rng), normal.sample(&mut rng)));
    {
        let mut planted = start.column_mut(0);
        planted *= Complex::new(1e-6, 0.0);
        planted[5] += Complex::new(0.6, 0.8);
    }

    let snapshot = SubspaceSnapshot::from_columns(operator, &start, 5, 16).unwrap();
    let mut state = RefinedState::new(n, 5);
    let config = refined_config(5, vec![6.0]);
    let problem = ProjectedProblem::new(snapshot.h(), 4, 0)
        .with_refined(RefinedBasis::new(&mut state, snapshot.v(), snapshot.w()));
    let pairs = ProjectedEigensolver::<Complex<f64>>::new(config)
        .unwrap()
        .solve(&mut SolveContext::new(), problem)
        .unwrap();

    let y = pairs.vectors.column(0).into_owned();
    let singular_values = pairs.singular_values.unwrap();
    assert_abs_diff_eq!(singular_values[0], snapshot.residual_norm(&y, 6.0), epsilon = 1e-10);
    assert!(off_axis(&snapshot.lift(&y), 5) < 1e-2);

    let h = leading_block(snapshot.h(), 4);
    assert_abs_diff_eq!(pairs.values[0], y.dotc(&(&h * &y)).re, epsilon = 1e-10);

    let gram = pairs.vectors.adjoint() * &pairs.vectors;
    for i in 0..4 {
        for j in 0..4 {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_abs_diff_eq!(gram[(i, j)].re, expected, epsilon = 1e-10);
            assert_abs_diff_eq!(gram[(i, j)].im, 0.0, epsilon = 1e-10);
        }
    }
}
