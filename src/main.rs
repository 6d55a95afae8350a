use clap::{Args, Parser, Subcommand, ValueEnum};
use nalgebra::DVector;
use projeig::{
    io::{load_square_matrix_csv, save_matrix_csv, save_vector_csv},
    report::print_ritz_values,
    subspace::SubspaceSnapshot,
    ProjectedEigensolver, ProjectedProblem, Projection, RefinedBasis, RefinedScheme, RefinedState,
    SolveContext, SolverConfig, Target, TargetSpec,
};
use std::error::Error;
use std::path::PathBuf;

/// projeig: Ritz pairs of small projected eigenproblems
#[derive(Parser, Debug)]
#[command(
    name = "projeig",
    about = "Solve and reorder projected (Rayleigh-Ritz) eigenproblems, with refined extraction for interior targets",
    version,
    propagate_version = true,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Solve the projected eigenproblem of a matrix stored as CSV
    Solve(SolveArgs),
    /// Compare Rayleigh-Ritz and refined extraction on a random subspace of an operator
    Refine(RefineArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum TargetArg {
    Smallest,
    Largest,
    ClosestGeq,
    ClosestLeq,
    ClosestAbs,
}

impl From<TargetArg> for Target {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Smallest => Target::Smallest,
            TargetArg::Largest => Target::Largest,
            TargetArg::ClosestGeq => Target::ClosestGeq,
            TargetArg::ClosestLeq => Target::ClosestLeq,
            TargetArg::ClosestAbs => Target::ClosestAbs,
        }
    }
}

#[derive(Args, Debug)]
struct SolveArgs {
    /// Path to the projected matrix H (square CSV, upper triangle is read)
    #[arg(short, long, value_name = "H_CSV")]
    matrix: PathBuf,
    /// Which Ritz values come first
    #[arg(short, long, value_enum, default_value_t = TargetArg::Smallest)]
    target: TargetArg,
    /// Target shifts for interior targets, in locking order
    #[arg(short, long, value_name = "SHIFT", allow_negative_numbers = true)]
    shift: Vec<f64>,
    /// Number of locked eigenpairs, selects the active shift
    #[arg(long, value_name = "COUNT", default_value_t = 0)]
    locked: usize,
    /// Write the ordered Ritz values to this CSV file
    #[arg(long, value_name = "CSV")]
    values_out: Option<PathBuf>,
    /// Write the ordered Ritz vectors (as columns) to this CSV file
    #[arg(long, value_name = "CSV")]
    vectors_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RefineArgs {
    /// Path to the operator A (square symmetric CSV)
    #[arg(short, long, value_name = "A_CSV")]
    operator: PathBuf,
    /// Dimension of the search subspace
    #[arg(short, long, value_name = "K")]
    basis_size: usize,
    /// Interior shift
    #[arg(short, long, value_name = "SHIFT", allow_negative_numbers = true)]
    shift: f64,
    /// Seed for the random starting basis
    #[arg(long, default_value_t = 0x5EED)]
    seed: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Solve(args) => run_solve(args)?,
        Command::Refine(args) => run_refine(args)?,
    }

    Ok(())
}

fn run_solve(args: SolveArgs) -> Result<(), Box<dyn Error>> {
    let h = load_square_matrix_csv(&args.matrix)?;
    let basis_size = h.nrows();

    let target: Target = args.target.into();
    let spec = match target {
        Target::Smallest => TargetSpec::smallest(),
        Target::Largest => TargetSpec::largest(),
        interior => TargetSpec::interior(interior, args.shift)?,
    };
    let active_shift = spec.active_shift(args.locked);

    let config = SolverConfig::new(basis_size, spec)?;
    let mut solver = ProjectedEigensolver::<f64>::new(config)?;
    let mut ctx = SolveContext::new();

    println!(
        "Solving the {}x{} projected problem in {}",
        basis_size,
        basis_size,
        args.matrix.display()
    );
    let pairs = solver.solve(&mut ctx, ProjectedProblem::new(&h, basis_size, args.locked))?;

    match active_shift {
        Some(shift) if target.is_interior() => println!("Ritz values ordered {target:?} around {shift}:"),
        _ => println!("Ritz values ordered {target:?}:"),
    }
    print_ritz_values(&pairs.values, active_shift)?;
    println!("Largest |Ritz value| seen: {:.6e}", ctx.largest_ritz_value());

    if let Some(path) = args.values_out {
        save_vector_csv(&pairs.values, &path)?;
        println!("Ritz values written to {}", path.display());
    }
    if let Some(path) = args.vectors_out {
        save_matrix_csv(&pairs.vectors, &path)?;
        println!("Ritz vectors written to {}", path.display());
    }

    Ok(())
}

fn run_refine(args: RefineArgs) -> Result<(), Box<dyn Error>> {
    let operator = load_square_matrix_csv(&args.operator)?;
    let capacity = args.basis_size + 1;
    let snapshot = SubspaceSnapshot::from_operator(operator, args.basis_size, capacity, args.seed)?;

    let spec = TargetSpec::interior(Target::ClosestAbs, vec![args.shift])?;
    let config = SolverConfig::new(capacity, spec)?;
    let mut ctx = SolveContext::new();

    let mut plain = ProjectedEigensolver::<f64>::new(config.clone())?;
    let rr = plain.solve(&mut ctx, ProjectedProblem::new(snapshot.h(), args.basis_size, 0))?;
    let rr_vector: DVector<f64> = rr.vectors.column(0).into_owned();
    let rr_residual = snapshot.residual_norm(&rr_vector, rr.values[0]);

    let mut refined_solver =
        ProjectedEigensolver::<f64>::new(config.with_projection(Projection::Refined(RefinedScheme::OneAccuShiftQr)))?;
    let mut state = RefinedState::new(snapshot.operator().nrows(), capacity);
    let problem = ProjectedProblem::new(snapshot.h(), args.basis_size, 0)
        .with_refined(RefinedBasis::new(&mut state, snapshot.v(), snapshot.w()));
    let refined = refined_solver.solve(&mut ctx, problem)?;
    let refined_vector: DVector<f64> = refined.vectors.column(0).into_owned();
    let refined_residual = snapshot.residual_norm(&refined_vector, refined.values[0]);

    println!("Subspace of dimension {} around shift {}", args.basis_size, args.shift);
    println!("  Rayleigh-Ritz: value {:+.12e}  residual {:.3e}", rr.values[0], rr_residual);
    println!("  Refined:       value {:+.12e}  residual {:.3e}", refined.values[0], refined_residual);
    if let Some(singular_values) = &refined.singular_values {
        println!("  Smallest singular value of (A - shift I)V: {:.3e}", singular_values[0]);
    }

    Ok(())
}
