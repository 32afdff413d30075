use std::collections::BTreeMap;

use argmin::{
    core::{
        observers::{Observe, ObserverMode},
        Error, Executor, Operator, State, KV,
    },
    solver::conjugategradient::ConjugateGradient,
};
use indicatif::ProgressBar;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{factorization::CscCholesky, CooMatrix, CscMatrix, CsrMatrix};
use rayon::prelude::*;

use crate::{
    datatypes::{CellType, StressTensor, Vertex},
    elements,
    error::{ElastomerError, Result},
    field::{FieldContainer, SolidBody},
};

pub const DEFAULT_TOLERANCE: f64 = 1e-2;
pub const DEFAULT_MAX_ITERATIONS: usize = 8;
pub const TARGET_CG_RELATIVE_COST: f64 = 1e-10;
pub const CG_ITERATIONS_PER_DOF: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveOptions {
    /// Residual norm of the free dofs relative to the reaction norm
    pub tolerance: f64,
    /// Newton-Raphson iteration budget per increment
    pub max_iterations: usize,
    pub verbose: bool,
    /// Hint that element matrices may be computed on the rayon pool.
    /// Never changes results.
    pub parallel: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            verbose: false,
            parallel: false,
        }
    }
}

/// One displacement-controlled increment handed to an engine
pub struct Problem<'a> {
    pub field: &'a FieldContainer,
    pub bodies: &'a [SolidBody],
    /// Prescribed value per constrained dof
    pub constraints: &'a BTreeMap<usize, f64>,
    /// Converged displacement of the previous increment
    pub initial: &'a DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub displacement: DVector<f64>,
    /// Internal force vector; non-zero entries sit on constrained dofs
    pub reactions: DVector<f64>,
    pub iterations: usize,
    pub residual: f64,
}

/// The finite-element collaborator the pipeline drives
pub trait Engine: Sync {
    /// Solves one increment to the requested tolerance, or fails with
    /// `ElastomerError::Convergence`. Engines never retry on their own.
    fn solve(&self, problem: &Problem<'_>, options: &SolveOptions) -> Result<Solution>;

    /// Cell-averaged stresses, body by body in cell order
    fn stresses(
        &self,
        field: &FieldContainer,
        bodies: &[SolidBody],
        displacement: &DVector<f64>,
    ) -> Result<Vec<StressTensor>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinearSolver {
    #[default]
    Cholesky,
    ConjugateGradient,
}

/// Small-strain engine: every material is linearized about the reference
/// configuration and increments are solved by Newton-Raphson on the force
/// residual.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearElasticEngine {
    pub linear_solver: LinearSolver,
}

impl LinearElasticEngine {
    pub fn new(linear_solver: LinearSolver) -> LinearElasticEngine {
        LinearElasticEngine { linear_solver }
    }
}

/// Runs multiplication for Conjugate Gradient Solver
struct ConjugateGradientOperator<'a> {
    a: &'a CsrMatrix<f64>,
}

impl<'a> Operator for ConjugateGradientOperator<'a> {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, x: &Self::Param) -> std::result::Result<Self::Output, Error> {
        Ok(sparse_mul(self.a, x))
    }
}

/// Observer bar for argmin solver
struct ConjugateGradientObserverBar {
    bar: ProgressBar,
    initial_cost: Option<f64>,
    target_cost: f64,
}

impl ConjugateGradientObserverBar {
    fn new(target_cost: f64, verbose: bool) -> ConjugateGradientObserverBar {
        ConjugateGradientObserverBar {
            bar: if verbose {
                ProgressBar::new(1000)
            } else {
                ProgressBar::hidden()
            },
            initial_cost: None,
            target_cost,
        }
    }
}

impl<I> Observe<I> for ConjugateGradientObserverBar
where
    I: State<Float = f64>,
{
    fn observe_init(
        &mut self,
        _name: &str,
        _state: &I,
        _kv: &KV,
    ) -> std::result::Result<(), Error> {
        Ok(())
    }

    fn observe_iter(&mut self, state: &I, _kv: &KV) -> std::result::Result<(), Error> {
        let cost = state.get_cost();
        if !cost.is_finite() || cost <= 0.0 {
            return Ok(());
        }
        let initial = *self.initial_cost.get_or_insert(cost);
        let span = (initial.ln() - self.target_cost.ln()).max(f64::EPSILON);
        let progress = ((initial.ln() - cost.ln()) / span).clamp(0.0, 1.0);
        self.bar.set_position((1000.0 * progress) as u64);

        Ok(())
    }

    fn observe_final(&mut self, _state: &I) -> std::result::Result<(), Error> {
        self.bar.finish_and_clear();
        Ok(())
    }
}

fn sparse_mul(a: &CsrMatrix<f64>, x: &[f64]) -> Vec<f64> {
    a.row_iter()
        .map(|row| {
            row.col_indices()
                .iter()
                .zip(row.values())
                .map(|(&j, v)| v * x[j])
                .sum()
        })
        .collect()
}

/// Solves a system of equations using the conjugate gradient method.
///
/// This function returns an approximation for x in `Ax=b`
///
/// # Arguments
/// * `a` - A square positive definite matrix
/// * `b` - The right hand side of the system
/// * `verbose` - Whether to draw a progress bar
fn run_conjugate_gradient(
    a: &CsrMatrix<f64>,
    b: &DVector<f64>,
    verbose: bool,
) -> Result<DVector<f64>> {
    let b_norm = b.norm();
    if b_norm == 0.0 {
        return Ok(DVector::zeros(b.nrows()));
    }

    let b_flat: Vec<f64> = b.iter().copied().collect();
    let solver: ConjugateGradient<_, f64> = ConjugateGradient::new(b_flat);
    let initial_guess: Vec<f64> = vec![0.0; b.nrows()];
    let target_cost = TARGET_CG_RELATIVE_COST * b_norm;

    let operator = ConjugateGradientOperator { a };
    let observer = ConjugateGradientObserverBar::new(target_cost, verbose);

    let res = match Executor::new(operator, solver)
        .configure(|state| {
            state
                .param(initial_guess)
                .max_iters(CG_ITERATIONS_PER_DOF * b.nrows() as u64)
                .target_cost(target_cost)
        })
        .add_observer(observer, ObserverMode::NewBest)
        .run()
    {
        Ok(r) => r,
        Err(err) => {
            return Err(ElastomerError::Solver(format!(
                "Conjugate Gradient error: {err}"
            )))
        }
    };

    match &res.state().best_param {
        Some(vec) => Ok(DVector::from_vec(vec.clone())),
        None => Err(ElastomerError::Solver(
            "Conjugate Gradient could not produce best parameter".to_owned(),
        )),
    }
}

fn run_cholesky(a: &CsrMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    let csc = CscMatrix::from(a);
    let factor = match CscCholesky::factor(&csc) {
        Ok(f) => f,
        Err(err) => {
            return Err(ElastomerError::Solver(format!(
                "Cholesky factorization failed, is the model constrained? ({err:?})"
            )))
        }
    };
    let rhs = DMatrix::from_column_slice(b.nrows(), 1, b.as_slice());
    let x = factor.solve(&rhs);
    Ok(DVector::from_iterator(b.nrows(), x.column(0).iter().copied()))
}

fn cell_coords(points: &[Vertex], cell: &[usize]) -> Vec<Vertex> {
    cell.iter().map(|&p| points[p]).collect()
}

fn cell_dofs(cell: &[usize], dim: usize) -> Vec<usize> {
    cell.iter()
        .flat_map(|&p| (0..dim).map(move |c| p * dim + c))
        .collect()
}

/// Compiles element stiffness matrices into the total stiffness matrix
///
/// # Arguments
/// * `field` - The field container holding points and cells
/// * `bodies` - Materials per field
/// * `parallel` - Compute element matrices on the rayon pool
///
/// # Returns
/// The sparse total stiffness matrix, one row per dof
fn build_total_stiffness_matrix(
    field: &FieldContainer,
    bodies: &[SolidBody],
    parallel: bool,
) -> Result<CsrMatrix<f64>> {
    let dim = field.dim();
    let mut cells: Vec<(CellType, &[usize], &SolidBody)> = Vec::new();
    for body in bodies {
        let region = match field.fields.get(body.field) {
            Some(f) => &f.region,
            None => {
                return Err(ElastomerError::Model(format!(
                    "Body refers to missing field {}",
                    body.field
                )))
            }
        };
        for cell in &region.cells {
            cells.push((region.cell_type, cell.as_slice(), body));
        }
    }

    let compute = |(cell_type, cell, body): &(CellType, &[usize], &SolidBody)| {
        elements::element_stiffness(*cell_type, &cell_coords(&field.points, cell), &body.material)
    };
    let element_matrices: Vec<DMatrix<f64>> = if parallel {
        cells.par_iter().map(compute).collect::<Result<_>>()?
    } else {
        cells.iter().map(compute).collect::<Result<_>>()?
    };

    // summation order is fixed regardless of how the matrices were computed
    let mut coo = CooMatrix::new(field.ndof(), field.ndof());
    for ((_, cell, _), k) in cells.iter().zip(&element_matrices) {
        let dofs = cell_dofs(cell, dim);
        for (local_row, &row) in dofs.iter().enumerate() {
            for (local_col, &col) in dofs.iter().enumerate() {
                coo.push(row, col, k[(local_row, local_col)]);
            }
        }
    }

    Ok(CsrMatrix::from(&coo))
}

/// Restricts the stiffness matrix to the free dofs
///
/// # Returns
/// The reduced matrix and the list of free dofs, in reduced order
fn build_free_matrix(
    total_stiffness_matrix: &CsrMatrix<f64>,
    constraints: &BTreeMap<usize, f64>,
) -> (CsrMatrix<f64>, Vec<usize>) {
    let ndof = total_stiffness_matrix.nrows();
    let mut reduced_index: Vec<Option<usize>> = vec![None; ndof];
    let mut free = Vec::with_capacity(ndof - constraints.len().min(ndof));
    for dof in 0..ndof {
        if !constraints.contains_key(&dof) {
            reduced_index[dof] = Some(free.len());
            free.push(dof);
        }
    }

    let mut coo = CooMatrix::new(free.len(), free.len());
    for (row, col, value) in total_stiffness_matrix.triplet_iter() {
        if let (Some(i), Some(j)) = (reduced_index[row], reduced_index[col]) {
            coo.push(i, j, *value);
        }
    }

    (CsrMatrix::from(&coo), free)
}

fn norm_over<'a>(values: &DVector<f64>, dofs: impl Iterator<Item = &'a usize>) -> f64 {
    dofs.map(|&d| values[d] * values[d]).sum::<f64>().sqrt()
}

impl LinearElasticEngine {
    fn linear_solve(
        &self,
        a: &CsrMatrix<f64>,
        b: &DVector<f64>,
        verbose: bool,
    ) -> Result<DVector<f64>> {
        match self.linear_solver {
            LinearSolver::Cholesky => run_cholesky(a, b),
            LinearSolver::ConjugateGradient => run_conjugate_gradient(a, b, verbose),
        }
    }
}

impl Engine for LinearElasticEngine {
    fn solve(&self, problem: &Problem<'_>, options: &SolveOptions) -> Result<Solution> {
        let field = problem.field;
        let ndof = field.ndof();
        if problem.initial.nrows() != ndof {
            return Err(ElastomerError::Model(format!(
                "Initial displacement has {} entries, field has {} dofs",
                problem.initial.nrows(),
                ndof
            )));
        }
        if let Some(dof) = problem.constraints.keys().find(|&&d| d >= ndof) {
            return Err(ElastomerError::Model(format!(
                "Constraint on dof {dof} outside the field"
            )));
        }

        let total_stiffness_matrix =
            build_total_stiffness_matrix(field, problem.bodies, options.parallel)?;
        let (free_matrix, free) = build_free_matrix(&total_stiffness_matrix, problem.constraints);

        let mut u = problem.initial.clone();
        for (&dof, &value) in problem.constraints {
            u[dof] = value;
        }

        let mut iterations = 0;
        let mut initial_forces = None;
        loop {
            let forces = DVector::from_vec(sparse_mul(&total_stiffness_matrix, u.as_slice()));
            let residual = norm_over(&forces, free.iter());
            // unloaded states leave only round-off in the reactions
            let floor = f64::EPSILON.sqrt() * *initial_forces.get_or_insert_with(|| forces.norm());
            let reference = norm_over(&forces, problem.constraints.keys()).max(floor);
            let relative = if reference > 0.0 {
                residual / reference
            } else {
                residual
            };

            if relative <= options.tolerance {
                return Ok(Solution {
                    displacement: u,
                    reactions: forces,
                    iterations,
                    residual: relative,
                });
            }
            if iterations >= options.max_iterations {
                return Err(ElastomerError::Convergence(format!(
                    "residual {relative:.3e} above tolerance {:.1e} after {iterations} iterations",
                    options.tolerance
                )));
            }
            if free.is_empty() {
                return Err(ElastomerError::Convergence(
                    "fully constrained model is out of equilibrium".to_owned(),
                ));
            }

            let rhs = DVector::from_iterator(free.len(), free.iter().map(|&d| -forces[d]));
            let du = self.linear_solve(&free_matrix, &rhs, options.verbose)?;
            if du.iter().any(|v| !v.is_finite()) {
                return Err(ElastomerError::Convergence(
                    "linear solve produced non-finite displacements".to_owned(),
                ));
            }
            for (i, &dof) in free.iter().enumerate() {
                u[dof] += du[i];
            }
            iterations += 1;
        }
    }

    fn stresses(
        &self,
        field: &FieldContainer,
        bodies: &[SolidBody],
        displacement: &DVector<f64>,
    ) -> Result<Vec<StressTensor>> {
        let dim = field.dim();
        let mut stresses = Vec::new();
        for body in bodies {
            let region = match field.fields.get(body.field) {
                Some(f) => &f.region,
                None => {
                    return Err(ElastomerError::Model(format!(
                        "Body refers to missing field {}",
                        body.field
                    )))
                }
            };
            for cell in &region.cells {
                let u: Vec<f64> = cell_dofs(cell, dim).iter().map(|&d| displacement[d]).collect();
                stresses.push(elements::element_stress(
                    region.cell_type,
                    &cell_coords(&field.points, cell),
                    &u,
                    &body.material,
                )?);
            }
        }
        Ok(stresses)
    }
}
