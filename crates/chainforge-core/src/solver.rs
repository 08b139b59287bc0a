//! The integer program over resource balance and the leakage-tightening
//! iteration loop built on top of it ([`best_sequence`]).
//!
//! The backend is the `highs` crate (HiGHS MILP solver). Its binding sits
//! behind [`solve_integer_lp`], a narrow signature chosen so that swapping
//! backends means reimplementing that one function.

use highs::{HighsModelStatus, RowProblem, Sense};

#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("integer LP backend reported an internal failure: {0}")]
    SolverFailure(String),
}

/// The result of one [`solve_integer_lp`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct LpSolution {
    pub success: bool,
    pub x: Vec<i64>,
}

/// Tunable bounds for one MILP solve: `1 <= x_j <= x_max`, `0 <= (A x)_i <= leakage`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    pub x_max: f64,
    pub initial_leakage: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self { x_max: 500.0, initial_leakage: 10000.0 }
    }
}

/// One emission of the leakage-tightening sequence: the epsilon used to
/// produce it, and the resulting per-process integer counts (in column order).
#[derive(Debug, Clone, PartialEq)]
pub struct LeakageSolution {
    pub epsilon: f64,
    pub counts: Vec<i64>,
}

/// Solves `min sum(x)` subject to `0 <= A x <= leakage`, `1 <= x_j <= x_max`,
/// `x` integer. `A` is row-major, one row per constraint (pool), one column
/// per variable (process).
pub fn solve_integer_lp(
    a: &[Vec<f64>],
    leakage: f64,
    x_max: f64,
) -> Result<LpSolution, SolverError> {
    let num_cols = a.first().map(|row| row.len()).unwrap_or(0);
    if num_cols == 0 {
        return Ok(LpSolution { success: true, x: Vec::new() });
    }

    let mut problem = RowProblem::default();
    let columns: Vec<_> = (0..num_cols)
        .map(|_| problem.add_integer_column(1.0, 1.0..=x_max))
        .collect();

    for row in a {
        let entries: Vec<(highs::Col, f64)> = columns
            .iter()
            .zip(row.iter())
            .map(|(&col, &coeff)| (col, coeff))
            .collect();
        problem.add_row(0.0..=leakage, entries);
    }

    let mut model = problem.optimise(Sense::Minimise);
    model.set_option("output_flag", false);
    let solved = model.solve();

    match solved.status() {
        HighsModelStatus::Optimal => {
            let solution = solved.get_solution();
            let x = solution.columns().iter().map(|v| v.round() as i64).collect();
            Ok(LpSolution { success: true, x })
        }
        HighsModelStatus::Infeasible => Ok(LpSolution { success: false, x: Vec::new() }),
        other => Err(SolverError::SolverFailure(format!("{other:?}"))),
    }
}

/// Applies the matrix `a` to the integer solution `x`, returning the
/// per-row (per-pool) net throughput.
fn apply_matrix(a: &[Vec<f64>], x: &[i64]) -> Vec<f64> {
    a.iter()
        .map(|row| row.iter().zip(x.iter()).map(|(coeff, xi)| coeff * (*xi as f64)).sum())
        .collect()
}

/// Solves at the current `epsilon`, then tightens to `0.9 * max(A x)` and
/// solves again, until infeasibility or a repeated solution. Lazy: consumers
/// drive the iterator and may abandon it at any point.
pub struct BestSequence<'a> {
    matrix: &'a [Vec<f64>],
    config: SolverConfig,
    epsilon: f64,
    last: Option<Vec<i64>>,
    done: bool,
}

impl<'a> BestSequence<'a> {
    pub fn new(matrix: &'a [Vec<f64>], config: SolverConfig) -> Self {
        let num_cols = matrix.first().map(|row| row.len()).unwrap_or(0);
        Self { matrix, config, epsilon: config.initial_leakage, last: None, done: num_cols == 0 }
    }
}

impl<'a> Iterator for BestSequence<'a> {
    type Item = Result<LeakageSolution, SolverError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let solved = match solve_integer_lp(self.matrix, self.epsilon, self.config.x_max) {
            Ok(s) => s,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        if !solved.success {
            self.done = true;
            return None;
        }

        if self.last.as_ref() == Some(&solved.x) {
            self.done = true;
            return None;
        }

        let throughput = apply_matrix(self.matrix, &solved.x);
        let max_throughput = throughput.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        self.epsilon = 0.9 * max_throughput;
        self.last = Some(solved.x.clone());

        tracing::debug!(epsilon = self.epsilon, objective = solved.x.iter().sum::<i64>(), "milp solve emitted");

        Some(Ok(LeakageSolution { epsilon: self.epsilon, counts: solved.x }))
    }
}

/// Materialises [`BestSequence`] into a `Vec`.
pub fn best_sequence(matrix: &[Vec<f64>], config: SolverConfig) -> Result<Vec<LeakageSolution>, SolverError> {
    BestSequence::new(matrix, config).collect()
}
