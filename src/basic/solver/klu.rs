use gridflow_sol_klu::{KluError, KluSolver as RawKlu};

use super::Solve;
use crate::basic::error::LinearSolveError;

/// SuiteSparse KLU, with a true numeric refactorization path.
#[derive(Default)]
pub struct KluSolver {
    raw: RawKlu,
    values: Vec<f64>,
}

fn map_err(e: KluError) -> LinearSolveError {
    match e {
        KluError::Singular => LinearSolveError::Singular,
        KluError::Analyze(_) => LinearSolveError::Analyze(e.to_string()),
        KluError::Factor(_) => LinearSolveError::Factor(e.to_string()),
        KluError::Refactor(_) => LinearSolveError::Refactor(e.to_string()),
        KluError::Solve(_) => LinearSolveError::Solve(e.to_string()),
        KluError::NotAnalyzed | KluError::NotFactored => LinearSolveError::NotFactorized,
    }
}

#[allow(non_snake_case)]
impl Solve for KluSolver {
    fn analyze(&mut self, n: usize, Ap: &[usize], Ai: &[usize]) -> Result<(), LinearSolveError> {
        self.raw.analyze(n, Ap, Ai).map_err(map_err)
    }

    fn factor(&mut self, _Ap: &[usize], _Ai: &[usize], Ax: &[f64]) -> Result<(), LinearSolveError> {
        self.values.clear();
        self.values.extend_from_slice(Ax);
        self.raw.factor(&mut self.values).map_err(map_err)
    }

    fn refactor(&mut self, _Ap: &[usize], _Ai: &[usize], Ax: &[f64]) -> Result<(), LinearSolveError> {
        self.values.clear();
        self.values.extend_from_slice(Ax);
        self.raw.refactor(&mut self.values).map_err(map_err)
    }

    fn solve_in_place(&mut self, b: &mut [f64]) -> Result<(), LinearSolveError> {
        self.raw.solve(b).map_err(map_err)
    }

    fn reset(&mut self) {
        self.raw.reset();
    }
}
