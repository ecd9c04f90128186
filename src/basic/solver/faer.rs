use faer::{
    MatMut,
    linalg::solvers::Solve as _,
    sparse::{
        SparseColMatRef, SymbolicSparseColMatRef,
        linalg::solvers::{Lu, SymbolicLu},
    },
};

use super::Solve;
use crate::basic::error::LinearSolveError;

/// Sparse LU from `faer`.
#[derive(Default)]
pub struct FaerSolver {
    n: usize,
    lu: Option<Lu<usize, f64>>,
    symbolic: Option<SymbolicLu<usize>>,
}

#[allow(non_snake_case)]
impl Solve for FaerSolver {
    fn analyze(&mut self, n: usize, Ap: &[usize], Ai: &[usize]) -> Result<(), LinearSolveError> {
        let s = SymbolicSparseColMatRef::new_checked(n, n, Ap, None, Ai);
        self.symbolic = Some(
            SymbolicLu::try_new(s).map_err(|e| LinearSolveError::Analyze(format!("{e:?}")))?,
        );
        self.n = n;
        Ok(())
    }

    fn factor(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[f64]) -> Result<(), LinearSolveError> {
        let symbolic = self
            .symbolic
            .as_ref()
            .ok_or_else(|| LinearSolveError::Factor("symbolic analysis missing".into()))?;
        let s = SymbolicSparseColMatRef::new_checked(self.n, self.n, Ap, None, Ai);
        let mat = SparseColMatRef::new(s, Ax);
        self.lu = Some(
            Lu::try_new_with_symbolic(symbolic.clone(), mat)
                .map_err(|_| LinearSolveError::Singular)?,
        );
        Ok(())
    }

    fn solve_in_place(&mut self, b: &mut [f64]) -> Result<(), LinearSolveError> {
        let lu = self.lu.as_ref().ok_or(LinearSolveError::NotFactorized)?;
        let n = b.len();
        lu.solve_in_place(MatMut::from_column_major_slice_mut(b, n, 1));
        // faer factors through zero pivots; they only show up in the solution
        if b.iter().any(|x| !x.is_finite()) {
            return Err(LinearSolveError::Singular);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.lu = None;
        self.symbolic = None;
    }
}
