use nalgebra::{DMatrix, DVector, Dyn, LU};

use super::Solve;
use crate::basic::error::LinearSolveError;

/// Dense LU with partial pivoting.
#[derive(Default)]
pub struct DenseLu {
    n: usize,
    lu: Option<LU<f64, Dyn, Dyn>>,
}

#[allow(non_snake_case)]
impl Solve for DenseLu {
    fn analyze(&mut self, n: usize, _Ap: &[usize], _Ai: &[usize]) -> Result<(), LinearSolveError> {
        self.n = n;
        Ok(())
    }

    fn factor(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[f64]) -> Result<(), LinearSolveError> {
        let n = self.n;
        if Ap.len() != n + 1 {
            return Err(LinearSolveError::Factor(format!(
                "expected {} column pointers, got {}",
                n + 1,
                Ap.len()
            )));
        }
        let mut m = DMatrix::zeros(n, n);
        for col in 0..n {
            for k in Ap[col]..Ap[col + 1] {
                m[(Ai[k], col)] += Ax[k];
            }
        }
        let lu = m.lu();
        if !lu.is_invertible() {
            self.lu = None;
            return Err(LinearSolveError::Singular);
        }
        self.lu = Some(lu);
        Ok(())
    }

    fn solve_in_place(&mut self, b: &mut [f64]) -> Result<(), LinearSolveError> {
        let lu = self.lu.as_ref().ok_or(LinearSolveError::NotFactorized)?;
        let mut rhs = DVector::from_column_slice(b);
        if !lu.solve_mut(&mut rhs) {
            return Err(LinearSolveError::Singular);
        }
        b.copy_from_slice(rhs.as_slice());
        Ok(())
    }

    fn reset(&mut self) {
        self.lu = None;
    }
}
