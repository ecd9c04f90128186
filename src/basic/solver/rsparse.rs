use rsparse::{
    data::{Numeric, Sprs, Symb},
    lsolve, lu, sqr, usolve,
};

use super::Solve;
use crate::basic::error::LinearSolveError;

/// Partial pivoting threshold handed to the numeric LU.
const PIVOT_TOL: f64 = 1.0;

/// Sparse LU from `rsparse` with an AMD column ordering.
#[derive(Default)]
pub struct RSparseSolver {
    x: Vec<f64>,
    symbolic: Option<Symb>,
    l: Option<Sprs<f64>>,
    u: Option<Sprs<f64>>,
    pinv: Option<Vec<isize>>,
}

#[allow(non_snake_case)]
fn to_sprs(Ap: &[usize], Ai: &[usize], Ax: &[f64]) -> Sprs<f64> {
    let n = Ap.len() - 1;
    Sprs {
        m: n,
        n,
        i: Ai.to_vec(),
        p: Ap.iter().map(|&v| v as isize).collect(),
        x: Ax.to_vec(),
        nzmax: Ax.len(),
    }
}

#[allow(non_snake_case)]
impl Solve for RSparseSolver {
    fn analyze(&mut self, n: usize, Ap: &[usize], Ai: &[usize]) -> Result<(), LinearSolveError> {
        if Ap.len() != n + 1 {
            return Err(LinearSolveError::Analyze(format!(
                "expected {} column pointers, got {}",
                n + 1,
                Ap.len()
            )));
        }
        let pattern = to_sprs(Ap, Ai, &vec![1.0; Ai.len()]);
        self.symbolic = Some(sqr(&pattern, 1, false));
        self.x = vec![0.0; n];
        Ok(())
    }

    fn factor(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[f64]) -> Result<(), LinearSolveError> {
        let symbolic = self
            .symbolic
            .as_mut()
            .ok_or_else(|| LinearSolveError::Factor("symbolic analysis missing".into()))?;
        let a = to_sprs(Ap, Ai, Ax);
        let numeric = lu(&a, symbolic, PIVOT_TOL).map_err(|_| LinearSolveError::Singular)?;
        self.l = Some(numeric.l);
        self.u = Some(numeric.u);
        self.pinv = numeric.pinv;
        Ok(())
    }

    fn solve_in_place(&mut self, b: &mut [f64]) -> Result<(), LinearSolveError> {
        let (Some(l), Some(u), Some(symbolic)) = (&self.l, &self.u, &self.symbolic) else {
            return Err(LinearSolveError::NotFactorized);
        };
        ipvec(&self.pinv, b, &mut self.x); // x = P*b
        lsolve(l, &mut self.x); // x = L\x
        usolve(u, &mut self.x); // x = U\x
        ipvec(&symbolic.q, &self.x, b); // b = Q*x
        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.l = None;
        self.u = None;
        self.pinv = None;
    }
}

fn ipvec<T: Numeric<T>>(p: &Option<Vec<isize>>, b: &[T], x: &mut [T]) {
    match p {
        Some(perm) => {
            for k in 0..b.len() {
                x[perm[k] as usize] = b[k];
            }
        }
        None => x.copy_from_slice(b),
    }
}
