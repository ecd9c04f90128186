//! Solver configuration, status reporting and the per-call dispatcher.

pub mod config;
pub(crate) mod problem;
pub mod status;

pub use config::*;
pub use problem::PfProblem;
pub use status::*;

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

use super::error::{PfError, Result};
use super::gauss_seidel::gauss_seidel;
use super::newtonpf::newton_pf;
use super::solver::Factorization;

/// Stateful solving context: one configuration and, for Newton-Raphson, one
/// factorization handle that is reused while the topology stays the same.
///
/// A context is meant to be owned by a single thread. Parallel callers build
/// one context per worker.
#[derive(Debug)]
pub struct PowerFlowSolver {
    config: SolverConfig,
    factorization: Option<Factorization>,
}

impl PowerFlowSolver {
    pub fn new(config: SolverConfig) -> Result<Self> {
        config.validate()?;
        let factorization = if config.algorithm.uses_linear_solver() {
            Some(Factorization::new(config.linear_solver)?)
        } else {
            None
        };
        Ok(PowerFlowSolver {
            config,
            factorization,
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Full and numeric-only factorizations performed so far.
    pub fn factorization_counts(&self) -> (usize, usize) {
        self.factorization
            .as_ref()
            .map(|f| f.counts())
            .unwrap_or((0, 0))
    }

    /// Drops any cached factorization.
    pub fn reset(&mut self) {
        if let Some(f) = self.factorization.as_mut() {
            f.invalidate();
        }
    }

    /// Solves `problem` for the injections `sbus` from `v_init`.
    ///
    /// Both vectors use the bus order of the admittance matrix the problem was
    /// built from, and so does the returned voltage vector.
    pub fn solve(
        &mut self,
        problem: &PfProblem,
        sbus: &DVector<Complex64>,
        v_init: &DVector<Complex64>,
    ) -> Result<SolveOutcome> {
        let n = problem.n_bus();
        if sbus.len() != n {
            return Err(PfError::dimension("Sbus", n, sbus.len()));
        }
        if v_init.len() != n {
            return Err(PfError::dimension("V init", n, v_init.len()));
        }
        let sbus_p = problem.permute(sbus);
        let v_p = problem.permute(v_init);
        let max_iter = self.config.max_iter();
        let tol = self.config.tol();

        let out = match self.config.algorithm {
            SolverType::GaussSeidel | SolverType::GaussSeidelSynch => gauss_seidel(
                problem,
                &sbus_p,
                &v_p,
                self.config.algorithm == SolverType::GaussSeidelSynch,
                self.config.gs_ordering,
                max_iter,
                tol,
            ),
            algo @ (SolverType::NewtonRaphson | SolverType::NewtonRaphsonSingleSlack) => {
                let factorization = match self.factorization.take() {
                    Some(f) => f,
                    None => Factorization::new(self.config.linear_solver)?,
                };
                let factorization = self.factorization.insert(factorization);
                factorization.bind_topology(problem.topology());
                newton_pf(
                    problem,
                    &sbus_p,
                    &v_p,
                    algo == SolverType::NewtonRaphson,
                    max_iter,
                    tol,
                    factorization,
                )
            }
        };
        Ok(SolveOutcome {
            v: problem.unpermute(&out.v),
            ..out
        })
    }
}

/// One-shot power flow on a single connected component.
///
/// `slack` lists the slack buses (the lowest indexed one is the angle
/// reference, all share the distributed slack equally), `pv` the voltage
/// controlled buses. Every other bus is PQ.
///
/// # Example
///
/// ```
/// use gridflow::prelude::*;
/// use nalgebra::DVector;
/// use nalgebra_sparse::{CooMatrix, CscMatrix};
/// use num_complex::Complex64;
///
/// let y = Complex64::new(1.0, -10.0);
/// let mut coo = CooMatrix::new(2, 2);
/// coo.push(0, 0, y);
/// coo.push(0, 1, -y);
/// coo.push(1, 0, -y);
/// coo.push(1, 1, y);
/// let ybus = CscMatrix::from(&coo);
/// let sbus = DVector::from_vec(vec![Complex64::new(0.0, 0.0), Complex64::new(-0.3, -0.1)]);
/// let v0 = DVector::from_element(2, Complex64::new(1.0, 0.0));
/// let out = compute_pf(&ybus, &sbus, &v0, &[0], &[], &SolverConfig::default()).unwrap();
/// assert!(out.status.is_converged());
/// ```
pub fn compute_pf(
    ybus: &CscMatrix<Complex64>,
    sbus: &DVector<Complex64>,
    v_init: &DVector<Complex64>,
    slack: &[usize],
    pv: &[usize],
    config: &SolverConfig,
) -> Result<SolveOutcome> {
    let n = ybus.nrows();
    if ybus.ncols() != n {
        return Err(PfError::dimension("Ybus columns", n, ybus.ncols()));
    }
    if sbus.len() != n {
        return Err(PfError::dimension("Sbus", n, sbus.len()));
    }
    if v_init.len() != n {
        return Err(PfError::dimension("V init", n, v_init.len()));
    }
    let problem = PfProblem::new(ybus, slack, pv)?;
    PowerFlowSolver::new(config.clone())?.solve(&problem, sbus, v_init)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::solver::LinearSolverKind;
    use nalgebra_sparse::CooMatrix;

    fn three_bus() -> (CscMatrix<Complex64>, DVector<Complex64>, DVector<Complex64>) {
        let y = Complex64::new(4.0, -15.0);
        let mut coo = CooMatrix::new(3, 3);
        for (f, t) in [(0, 1), (1, 2), (0, 2)] {
            coo.push(f, f, y);
            coo.push(t, t, y);
            coo.push(f, t, -y);
            coo.push(t, f, -y);
        }
        let sbus = DVector::from_vec(vec![
            Complex64::new(-0.4, -0.1),
            Complex64::new(0.0, 0.0),
            Complex64::new(0.25, 0.0),
        ]);
        let mut v0 = DVector::from_element(3, Complex64::new(1.0, 0.0));
        v0[2] = Complex64::new(1.01, 0.0);
        (CscMatrix::from(&coo), sbus, v0)
    }

    #[test]
    fn test_all_algorithms_agree() {
        let (y, s, v0) = three_bus();
        let reference = compute_pf(
            &y,
            &s,
            &v0,
            &[1],
            &[2],
            &SolverConfig::new(SolverType::NewtonRaphsonSingleSlack),
        )
        .unwrap();
        assert!(reference.status.is_converged());
        for algo in SolverType::ALL {
            let cfg = SolverConfig::new(algo).with_tol(1e-10);
            let out = compute_pf(&y, &s, &v0, &[1], &[2], &cfg).unwrap();
            assert!(out.status.is_converged(), "{algo:?}: {:?}", out.status);
            for k in 0..3 {
                assert!(
                    (out.v[k] - reference.v[k]).norm() < 1e-6,
                    "{algo:?} bus {k}: {} vs {}",
                    out.v[k],
                    reference.v[k]
                );
            }
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let (y, s, _) = three_bus();
        let v0 = DVector::from_element(2, Complex64::new(1.0, 0.0));
        let err = compute_pf(&y, &s, &v0, &[1], &[], &SolverConfig::default()).unwrap_err();
        assert!(matches!(err, PfError::DimensionMismatch { expected: 3, actual: 2, .. }));
    }

    #[test]
    fn test_solver_reuses_factorization_pattern() {
        let (y, s, v0) = three_bus();
        let problem = PfProblem::new(&y, &[1], &[2]).unwrap();
        let cfg = SolverConfig::new(SolverType::NewtonRaphson)
            .with_linear_solver(LinearSolverKind::Dense);
        let mut solver = PowerFlowSolver::new(cfg).unwrap();
        let a = solver.solve(&problem, &s, &v0).unwrap();
        let b = solver.solve(&problem, &s, &v0).unwrap();
        assert_eq!(a.v, b.v);
        assert_eq!(a.iterations, b.iterations);
        let (full, _) = solver.factorization_counts();
        assert_eq!(full, 1, "second solve must only refactorize");
    }

    #[test]
    fn test_disconnected_pq_bus_is_singular_on_every_backend() {
        // bus 2 keeps a zero diagonal and no branch, so its Jacobian rows vanish
        let y = Complex64::new(4.0, -15.0);
        let mut coo = CooMatrix::new(3, 3);
        coo.push(0, 0, y);
        coo.push(1, 1, y);
        coo.push(0, 1, -y);
        coo.push(1, 0, -y);
        coo.push(2, 2, Complex64::new(0.0, 0.0));
        let ybus = CscMatrix::from(&coo);
        let sbus = DVector::from_vec(vec![
            Complex64::new(0.0, 0.0),
            Complex64::new(-0.2, -0.05),
            Complex64::new(-0.1, 0.0),
        ]);
        let v0 = DVector::from_element(3, Complex64::new(1.0, 0.0));
        for kind in LinearSolverKind::available() {
            for algo in [SolverType::NewtonRaphson, SolverType::NewtonRaphsonSingleSlack] {
                let cfg = SolverConfig::new(algo).with_linear_solver(kind);
                let out = compute_pf(&ybus, &sbus, &v0, &[0], &[], &cfg).unwrap();
                assert_eq!(
                    out.status,
                    SolverStatus::Diverged(Divergence::SingularJacobian),
                    "{kind:?} {algo:?}"
                );
            }
        }
    }

    #[test]
    fn test_max_iter_zero_returns_input() {
        let (y, s, v0) = three_bus();
        let cfg = SolverConfig::new(SolverType::NewtonRaphson).with_max_iter(0);
        let out = compute_pf(&y, &s, &v0, &[1], &[2], &cfg).unwrap();
        assert_eq!(out.status, SolverStatus::MaxIterExceeded);
        assert_eq!(out.v, v0);
    }
}
