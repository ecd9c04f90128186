//! Linear solve back ends for the Newton-Raphson update `J·Δx = F`.
//!
//! Every back end implements [`Solve`]. The [`Factorization`] handle wraps one
//! of them, remembers the sparsity pattern it analyzed and decides whether a
//! new Jacobian can go through the cheaper numeric refactorization.

mod dense;
pub use dense::DenseLu;

#[cfg(feature = "faer")]
mod faer;
#[cfg(feature = "faer")]
pub use faer::*;

#[cfg(feature = "klu")]
mod klu;
#[cfg(feature = "klu")]
pub use klu::*;

#[cfg(feature = "rsparse")]
mod rsparse;
#[cfg(feature = "rsparse")]
pub use rsparse::*;

use nalgebra_sparse::CscMatrix;
use serde::{Deserialize, Serialize};

use super::error::{LinearSolveError, PfError};
use super::system::TopologyId;

#[allow(non_snake_case)]
/// A trait for factorizing and solving square sparse linear systems given in CSC form.
///
/// `Ap`, `Ai` and `Ax` are the column pointers, row indices and values of an
/// `n x n` matrix.
pub trait Solve: Send {
    /// Symbolic analysis (ordering) of the sparsity pattern.
    fn analyze(&mut self, n: usize, Ap: &[usize], Ai: &[usize]) -> Result<(), LinearSolveError>;

    /// Full numeric factorization. Requires a previous [`analyze`](Solve::analyze).
    fn factor(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[f64]) -> Result<(), LinearSolveError>;

    /// Numeric factorization for new values on the analyzed pattern.
    fn refactor(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[f64]) -> Result<(), LinearSolveError> {
        self.factor(Ap, Ai, Ax)
    }

    /// Overwrites `b` with the solution of the factorized system.
    fn solve_in_place(&mut self, b: &mut [f64]) -> Result<(), LinearSolveError>;

    /// Drops all symbolic and numeric state.
    fn reset(&mut self);
}

/// Linear solve back end selectable at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinearSolverKind {
    /// Dense LU with partial pivoting; always available, meant for small grids and tests.
    Dense,
    /// General sparse LU (`rsparse`).
    SparseLu,
    /// SuiteSparse KLU, tuned for circuit matrices.
    Klu,
    /// Sparse LU from `faer`, available under a permissive license.
    Faer,
}

impl Default for LinearSolverKind {
    fn default() -> Self {
        if cfg!(feature = "klu") {
            LinearSolverKind::Klu
        } else if cfg!(feature = "faer") {
            LinearSolverKind::Faer
        } else if cfg!(feature = "rsparse") {
            LinearSolverKind::SparseLu
        } else {
            LinearSolverKind::Dense
        }
    }
}

impl LinearSolverKind {
    pub const ALL: [LinearSolverKind; 4] = [
        LinearSolverKind::Dense,
        LinearSolverKind::SparseLu,
        LinearSolverKind::Klu,
        LinearSolverKind::Faer,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LinearSolverKind::Dense => "dense",
            LinearSolverKind::SparseLu => "rsparse",
            LinearSolverKind::Klu => "klu",
            LinearSolverKind::Faer => "faer",
        }
    }

    pub fn is_available(self) -> bool {
        match self {
            LinearSolverKind::Dense => true,
            LinearSolverKind::SparseLu => cfg!(feature = "rsparse"),
            LinearSolverKind::Klu => cfg!(feature = "klu"),
            LinearSolverKind::Faer => cfg!(feature = "faer"),
        }
    }

    /// Back ends compiled into this build.
    pub fn available() -> Vec<LinearSolverKind> {
        Self::ALL.into_iter().filter(|k| k.is_available()).collect()
    }

    /// Instantiates the back end, failing if its feature is not compiled in.
    pub fn create(self) -> Result<Box<dyn Solve>, PfError> {
        match self {
            LinearSolverKind::Dense => Ok(Box::new(DenseLu::default())),
            #[cfg(feature = "rsparse")]
            LinearSolverKind::SparseLu => Ok(Box::new(RSparseSolver::default())),
            #[cfg(feature = "klu")]
            LinearSolverKind::Klu => Ok(Box::new(KluSolver::default())),
            #[cfg(feature = "faer")]
            LinearSolverKind::Faer => Ok(Box::new(FaerSolver::default())),
            #[allow(unreachable_patterns)]
            other => Err(PfError::BackendUnavailable(other.name())),
        }
    }
}

/// Stored pattern of the last analyzed matrix.
#[derive(Debug, Clone, PartialEq)]
struct Pattern {
    n: usize,
    col_offsets: Vec<usize>,
    row_indices: Vec<usize>,
}

impl Pattern {
    fn matches(&self, m: &CscMatrix<f64>) -> bool {
        self.n == m.ncols()
            && self.col_offsets.as_slice() == m.col_offsets()
            && self.row_indices.as_slice() == m.row_indices()
    }
}

/// Factorization handle owned by exactly one solving context.
///
/// The handle is invalidated explicitly with [`invalidate`](Self::invalidate)
/// or implicitly when it gets bound to a different topology. An invalid handle
/// always performs a full symbolic + numeric factorization on the next call.
pub struct Factorization {
    kind: LinearSolverKind,
    backend: Box<dyn Solve>,
    pattern: Option<Pattern>,
    valid: bool,
    factorized: bool,
    topology: Option<TopologyId>,
    n_factorize: usize,
    n_refactorize: usize,
}

impl std::fmt::Debug for Factorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factorization")
            .field("kind", &self.kind)
            .field("valid", &self.valid)
            .field("topology", &self.topology)
            .field("n_factorize", &self.n_factorize)
            .field("n_refactorize", &self.n_refactorize)
            .finish()
    }
}

impl Factorization {
    pub fn new(kind: LinearSolverKind) -> Result<Self, PfError> {
        Ok(Factorization {
            kind,
            backend: kind.create()?,
            pattern: None,
            valid: false,
            factorized: false,
            topology: None,
            n_factorize: 0,
            n_refactorize: 0,
        })
    }

    pub fn kind(&self) -> LinearSolverKind {
        self.kind
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Number of full and numeric-only factorizations performed so far.
    pub fn counts(&self) -> (usize, usize) {
        (self.n_factorize, self.n_refactorize)
    }

    /// Marks the symbolic analysis as stale.
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.factorized = false;
        self.pattern = None;
        self.backend.reset();
    }

    /// Ties the handle to a topology, invalidating it when the topology differs.
    pub fn bind_topology(&mut self, id: TopologyId) {
        if self.topology != Some(id) {
            self.invalidate();
            self.topology = Some(id);
        }
    }

    /// Symbolic analysis followed by numeric factorization of `jac`.
    pub fn factorize(&mut self, jac: &CscMatrix<f64>) -> Result<(), LinearSolveError> {
        self.valid = false;
        self.factorized = false;
        self.backend.reset();
        let n = jac.ncols();
        self.backend.analyze(n, jac.col_offsets(), jac.row_indices())?;
        self.backend
            .factor(jac.col_offsets(), jac.row_indices(), jac.values())?;
        self.pattern = Some(Pattern {
            n,
            col_offsets: jac.col_offsets().to_vec(),
            row_indices: jac.row_indices().to_vec(),
        });
        self.valid = true;
        self.factorized = true;
        self.n_factorize += 1;
        Ok(())
    }

    /// Numeric refactorization when the pattern is unchanged, full factorization otherwise.
    ///
    /// A refactorization that hits a singular pivot is retried once as a full
    /// factorization since the reused pivot order may be the culprit.
    pub fn refactorize(&mut self, jac: &CscMatrix<f64>) -> Result<(), LinearSolveError> {
        let reusable = self.valid && self.pattern.as_ref().is_some_and(|p| p.matches(jac));
        if !reusable {
            return self.factorize(jac);
        }
        match self
            .backend
            .refactor(jac.col_offsets(), jac.row_indices(), jac.values())
        {
            Ok(()) => {
                self.factorized = true;
                self.n_refactorize += 1;
                Ok(())
            }
            Err(LinearSolveError::Singular) | Err(LinearSolveError::Refactor(_)) => {
                self.factorize(jac)
            }
            Err(e) => {
                self.factorized = false;
                Err(e)
            }
        }
    }

    /// Solves in place with the current factors.
    pub fn solve(&mut self, rhs: &mut [f64]) -> Result<(), LinearSolveError> {
        if !self.factorized {
            return Err(LinearSolveError::NotFactorized);
        }
        self.backend.solve_in_place(rhs)?;
        if rhs.iter().any(|x| !x.is_finite()) {
            return Err(LinearSolveError::NonFinite);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn system(values: [f64; 5]) -> CscMatrix<f64> {
        // [[a, b, 0], [c, d, 0], [0, 0, e]]
        let mut coo = CooMatrix::new(3, 3);
        coo.push(0, 0, values[0]);
        coo.push(0, 1, values[1]);
        coo.push(1, 0, values[2]);
        coo.push(1, 1, values[3]);
        coo.push(2, 2, values[4]);
        CscMatrix::from(&coo)
    }

    fn check_backend(kind: LinearSolverKind) {
        let mut f = Factorization::new(kind).unwrap();
        let j = system([4.0, 1.0, 2.0, 3.0, 5.0]);
        f.factorize(&j).unwrap();
        let mut b = [1.0, 2.0, 10.0];
        f.solve(&mut b).unwrap();
        assert!((b[0] - 0.1).abs() < 1e-12, "{kind:?}: x0 = {}", b[0]);
        assert!((b[1] - 0.6).abs() < 1e-12, "{kind:?}: x1 = {}", b[1]);
        assert!((b[2] - 2.0).abs() < 1e-12, "{kind:?}: x2 = {}", b[2]);

        // same pattern: numeric path only
        let j2 = system([2.0, 0.0, 0.0, 4.0, 1.0]);
        f.refactorize(&j2).unwrap();
        let mut b = [1.0, 2.0, 3.0];
        f.solve(&mut b).unwrap();
        assert!((b[0] - 0.5).abs() < 1e-12 && (b[1] - 0.5).abs() < 1e-12 && (b[2] - 3.0).abs() < 1e-12);
        assert_eq!(f.counts(), (1, 1), "{kind:?} should have refactorized");
    }

    #[test]
    fn test_all_available_backends_agree() {
        for kind in LinearSolverKind::available() {
            check_backend(kind);
        }
    }

    #[test]
    fn test_pattern_change_forces_full_factorization() {
        let mut f = Factorization::new(LinearSolverKind::Dense).unwrap();
        f.factorize(&system([4.0, 1.0, 2.0, 3.0, 5.0])).unwrap();
        let mut coo = CooMatrix::new(3, 3);
        coo.push(0, 0, 1.0);
        coo.push(1, 1, 1.0);
        coo.push(2, 2, 1.0);
        f.refactorize(&CscMatrix::from(&coo)).unwrap();
        assert_eq!(f.counts(), (2, 0));
    }

    #[test]
    fn test_topology_binding_invalidates() {
        let mut f = Factorization::new(LinearSolverKind::Dense).unwrap();
        f.bind_topology(TopologyId::from(7));
        f.factorize(&system([4.0, 1.0, 2.0, 3.0, 5.0])).unwrap();
        assert!(f.is_valid());
        f.bind_topology(TopologyId::from(7));
        assert!(f.is_valid(), "same topology keeps the factorization");
        f.bind_topology(TopologyId::from(8));
        assert!(!f.is_valid(), "new topology must invalidate");
        let mut b = [1.0, 1.0, 1.0];
        assert_eq!(f.solve(&mut b), Err(LinearSolveError::NotFactorized));
    }

    #[test]
    fn test_singular_is_reported() {
        for kind in LinearSolverKind::available() {
            let mut f = Factorization::new(kind).unwrap();
            // some back ends only notice the zero pivot when solving
            let err = f
                .factorize(&system([1.0, 2.0, 2.0, 4.0, 1.0]))
                .and_then(|()| f.solve(&mut [1.0, 1.0, 1.0]))
                .unwrap_err();
            assert_eq!(err, LinearSolveError::Singular, "{kind:?}");
        }
    }

    #[test]
    fn test_unavailable_backend() {
        for kind in LinearSolverKind::ALL {
            let res = Factorization::new(kind);
            assert_eq!(res.is_ok(), kind.is_available(), "{kind:?}");
        }
        assert!(LinearSolverKind::default().is_available());
    }
}
