use std::fmt;
use std::ops::AddAssign;
use std::time::Duration;

use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::basic::error::LinearSolveError;

/// Why an iteration was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Divergence {
    SingularJacobian,
    NonFinite,
    LinearSolve,
}

impl From<&LinearSolveError> for Divergence {
    fn from(e: &LinearSolveError) -> Self {
        match e {
            LinearSolveError::Singular => Divergence::SingularJacobian,
            LinearSolveError::NonFinite => Divergence::NonFinite,
            _ => Divergence::LinearSolve,
        }
    }
}

/// Terminal state of a power flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverStatus {
    Converged,
    Diverged(Divergence),
    MaxIterExceeded,
    NoSlack,
}

impl SolverStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, SolverStatus::Converged)
    }
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverStatus::Converged => write!(f, "CONVERGED"),
            SolverStatus::Diverged(d) => write!(f, "DIVERGED ({d:?})"),
            SolverStatus::MaxIterExceeded => write!(f, "MAX_ITER_EXCEEDED"),
            SolverStatus::NoSlack => write!(f, "NO_SLACK"),
        }
    }
}

/// Wall clock spent in the phases of one solve.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolverTimers {
    /// Mismatch evaluation.
    pub fx: Duration,
    /// Jacobian assembly, factorization and triangular solves.
    pub solve: Duration,
    /// Convergence checks.
    pub check: Duration,
    pub total: Duration,
}

impl AddAssign for SolverTimers {
    fn add_assign(&mut self, rhs: Self) {
        self.fx += rhs.fx;
        self.solve += rhs.solve;
        self.check += rhs.check;
        self.total += rhs.total;
    }
}

/// Result of one solve, voltages indexed like the input.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub v: DVector<Complex64>,
    pub status: SolverStatus,
    pub iterations: usize,
    pub timers: SolverTimers,
}
