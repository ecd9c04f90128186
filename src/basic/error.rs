use thiserror::Error;

use crate::basic::system::TopologyId;

/// Failures of a sparse or dense linear solve back end.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinearSolveError {
    #[error("matrix is singular or numerically rank deficient")]
    Singular,
    #[error("symbolic analysis failed: {0}")]
    Analyze(String),
    #[error("numeric factorization failed: {0}")]
    Factor(String),
    #[error("numeric refactorization failed: {0}")]
    Refactor(String),
    #[error("triangular solve failed: {0}")]
    Solve(String),
    #[error("solution contains non-finite values")]
    NonFinite,
    #[error("solve requested before any factorization")]
    NotFactorized,
}

/// Structural and usage errors of the power flow engine.
///
/// Numerical non-convergence is never reported through this type; see
/// [`SolverStatus`](crate::basic::powerflow::SolverStatus).
#[derive(Debug, Error)]
pub enum PfError {
    #[error("no in-service slack generator for buses {buses:?}")]
    NoSlackBus { buses: Vec<usize> },

    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid {kind} {id}: {reason}")]
    InvalidElement {
        kind: &'static str,
        id: usize,
        reason: String,
    },

    #[error("unknown {kind} id {id}")]
    UnknownElement { kind: &'static str, id: usize },

    #[error("linear solver backend `{0}` is not compiled into this build")]
    BackendUnavailable(&'static str),

    #[error(transparent)]
    LinearSolve(#[from] LinearSolveError),

    #[error("no power flow results available: {0}")]
    NoResults(&'static str),

    #[error("invalid solver configuration: {0}")]
    InvalidConfig(String),

    #[error("setpoints were captured on {actual} but the computer runs on {expected}")]
    TopologyMismatch {
        expected: TopologyId,
        actual: TopologyId,
    },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

impl PfError {
    pub fn dimension(what: &'static str, expected: usize, actual: usize) -> Self {
        PfError::DimensionMismatch {
            what,
            expected,
            actual,
        }
    }

    pub fn invalid(kind: &'static str, id: usize, reason: impl Into<String>) -> Self {
        PfError::InvalidElement {
            kind,
            id,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PfError>;
