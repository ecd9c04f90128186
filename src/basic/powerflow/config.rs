use serde::{Deserialize, Serialize};

use crate::basic::error::{PfError, Result};
use crate::basic::solver::LinearSolverKind;

pub const DEFAULT_TOL: f64 = 1e-8;
pub const DEFAULT_NR_MAX_ITER: usize = 10;
pub const DEFAULT_GS_MAX_ITER: usize = 10_000;

/// Power flow algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SolverType {
    /// Sequential Gauss-Seidel: updated voltages are used within the same sweep.
    GaussSeidel,
    /// Synchronous (Jacobi-style) Gauss-Seidel: every update of a sweep uses the previous sweep.
    GaussSeidelSynch,
    /// Newton-Raphson with a distributed slack shared by all slack generators.
    #[default]
    NewtonRaphson,
    /// Newton-Raphson with one reference bus; additional slack buses act as PV buses.
    NewtonRaphsonSingleSlack,
}

impl SolverType {
    pub const ALL: [SolverType; 4] = [
        SolverType::GaussSeidel,
        SolverType::GaussSeidelSynch,
        SolverType::NewtonRaphson,
        SolverType::NewtonRaphsonSingleSlack,
    ];

    pub fn uses_linear_solver(self) -> bool {
        matches!(
            self,
            SolverType::NewtonRaphson | SolverType::NewtonRaphsonSingleSlack
        )
    }

    pub fn default_max_iter(self) -> usize {
        if self.uses_linear_solver() {
            DEFAULT_NR_MAX_ITER
        } else {
            DEFAULT_GS_MAX_ITER
        }
    }
}

/// Bus visiting order of the sequential Gauss-Seidel sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GsOrdering {
    /// All PQ buses, then all PV buses, each ascending by bus index.
    #[default]
    PqThenPv,
    /// Ascending bus index regardless of bus type.
    Natural,
}

/// Options of a single power flow solve, passed explicitly to every call.
///
/// # Example
///
/// ```
/// use gridflow::prelude::*;
/// let cfg: SolverConfig = serde_json::from_str(r#"{"algorithm":"GaussSeidel","max_iter":5000}"#).unwrap();
/// assert_eq!(cfg.max_iter(), 5000);
/// assert_eq!(cfg.tol(), 1e-8);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default)]
    pub algorithm: SolverType,
    #[serde(default)]
    pub linear_solver: LinearSolverKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_iter: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tol: Option<f64>,
    #[serde(default)]
    pub gs_ordering: GsOrdering,
}

impl SolverConfig {
    pub fn new(algorithm: SolverType) -> Self {
        SolverConfig {
            algorithm,
            ..Default::default()
        }
    }

    pub fn with_linear_solver(mut self, kind: LinearSolverKind) -> Self {
        self.linear_solver = kind;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = Some(max_iter);
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = Some(tol);
        self
    }

    pub fn with_gs_ordering(mut self, ordering: GsOrdering) -> Self {
        self.gs_ordering = ordering;
        self
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
            .unwrap_or_else(|| self.algorithm.default_max_iter())
    }

    pub fn tol(&self) -> f64 {
        self.tol.unwrap_or(DEFAULT_TOL)
    }

    pub fn validate(&self) -> Result<()> {
        let tol = self.tol();
        if !(tol.is_finite() && tol > 0.0) {
            return Err(PfError::InvalidConfig(format!(
                "tolerance must be a positive real, got {tol}"
            )));
        }
        if self.algorithm.uses_linear_solver() && !self.linear_solver.is_available() {
            return Err(PfError::BackendUnavailable(self.linear_solver.name()));
        }
        Ok(())
    }
}

/// Algorithm / back end pairs usable in this build.
pub fn available_solvers() -> Vec<(SolverType, Option<LinearSolverKind>)> {
    let mut out = Vec::new();
    for algo in SolverType::ALL {
        if algo.uses_linear_solver() {
            out.extend(LinearSolverKind::available().into_iter().map(|k| (algo, Some(k))));
        } else {
            out.push((algo, None));
        }
    }
    out
}
