//! Many injection scenarios solved against one fixed topology, and
//! contingency analysis over many topologies.

mod computers;
mod scenario;
mod security;
mod workers;

pub use computers::Computers;
pub use scenario::ScenarioBatch;
pub use security::SecurityAnalysis;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::basic::powerflow::SolverStatus;

/// What a batch does once a scenario fails to converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Scenarios after the first failing one are not reported solved.
    #[default]
    StopAtFirst,
    /// Every scenario is attempted; failures are collected.
    RunAll,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Worker threads. `0` lets rayon pick one per CPU, `1` runs on the calling thread.
    #[serde(default)]
    pub threads: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl BatchConfig {
    pub fn sequential() -> Self {
        BatchConfig {
            threads: 1,
            ..Default::default()
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// Aggregate outcome of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatus {
    pub n_scenarios: usize,
    /// Scenarios that converged and are reported as solved.
    pub nb_solved: usize,
    /// Lowest failing scenario index and its status.
    pub first_failed: Option<(usize, SolverStatus)>,
    /// Failing scenario indices, ascending.
    pub failed: Vec<usize>,
}

impl BatchStatus {
    pub fn all_converged(&self) -> bool {
        self.nb_solved == self.n_scenarios
    }
}

/// Wall clock of the phases of the last batch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchTimers {
    pub total: Duration,
    /// Injection vectors and initial voltage.
    pub pre_proc: Duration,
    pub solver: Duration,
    pub flows: Duration,
}
