use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::debug;

use super::{BatchConfig, BatchStatus, FailurePolicy};
use crate::basic::error::{PfError, Result};
use crate::basic::powerflow::{PowerFlowSolver, SolverConfig, SolverStatus};

/// Runs `work` for every index in `0..n`, each worker owning one solver.
///
/// `threads == 1` stays on the calling thread. Under
/// [`FailurePolicy::StopAtFirst`] indices after a known failure are skipped
/// and come back as `None`; results are positional either way.
pub(crate) fn run<T, F>(
    n: usize,
    config: &SolverConfig,
    batch_config: &BatchConfig,
    work: F,
) -> Result<Vec<Option<(SolverStatus, T)>>>
where
    T: Send,
    F: Fn(&mut PowerFlowSolver, usize) -> Result<(SolverStatus, T)> + Sync,
{
    // surfaces configuration errors before any worker starts
    let mut solver = PowerFlowSolver::new(config.clone())?;

    let policy = batch_config.failure_policy;
    let stop_at = AtomicUsize::new(usize::MAX);
    let run_one = |solver: &mut PowerFlowSolver, i: usize| -> Result<Option<(SolverStatus, T)>> {
        if policy == FailurePolicy::StopAtFirst && i > stop_at.load(Ordering::Relaxed) {
            return Ok(None);
        }
        let (status, out) = work(solver, i)?;
        if !status.is_converged() {
            debug!(index = i, %status, "run failed");
            if policy == FailurePolicy::StopAtFirst {
                stop_at.fetch_min(i, Ordering::Relaxed);
            }
        }
        Ok(Some((status, out)))
    };

    let outcomes: Vec<Result<Option<(SolverStatus, T)>>> = if batch_config.threads == 1 {
        (0..n).map(|i| run_one(&mut solver, i)).collect()
    } else {
        let pool = ThreadPoolBuilder::new()
            .num_threads(batch_config.threads)
            .build()
            .map_err(|e| PfError::ThreadPool(e.to_string()))?;
        pool.install(|| {
            (0..n)
                .into_par_iter()
                .map_init(
                    || PowerFlowSolver::new(config.clone()),
                    |solver, i| match solver {
                        Ok(solver) => run_one(solver, i),
                        Err(e) => Err(PfError::InvalidConfig(e.to_string())),
                    },
                )
                .collect()
        })
    };
    outcomes.into_iter().collect()
}

/// Aggregate status of positional run outcomes, plus which indices count as
/// solved. Under `StopAtFirst` nothing from the first failure on is solved.
pub(crate) fn summarize(statuses: &[Option<SolverStatus>], policy: FailurePolicy) -> (BatchStatus, Vec<bool>) {
    let n = statuses.len();
    let mut failed: Vec<(usize, SolverStatus)> = statuses
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.filter(|s| !s.is_converged()).map(|s| (i, s)))
        .collect();
    let first_failed = failed.first().copied();
    let cutoff = match (policy, first_failed) {
        (FailurePolicy::StopAtFirst, Some((f, _))) => {
            failed.truncate(1);
            f
        }
        _ => n,
    };
    let solved: Vec<bool> = statuses
        .iter()
        .enumerate()
        .map(|(i, s)| i < cutoff && s.is_some_and(|s| s.is_converged()))
        .collect();
    let status = BatchStatus {
        n_scenarios: n,
        nb_solved: solved.iter().filter(|&&s| s).count(),
        first_failed,
        failed: failed.into_iter().map(|(i, _)| i).collect(),
    };
    (status, solved)
}
