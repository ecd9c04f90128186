use std::sync::Arc;
use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use tracing::info;

use super::{workers, BatchConfig, BatchStatus, BatchTimers, ScenarioBatch};
use crate::basic::error::{PfError, Result};
use crate::basic::powerflow::SolverConfig;
use crate::basic::system::{AssembledGrid, GridModel, Setpoints};

/// Batch computer bound to one assembled topology.
///
/// The topology is shared read-only; every `Computers` owns its result
/// buffers and every worker owns its solver context, so independent
/// computers may run concurrently on the same `Arc<AssembledGrid>`.
/// Setpoints not given by a batch come from the [`Setpoints`] snapshot held
/// here, which [`from_grid`](Self::from_grid) takes from the live model.
///
/// Result matrices have one row per scenario and are indexed by model bus
/// (voltages, injections) or by branch, lines first (flows).
#[derive(Debug)]
pub struct Computers {
    grid: Arc<AssembledGrid>,
    setpoints: Setpoints,
    voltages: DMatrix<Complex64>,
    sbuses: DMatrix<Complex64>,
    flows: DMatrix<f64>,
    solved: Vec<bool>,
    status: Option<BatchStatus>,
    timers: BatchTimers,
}

impl Computers {
    /// Fails with `TopologyMismatch` when `setpoints` were taken on another
    /// topology than `grid`.
    pub fn new(grid: Arc<AssembledGrid>, setpoints: Setpoints) -> Result<Self> {
        setpoints.check_topology(&grid)?;
        Ok(Computers {
            grid,
            setpoints,
            voltages: DMatrix::zeros(0, 0),
            sbuses: DMatrix::zeros(0, 0),
            flows: DMatrix::zeros(0, 0),
            solved: Vec::new(),
            status: None,
            timers: BatchTimers::default(),
        })
    }

    /// Assembles `model` if needed and snapshots its current setpoints;
    /// fails with `NoSlackBus` like assembly does.
    pub fn from_grid(model: &mut GridModel) -> Result<Self> {
        let grid = model.assemble()?;
        let setpoints = Setpoints::capture(&grid, model);
        Computers::new(grid, setpoints)
    }

    pub fn grid(&self) -> &Arc<AssembledGrid> {
        &self.grid
    }

    pub fn setpoints(&self) -> &Setpoints {
        &self.setpoints
    }

    /// Replaces the setpoint snapshot, e.g. after editing the model.
    pub fn set_setpoints(&mut self, setpoints: Setpoints) -> Result<()> {
        setpoints.check_topology(&self.grid)?;
        self.setpoints = setpoints;
        Ok(())
    }

    /// Drops every result of the previous batch.
    pub fn clear(&mut self) {
        self.voltages = DMatrix::zeros(0, 0);
        self.sbuses = DMatrix::zeros(0, 0);
        self.flows = DMatrix::zeros(0, 0);
        self.solved.clear();
        self.status = None;
        self.timers = BatchTimers::default();
    }

    /// Solves every scenario of `batch` starting from `v_init`.
    ///
    /// Generator voltage setpoints are applied to `v_init`, once for the
    /// whole batch or per scenario when the batch carries `gen_v`. Rows of
    /// scenarios that were not solved stay zero.
    pub fn compute_vs(
        &mut self,
        batch: &ScenarioBatch,
        v_init: &DVector<Complex64>,
        config: &SolverConfig,
        batch_config: &BatchConfig,
    ) -> Result<BatchStatus> {
        let start = Instant::now();
        self.clear();
        let grid = Arc::clone(&self.grid);
        let sp = &self.setpoints;
        let n = batch.check(&grid)?;

        let t = Instant::now();
        let v0s = match batch.gen_v {
            Some(_) => (0..n)
                .map(|i| {
                    let vm = batch.gen_vm(i).unwrap_or_else(|| sp.gen_vm.clone());
                    grid.initial_voltage(v_init, &grid.voltage_setpoints(&vm, &sp.gen_va))
                })
                .collect::<Result<Vec<_>>>()?,
            None => vec![grid.initial_voltage(v_init, &grid.voltage_setpoints(&sp.gen_vm, &sp.gen_va))?],
        };
        let sbuses: Vec<DVector<Complex64>> = (0..n).map(|i| batch.sbus(&grid, sp, i)).collect();
        self.timers.pre_proc = t.elapsed();

        let t = Instant::now();
        let problem = grid.problem();
        let outcomes = workers::run(n, config, batch_config, |solver, i| {
            let v0 = &v0s[i.min(v0s.len() - 1)];
            let out = solver.solve(problem, &sbuses[i], v0)?;
            Ok((out.status, out.v))
        })?;
        self.timers.solver = t.elapsed();

        let statuses: Vec<_> = outcomes.iter().map(|o| o.as_ref().map(|o| o.0)).collect();
        let (status, solved) = workers::summarize(&statuses, batch_config.failure_policy);

        let n_total = grid.n_bus_total();
        self.voltages = DMatrix::zeros(n, n_total);
        self.sbuses = DMatrix::zeros(n, n_total);
        let zeros = DVector::zeros(n_total);
        for (i, outcome) in outcomes.iter().enumerate() {
            self.sbuses
                .row_mut(i)
                .copy_from(&grid.scatter(&sbuses[i], &zeros).transpose());
            if let (true, Some((_, v))) = (solved[i], outcome) {
                self.voltages
                    .row_mut(i)
                    .copy_from(&grid.scatter(v, v_init).transpose());
            }
        }
        self.solved = solved;

        self.timers.total = start.elapsed();
        info!(
            n_scenarios = n,
            nb_solved = status.nb_solved,
            first_failed = ?status.first_failed,
            total_ms = self.timers.total.as_millis() as u64,
            "batch finished"
        );
        self.status = Some(status.clone());
        Ok(status)
    }

    /// Current magnitude in kA at the from (hv) side of every branch, for
    /// the solved scenarios of the last batch. Out-of-service branches and
    /// unsolved scenarios are zero.
    pub fn compute_flows(&mut self) -> Result<&DMatrix<f64>> {
        let solved_any = self.status.as_ref().is_some_and(|s| s.nb_solved > 0);
        if !solved_any {
            return Err(PfError::NoResults("no scenario has been solved"));
        }
        let t = Instant::now();
        let grid = &self.grid;
        let n = self.solved.len();
        let mut flows = DMatrix::<f64>::zeros(n, grid.n_branches());
        for i in (0..n).filter(|&i| self.solved[i]) {
            let currents = grid.from_currents_ka(|b| self.voltages[(i, b)]);
            flows.row_mut(i).copy_from_slice(&currents);
        }
        self.flows = flows;
        self.timers.flows = t.elapsed();
        Ok(&self.flows)
    }

    pub fn get_voltages(&self) -> &DMatrix<Complex64> {
        &self.voltages
    }

    /// Per unit injections used by each scenario.
    pub fn get_sbuses(&self) -> &DMatrix<Complex64> {
        &self.sbuses
    }

    /// Flows of the last [`compute_flows`](Self::compute_flows).
    pub fn get_flows(&self) -> &DMatrix<f64> {
        &self.flows
    }

    pub fn get_status(&self) -> Option<&BatchStatus> {
        self.status.as_ref()
    }

    pub fn nb_solved(&self) -> usize {
        self.status.as_ref().map_or(0, |s| s.nb_solved)
    }

    pub fn timers(&self) -> BatchTimers {
        self.timers
    }
}
