use std::sync::Arc;
use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use tracing::{debug, info};

use super::{workers, BatchConfig, BatchStatus, BatchTimers};
use crate::basic::error::{PfError, Result};
use crate::basic::powerflow::{SolverConfig, SolverStatus};
use crate::basic::system::{AssembledGrid, ElementId, GridModel, Setpoints};

/// N-1 / N-k contingency analysis of a grid model.
///
/// Each contingency disconnects a set of lines and transformers from a copy
/// of the model taken at construction. Contingencies change the topology, so
/// every one of them gets its own assembly; the worker model is the one of
/// [`Computers`](super::Computers). A contingency that leaves part of the grid
/// without slack fails with [`SolverStatus::NoSlack`].
///
/// Result rows follow the order of [`contingencies`](Self::contingencies).
#[derive(Debug)]
pub struct SecurityAnalysis {
    model: GridModel,
    contingencies: Vec<Vec<ElementId>>,
    grids: Vec<Option<Arc<AssembledGrid>>>,
    voltages: DMatrix<Complex64>,
    flows: DMatrix<f64>,
    solved: Vec<bool>,
    status: Option<BatchStatus>,
    timers: BatchTimers,
}

impl SecurityAnalysis {
    pub fn new(model: &GridModel) -> Self {
        SecurityAnalysis {
            model: model.clone(),
            contingencies: Vec::new(),
            grids: Vec::new(),
            voltages: DMatrix::zeros(0, 0),
            flows: DMatrix::zeros(0, 0),
            solved: Vec::new(),
            status: None,
            timers: BatchTimers::default(),
        }
    }

    pub fn model(&self) -> &GridModel {
        &self.model
    }

    pub fn contingencies(&self) -> &[Vec<ElementId>] {
        &self.contingencies
    }

    fn check_branch(&self, id: ElementId) -> Result<()> {
        let count = match id {
            ElementId::Line(_) => self.model.lines().len(),
            ElementId::Transformer(_) => self.model.transformers().len(),
            _ => {
                return Err(PfError::invalid(
                    id.kind(),
                    id.index(),
                    "only lines and transformers can be disconnected",
                ))
            }
        };
        if id.index() >= count {
            return Err(PfError::UnknownElement {
                kind: id.kind(),
                id: id.index(),
            });
        }
        Ok(())
    }

    /// Registers the outage of every element of `ids` at once. Duplicates
    /// within `ids` are merged; a contingency already registered is not added
    /// twice. Returns whether it was new.
    pub fn add_nk(&mut self, ids: &[ElementId]) -> Result<bool> {
        ids.iter().try_for_each(|&id| self.check_branch(id))?;
        if ids.is_empty() {
            return Err(PfError::InvalidConfig("empty contingency".into()));
        }
        let key = contingency_key(ids);
        if self.contingencies.contains(&key) {
            return Ok(false);
        }
        self.contingencies.push(key);
        Ok(true)
    }

    pub fn add_n1(&mut self, id: ElementId) -> Result<bool> {
        self.add_nk(&[id])
    }

    /// One N-1 contingency per element of `ids`.
    pub fn add_multiple_n1(&mut self, ids: &[ElementId]) -> Result<()> {
        ids.iter().try_for_each(|&id| self.add_n1(id).map(|_| ()))
    }

    /// One N-1 contingency per line and per transformer, in service or not.
    pub fn add_all_n1(&mut self) -> Result<()> {
        let lines = (0..self.model.lines().len()).map(ElementId::Line);
        let trafos = (0..self.model.transformers().len()).map(ElementId::Transformer);
        let ids: Vec<ElementId> = lines.chain(trafos).collect();
        self.add_multiple_n1(&ids)
    }

    /// Returns whether the contingency was registered.
    pub fn remove_nk(&mut self, ids: &[ElementId]) -> bool {
        let key = contingency_key(ids);
        let before = self.contingencies.len();
        self.contingencies.retain(|c| *c != key);
        self.contingencies.len() != before
    }

    pub fn remove_n1(&mut self, id: ElementId) -> bool {
        self.remove_nk(&[id])
    }

    /// Removes the N-1 contingency of every element of `ids`, returning how
    /// many were registered.
    pub fn remove_multiple_n1(&mut self, ids: &[ElementId]) -> usize {
        ids.iter().filter(|&&id| self.remove_n1(id)).count()
    }

    /// Drops every contingency and every result.
    pub fn clear(&mut self) {
        self.contingencies.clear();
        self.clear_results();
    }

    fn clear_results(&mut self) {
        self.grids.clear();
        self.voltages = DMatrix::zeros(0, 0);
        self.flows = DMatrix::zeros(0, 0);
        self.solved.clear();
        self.status = None;
        self.timers = BatchTimers::default();
    }

    /// Solves the power flow of every contingency from `v_init`.
    ///
    /// Voltage rows are indexed by model bus; buses cut off by a contingency
    /// and contingencies that were not solved stay zero.
    pub fn compute(
        &mut self,
        v_init: &DVector<Complex64>,
        config: &SolverConfig,
        batch_config: &BatchConfig,
    ) -> Result<BatchStatus> {
        let start = Instant::now();
        self.clear_results();
        let n_total = self.model.n_bus();
        if v_init.len() != n_total {
            return Err(PfError::dimension("V init", n_total, v_init.len()));
        }
        let n = self.contingencies.len();
        let model = &self.model;
        let contingencies = &self.contingencies;

        let t = Instant::now();
        let outcomes = workers::run(n, config, batch_config, |solver, i| {
            let mut outaged = model.clone();
            for &id in &contingencies[i] {
                outaged.deactivate(id)?;
            }
            let grid = match outaged.assemble() {
                Ok(grid) => grid,
                Err(PfError::NoSlackBus { buses }) => {
                    debug!(contingency = i, ?buses, "buses left without slack");
                    return Ok((SolverStatus::NoSlack, None));
                }
                Err(e) => return Err(e),
            };
            let setpoints = Setpoints::capture(&grid, &outaged);
            let v0 = grid.initial_voltage(
                v_init,
                &grid.voltage_setpoints(&setpoints.gen_vm, &setpoints.gen_va),
            )?;
            let out = solver.solve(grid.problem(), &grid.sbus(&setpoints), &v0)?;
            Ok((out.status, Some((grid, out.v))))
        })?;
        self.timers.solver = t.elapsed();

        let statuses: Vec<_> = outcomes.iter().map(|o| o.as_ref().map(|o| o.0)).collect();
        let (status, solved) = workers::summarize(&statuses, batch_config.failure_policy);

        self.voltages = DMatrix::zeros(n, n_total);
        let zeros = DVector::zeros(n_total);
        self.grids = outcomes
            .into_iter()
            .enumerate()
            .map(|(i, outcome)| {
                let (grid, v) = outcome.and_then(|(_, solution)| solution)?;
                if solved[i] {
                    self.voltages
                        .row_mut(i)
                        .copy_from(&grid.scatter(&v, &zeros).transpose());
                }
                Some(grid)
            })
            .collect();
        self.solved = solved;

        self.timers.total = start.elapsed();
        info!(
            n_contingencies = n,
            nb_solved = status.nb_solved,
            first_failed = ?status.first_failed,
            total_ms = self.timers.total.as_millis() as u64,
            "security analysis finished"
        );
        self.status = Some(status.clone());
        Ok(status)
    }

    /// Current magnitude in kA at the from (hv) side of every branch, one
    /// row per contingency. Disconnected branches and unsolved contingencies
    /// are zero.
    pub fn compute_flows(&mut self) -> Result<&DMatrix<f64>> {
        let solved_any = self.status.as_ref().is_some_and(|s| s.nb_solved > 0);
        if !solved_any {
            return Err(PfError::NoResults("no contingency has been solved"));
        }
        let t = Instant::now();
        let n = self.solved.len();
        let n_branches = self.model.lines().len() + self.model.transformers().len();
        let mut flows = DMatrix::<f64>::zeros(n, n_branches);
        for (i, grid) in self.grids.iter().enumerate() {
            let Some(grid) = grid.as_ref().filter(|_| self.solved[i]) else {
                continue;
            };
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

fn contingency_key(ids: &[ElementId]) -> Vec<ElementId> {
    let mut key = ids.to_vec();
    key.sort_unstable_by_key(|id| (matches!(id, ElementId::Transformer(_)), id.index()));
    key.dedup();
    key
}
