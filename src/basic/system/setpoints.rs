use num_complex::Complex64;

use super::{AssembledGrid, GridModel, TopologyId};
use crate::basic::elements::Injector;
use crate::basic::error::{PfError, Result};

/// Power and voltage setpoints of a grid model, captured for one topology.
///
/// An [`AssembledGrid`] only describes connectivity, so the same assembly can
/// be solved with any number of setpoint snapshots. Injections are signed MVA
/// as seen by the network (consumers negative).
#[derive(Debug, Clone, PartialEq)]
pub struct Setpoints {
    pub(crate) topology_id: TopologyId,
    pub(crate) gen_vm: Vec<f64>,
    /// Reference angle per generator, rad.
    pub(crate) gen_va: Vec<f64>,
    pub(crate) gens: Vec<Complex64>,
    pub(crate) sgens: Vec<Complex64>,
    pub(crate) loads: Vec<Complex64>,
    pub(crate) storages: Vec<Complex64>,
}

fn injections<T: Injector>(elements: &[T]) -> Vec<Complex64> {
    elements.iter().map(|e| e.injection_mva()).collect()
}

impl Setpoints {
    /// Snapshot of `model` as it is now. `grid` must be its current assembly.
    pub(crate) fn capture(grid: &AssembledGrid, model: &GridModel) -> Self {
        Setpoints {
            topology_id: grid.topology_id(),
            gen_vm: model.generators.iter().map(|g| g.vm_pu).collect(),
            gen_va: model
                .generators
                .iter()
                .map(|g| g.va_degree.to_radians())
                .collect(),
            gens: injections(&model.generators),
            sgens: injections(&model.static_generators),
            loads: injections(&model.loads),
            storages: injections(&model.storages),
        }
    }

    pub fn topology_id(&self) -> TopologyId {
        self.topology_id
    }

    /// Voltage magnitude setpoint of every generator, per unit.
    pub fn gen_vm(&self) -> &[f64] {
        &self.gen_vm
    }

    pub(crate) fn check_topology(&self, grid: &AssembledGrid) -> Result<()> {
        if self.topology_id != grid.topology_id() {
            return Err(PfError::TopologyMismatch {
                expected: grid.topology_id(),
                actual: self.topology_id,
            });
        }
        Ok(())
    }
}
