use std::sync::Arc;
use std::time::Duration;

use nalgebra::DVector;
use num_complex::Complex64;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::assembly::{self, AssembledGrid};
use super::{BranchEndResult, InjectionResult, Setpoints};
use crate::basic::elements::{
    Branch, Bus, BusElement, Generator, Injector, Line, Load, Shunt, StaticGenerator, Storage,
    Transformer,
};
use crate::basic::error::{PfError, Result};
use crate::basic::powerflow::{
    available_solvers, PowerFlowSolver, SolverConfig, SolverStatus, SolverTimers, SolverType,
};
use crate::basic::solver::LinearSolverKind;

/// Handle of an element inside a [`GridModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementId {
    Bus(usize),
    Line(usize),
    Transformer(usize),
    Load(usize),
    Generator(usize),
    StaticGenerator(usize),
    Storage(usize),
    Shunt(usize),
}

impl ElementId {
    pub fn kind(&self) -> &'static str {
        match self {
            ElementId::Bus(_) => "bus",
            ElementId::Line(_) => "line",
            ElementId::Transformer(_) => "transformer",
            ElementId::Load(_) => "load",
            ElementId::Generator(_) => "generator",
            ElementId::StaticGenerator(_) => "static generator",
            ElementId::Storage(_) => "storage",
            ElementId::Shunt(_) => "shunt",
        }
    }

    pub fn index(&self) -> usize {
        match *self {
            ElementId::Bus(i)
            | ElementId::Line(i)
            | ElementId::Transformer(i)
            | ElementId::Load(i)
            | ElementId::Generator(i)
            | ElementId::StaticGenerator(i)
            | ElementId::Storage(i)
            | ElementId::Shunt(i) => i,
        }
    }

    fn unknown(&self) -> PfError {
        PfError::UnknownElement {
            kind: self.kind(),
            id: self.index(),
        }
    }
}

/// Outcome of [`GridModel::ac_pf`]. Voltages are indexed by model bus.
#[derive(Debug, Clone)]
pub struct PowerFlowResult {
    pub v: DVector<Complex64>,
    pub status: SolverStatus,
    pub iterations: usize,
    pub elapsed: Duration,
    pub timers: SolverTimers,
}

/// Everything needed to derive element results from the last power flow.
#[derive(Debug, Clone)]
struct LastSolve {
    grid: Arc<AssembledGrid>,
    setpoints: Setpoints,
    v: DVector<Complex64>,
}

fn default_sn_mva() -> f64 {
    1.0
}

fn default_init_vm() -> f64 {
    1.0
}

/// Element tables of one grid plus the cached assembly of its topology.
///
/// Mutations that touch connectivity (in-service flags, bus assignments,
/// shunt values, slack membership, new elements) drop the cached assembly;
/// changes of power or voltage setpoints keep it. Setpoints are read from the
/// element tables at every solve, or captured with [`GridModel::setpoints`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridModel {
    #[serde(default = "default_sn_mva")]
    pub(crate) sn_mva: f64,
    #[serde(default = "default_init_vm")]
    pub(crate) init_vm_pu: f64,
    #[serde(default)]
    pub(crate) buses: Vec<Bus>,
    #[serde(default)]
    pub(crate) lines: Vec<Line>,
    #[serde(default)]
    pub(crate) transformers: Vec<Transformer>,
    #[serde(default)]
    pub(crate) loads: Vec<Load>,
    #[serde(default)]
    pub(crate) generators: Vec<Generator>,
    #[serde(default)]
    pub(crate) static_generators: Vec<StaticGenerator>,
    #[serde(default)]
    pub(crate) storages: Vec<Storage>,
    #[serde(default)]
    pub(crate) shunts: Vec<Shunt>,
    #[serde(skip)]
    assembled: Option<Arc<AssembledGrid>>,
    #[serde(skip)]
    last: Option<LastSolve>,
    #[serde(skip)]
    last_status: Option<SolverStatus>,
}

impl GridModel {
    pub fn new(sn_mva: f64) -> Self {
        GridModel {
            sn_mva,
            init_vm_pu: default_init_vm(),
            ..Default::default()
        }
    }

    pub fn with_init_vm(mut self, vm_pu: f64) -> Self {
        self.init_vm_pu = vm_pu;
        self
    }

    pub fn sn_mva(&self) -> f64 {
        self.sn_mva
    }

    pub fn n_bus(&self) -> usize {
        self.buses.len()
    }

    /// Flat start at `init_vm_pu` for every bus.
    pub fn flat_start(&self) -> DVector<Complex64> {
        DVector::from_element(self.buses.len(), Complex64::new(self.init_vm_pu, 0.0))
    }

    fn topology_changed(&mut self) {
        self.assembled = None;
    }

    fn check_bus_id(&self, kind: &'static str, id: usize, bus: usize) -> Result<()> {
        if bus >= self.buses.len() {
            return Err(PfError::invalid(kind, id, format!("bus {bus} does not exist")));
        }
        Ok(())
    }

    pub fn add_bus(&mut self, bus: Bus) -> usize {
        self.topology_changed();
        self.buses.push(bus);
        self.buses.len() - 1
    }

    pub fn add_line(&mut self, line: Line) -> Result<usize> {
        let id = self.lines.len();
        self.check_bus_id("line", id, line.from_bus)?;
        self.check_bus_id("line", id, line.to_bus)?;
        self.topology_changed();
        self.lines.push(line);
        Ok(id)
    }

    pub fn add_transformer(&mut self, trafo: Transformer) -> Result<usize> {
        let id = self.transformers.len();
        self.check_bus_id("transformer", id, trafo.hv_bus)?;
        self.check_bus_id("transformer", id, trafo.lv_bus)?;
        self.topology_changed();
        self.transformers.push(trafo);
        Ok(id)
    }

    pub fn add_load(&mut self, load: Load) -> Result<usize> {
        self.check_bus_id("load", self.loads.len(), load.bus)?;
        self.topology_changed();
        self.loads.push(load);
        Ok(self.loads.len() - 1)
    }

    pub fn add_generator(&mut self, generator: Generator) -> Result<usize> {
        self.check_bus_id("generator", self.generators.len(), generator.bus)?;
        self.topology_changed();
        self.generators.push(generator);
        Ok(self.generators.len() - 1)
    }

    pub fn add_static_generator(&mut self, sgen: StaticGenerator) -> Result<usize> {
        self.check_bus_id("static generator", self.static_generators.len(), sgen.bus)?;
        self.topology_changed();
        self.static_generators.push(sgen);
        Ok(self.static_generators.len() - 1)
    }

    pub fn add_storage(&mut self, storage: Storage) -> Result<usize> {
        self.check_bus_id("storage", self.storages.len(), storage.bus)?;
        self.topology_changed();
        self.storages.push(storage);
        Ok(self.storages.len() - 1)
    }

    pub fn add_shunt(&mut self, shunt: Shunt) -> Result<usize> {
        self.check_bus_id("shunt", self.shunts.len(), shunt.bus)?;
        self.topology_changed();
        self.shunts.push(shunt);
        Ok(self.shunts.len() - 1)
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn transformers(&self) -> &[Transformer] {
        &self.transformers
    }

    pub fn loads(&self) -> &[Load] {
        &self.loads
    }

    pub fn generators(&self) -> &[Generator] {
        &self.generators
    }

    pub fn static_generators(&self) -> &[StaticGenerator] {
        &self.static_generators
    }

    pub fn storages(&self) -> &[Storage] {
        &self.storages
    }

    pub fn shunts(&self) -> &[Shunt] {
        &self.shunts
    }

    /// Referential integrity of every element.
    pub fn validate(&self) -> Result<()> {
        assembly::validate(self)
    }

    fn bus_element_mut(&mut self, id: ElementId) -> Result<&mut dyn BusElement> {
        let err = id.unknown();
        let el: Option<&mut dyn BusElement> = match id {
            ElementId::Load(i) => self.loads.get_mut(i).map(|e| e as &mut dyn BusElement),
            ElementId::Generator(i) => self.generators.get_mut(i).map(|e| e as &mut dyn BusElement),
            ElementId::StaticGenerator(i) => self.static_generators.get_mut(i).map(|e| e as &mut dyn BusElement),
            ElementId::Storage(i) => self.storages.get_mut(i).map(|e| e as &mut dyn BusElement),
            ElementId::Shunt(i) => self.shunts.get_mut(i).map(|e| e as &mut dyn BusElement),
            _ => return Err(PfError::invalid(id.kind(), id.index(), "not a single-bus element")),
        };
        el.ok_or(err)
    }

    fn branch_mut(&mut self, id: ElementId) -> Result<&mut dyn Branch> {
        let err = id.unknown();
        let el: Option<&mut dyn Branch> = match id {
            ElementId::Line(i) => self.lines.get_mut(i).map(|e| e as &mut dyn Branch),
            ElementId::Transformer(i) => self.transformers.get_mut(i).map(|e| e as &mut dyn Branch),
            _ => return Err(PfError::invalid(id.kind(), id.index(), "not a branch")),
        };
        el.ok_or(err)
    }

    fn injector_mut(&mut self, id: ElementId) -> Result<&mut dyn Injector> {
        let err = id.unknown();
        let el: Option<&mut dyn Injector> = match id {
            ElementId::Load(i) => self.loads.get_mut(i).map(|e| e as &mut dyn Injector),
            ElementId::Generator(i) => self.generators.get_mut(i).map(|e| e as &mut dyn Injector),
            ElementId::StaticGenerator(i) => self.static_generators.get_mut(i).map(|e| e as &mut dyn Injector),
            ElementId::Storage(i) => self.storages.get_mut(i).map(|e| e as &mut dyn Injector),
            _ => return Err(PfError::invalid(id.kind(), id.index(), "has no power setpoint")),
        };
        el.ok_or(err)
    }

    fn set_status(&mut self, id: ElementId, status: bool) -> Result<()> {
        let changed = match id {
            ElementId::Bus(i) => {
                let bus = self.buses.get_mut(i).ok_or(id.unknown())?;
                std::mem::replace(&mut bus.in_service, status) != status
            }
            ElementId::Line(_) | ElementId::Transformer(_) => {
                let br = self.branch_mut(id)?;
                let old = br.in_service();
                br.set_in_service(status);
                old != status
            }
            _ => {
                let el = self.bus_element_mut(id)?;
                let old = el.in_service();
                el.set_in_service(status);
                old != status
            }
        };
        if changed {
            self.topology_changed();
        }
        Ok(())
    }

    pub fn deactivate(&mut self, id: ElementId) -> Result<()> {
        self.set_status(id, false)
    }

    pub fn reactivate(&mut self, id: ElementId) -> Result<()> {
        self.set_status(id, true)
    }

    /// Moves a single-bus element to `bus`.
    pub fn change_bus(&mut self, id: ElementId, bus: usize) -> Result<()> {
        self.check_bus_id(id.kind(), id.index(), bus)?;
        let el = self.bus_element_mut(id)?;
        if el.bus() != bus {
            el.set_bus(bus);
            self.topology_changed();
        }
        Ok(())
    }

    /// Reconnects a line or transformer between `from_bus` and `to_bus`.
    pub fn change_branch_buses(&mut self, id: ElementId, from_bus: usize, to_bus: usize) -> Result<()> {
        self.check_bus_id(id.kind(), id.index(), from_bus)?;
        self.check_bus_id(id.kind(), id.index(), to_bus)?;
        if from_bus == to_bus {
            return Err(PfError::invalid(id.kind(), id.index(), "both ends on the same bus"));
        }
        let br = self.branch_mut(id)?;
        if (br.from_bus(), br.to_bus()) != (from_bus, to_bus) {
            br.set_from_bus(from_bus);
            br.set_to_bus(to_bus);
            self.topology_changed();
        }
        Ok(())
    }

    /// Active power setpoint in MW. Shunt values live in Ybus, so changing
    /// one forces a new assembly.
    pub fn change_p(&mut self, id: ElementId, p_mw: f64) -> Result<()> {
        if let ElementId::Shunt(i) = id {
            self.shunts.get_mut(i).ok_or(id.unknown())?.p_mw = p_mw;
            self.topology_changed();
            return Ok(());
        }
        self.injector_mut(id)?.set_p_mw(p_mw);
        Ok(())
    }

    /// Reactive power setpoint in MVAr. Generators have none.
    pub fn change_q(&mut self, id: ElementId, q_mvar: f64) -> Result<()> {
        match id {
            ElementId::Shunt(i) => {
                self.shunts.get_mut(i).ok_or(id.unknown())?.q_mvar = q_mvar;
                self.topology_changed();
                Ok(())
            }
            ElementId::Generator(i) => Err(PfError::invalid(
                "generator",
                i,
                "reactive power of a voltage controlling generator is not a setpoint",
            )),
            _ => {
                self.injector_mut(id)?.set_q_mvar(q_mvar);
                Ok(())
            }
        }
    }

    /// Voltage magnitude setpoint of a generator, per unit.
    pub fn change_v(&mut self, generator: usize, vm_pu: f64) -> Result<()> {
        let g = self
            .generators
            .get_mut(generator)
            .ok_or(ElementId::Generator(generator).unknown())?;
        g.vm_pu = vm_pu;
        Ok(())
    }

    /// Makes a generator a slack with participation factor `weight`.
    pub fn add_gen_slackbus(&mut self, generator: usize, weight: f64) -> Result<()> {
        if !(weight.is_finite() && weight > 0.0) {
            return Err(PfError::invalid(
                "generator",
                generator,
                format!("slack weight must be positive, got {weight}"),
            ));
        }
        let g = self
            .generators
            .get_mut(generator)
            .ok_or(ElementId::Generator(generator).unknown())?;
        if !g.is_slack || g.slack_weight != weight {
            g.is_slack = true;
            g.slack_weight = weight;
            self.topology_changed();
        }
        Ok(())
    }

    /// Turns a slack generator back into a plain voltage controlling one.
    pub fn remove_gen_slackbus(&mut self, generator: usize) -> Result<()> {
        let g = self
            .generators
            .get_mut(generator)
            .ok_or(ElementId::Generator(generator).unknown())?;
        if g.is_slack {
            g.is_slack = false;
            self.topology_changed();
        }
        Ok(())
    }

    /// Snapshot of the current power and voltage setpoints, bound to the
    /// current topology.
    pub fn setpoints(&mut self) -> Result<Setpoints> {
        let grid = self.assemble()?;
        Ok(Setpoints::capture(&grid, self))
    }

    /// Assembly of the current topology, rebuilt only when it changed.
    pub fn assemble(&mut self) -> Result<Arc<AssembledGrid>> {
        if let Some(a) = &self.assembled {
            return Ok(Arc::clone(a));
        }
        let a = Arc::new(assembly::assemble(self)?);
        self.assembled = Some(Arc::clone(&a));
        Ok(a)
    }

    /// Runs one AC power flow from `v_init`, indexed by model bus.
    ///
    /// Generator voltage setpoints overwrite the magnitudes of `v_init` at
    /// their buses; buses outside the solve keep their entry of `v_init`.
    pub fn ac_pf(&mut self, v_init: &DVector<Complex64>, config: &SolverConfig) -> Result<PowerFlowResult> {
        self.last = None;
        let grid = match self.assemble() {
            Ok(g) => g,
            Err(e @ PfError::NoSlackBus { .. }) => {
                self.last_status = Some(SolverStatus::NoSlack);
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let setpoints = Setpoints::capture(&grid, self);
        let v0 = grid.initial_voltage(
            v_init,
            &grid.voltage_setpoints(&setpoints.gen_vm, &setpoints.gen_va),
        )?;
        let sbus = grid.sbus(&setpoints);

        let mut solver = PowerFlowSolver::new(config.clone())?;
        let out = solver.solve(grid.problem(), &sbus, &v0)?;
        let v = grid.scatter(&out.v, v_init);
        info!(
            status = %out.status,
            iterations = out.iterations,
            elapsed_us = out.timers.total.as_micros() as u64,
            "ac power flow"
        );

        self.last_status = Some(out.status);
        self.last = Some(LastSolve {
            grid,
            setpoints,
            v: v.clone(),
        });
        Ok(PowerFlowResult {
            v,
            status: out.status,
            iterations: out.iterations,
            elapsed: out.timers.total,
            timers: out.timers,
        })
    }

    pub fn last_status(&self) -> Option<SolverStatus> {
        self.last_status
    }

    fn last(&self) -> Result<&LastSolve> {
        self.last.as_ref().ok_or(PfError::NoResults("no power flow has run"))
    }

    /// Voltages of the last power flow.
    pub fn get_v(&self) -> Result<&DVector<Complex64>> {
        Ok(&self.last()?.v)
    }

    pub fn get_vm(&self) -> Result<DVector<f64>> {
        Ok(self.get_v()?.map(|v| v.norm()))
    }

    /// Voltage angles in degrees.
    pub fn get_va(&self) -> Result<DVector<f64>> {
        Ok(self.get_v()?.map(|v| v.arg().to_degrees()))
    }

    /// Per bus mismatch `V·conj(Y·V) - S` of the current setpoints, in per unit.
    ///
    /// Quantities left free by the power flow are zeroed: reactive power at
    /// PV and reference buses and active power at reference buses. With
    /// `check_q` the reactive mismatch of PV buses is kept. Buses outside the
    /// solve report zero.
    pub fn check_solution(&mut self, v: &DVector<Complex64>, check_q: bool) -> Result<DVector<Complex64>> {
        let grid = self.assemble()?;
        if v.len() != grid.n_bus_total() {
            return Err(PfError::dimension("V", grid.n_bus_total(), v.len()));
        }
        let vs = grid.gather(v);
        let sbus = grid.sbus(&Setpoints::capture(&grid, self));
        let mut mis = vs.component_mul(&(grid.ybus() * &vs).conjugate()) - sbus;
        let problem = grid.problem();
        if !check_q {
            for &k in problem.pv_buses() {
                mis[k].im = 0.0;
            }
        }
        for &k in problem.ref_buses() {
            mis[k] = Complex64::zero();
        }
        Ok(grid.scatter(&mis, &DVector::zeros(grid.n_bus_total())))
    }

    /// Branch results of the last power flow; `trafos` selects transformers,
    /// `to_side` the to (ex / lv) end.
    fn branch_results(&self, trafos: bool, to_side: bool) -> Result<Vec<BranchEndResult>> {
        let last = self.last()?;
        let (from, to) = last.grid.branch_results(&last.grid.gather(&last.v));
        let mut side = if to_side { to } else { from };
        Ok(if trafos {
            side.split_off(last.grid.n_lines)
        } else {
            side.truncate(last.grid.n_lines);
            side
        })
    }

    /// Flows at the from end of every line after the last power flow.
    pub fn line_or_results(&self) -> Result<Vec<BranchEndResult>> {
        self.branch_results(false, false)
    }

    /// Flows at the to end of every line after the last power flow.
    pub fn line_ex_results(&self) -> Result<Vec<BranchEndResult>> {
        self.branch_results(false, true)
    }

    pub fn trafo_hv_results(&self) -> Result<Vec<BranchEndResult>> {
        self.branch_results(true, false)
    }

    pub fn trafo_lv_results(&self) -> Result<Vec<BranchEndResult>> {
        self.branch_results(true, true)
    }

    /// Generator output of the last power flow, with the setpoints it used.
    pub fn gen_results(&self) -> Result<Vec<InjectionResult>> {
        let last = self.last()?;
        Ok(last
            .grid
            .gen_results(&last.setpoints, &last.grid.gather(&last.v)))
    }

    pub fn load_results(&self) -> Result<Vec<InjectionResult>> {
        let last = self.last()?;
        let v = last.grid.gather(&last.v);
        Ok(last.grid.injector_results(&last.grid.loads, &last.setpoints.loads, &v))
    }

    pub fn sgen_results(&self) -> Result<Vec<InjectionResult>> {
        let last = self.last()?;
        let v = last.grid.gather(&last.v);
        Ok(last.grid.injector_results(&last.grid.sgens, &last.setpoints.sgens, &v))
    }

    pub fn storage_results(&self) -> Result<Vec<InjectionResult>> {
        let last = self.last()?;
        let v = last.grid.gather(&last.v);
        Ok(last
            .grid
            .injector_results(&last.grid.storages, &last.setpoints.storages, &v))
    }

    /// Algorithm / back end pairs usable in this build.
    pub fn available_solvers(&self) -> Vec<(SolverType, Option<LinearSolverKind>)> {
        available_solvers()
    }
}
