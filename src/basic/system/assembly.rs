use std::collections::VecDeque;

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;
use num_traits::Zero;
use tracing::{debug, warn};

use super::{GridModel, Setpoints, TopologyId};
use crate::basic::elements::{Branch, BusElement, Injector};
use crate::basic::error::{PfError, Result};
use crate::basic::powerflow::problem::SlackGroup;
use crate::basic::powerflow::PfProblem;

/// Solver bus of every injector of one kind.
#[derive(Debug, Clone, Default)]
pub(crate) struct InjectorMap {
    /// `None` for elements out of service or sitting on an isolated bus.
    pub bus: Vec<Option<usize>>,
    /// Consumers (loads, storage) enter the bus balance with a negative sign.
    pub consumer: bool,
}

impl InjectorMap {
    fn build<T: Injector>(elements: &[T], bus_to_solver: &[Option<usize>], consumer: bool) -> Self {
        InjectorMap {
            bus: elements
                .iter()
                .map(|e| e.in_service().then(|| bus_to_solver[e.bus()]).flatten())
                .collect(),
            consumer,
        }
    }

    pub fn len(&self) -> usize {
        self.bus.len()
    }

    /// Adds the signed injections `base` (MVA) to `sbus`, divided by `sn_mva`.
    pub fn add(&self, base: &[Complex64], sbus: &mut DVector<Complex64>, sn_mva: f64) {
        for (s, bus) in base.iter().zip(&self.bus) {
            if let Some(b) = *bus {
                sbus[b] += s / sn_mva;
            }
        }
    }

    /// Adds injections where `p(i)` / `q(i)` override the signed setpoint
    /// `base[i]`. Overrides are given as produced (generators) or consumed
    /// (loads, storage) power.
    pub fn add_overridden<P, Q>(
        &self,
        base: &[Complex64],
        sbus: &mut DVector<Complex64>,
        sn_mva: f64,
        p: P,
        q: Q,
    ) where
        P: Fn(usize) -> Option<f64>,
        Q: Fn(usize) -> Option<f64>,
    {
        let sign = if self.consumer { -1.0 } else { 1.0 };
        for (i, bus) in self.bus.iter().enumerate() {
            let Some(b) = *bus else { continue };
            let s = Complex64::new(
                p(i).map_or(base[i].re, |v| sign * v),
                q(i).map_or(base[i].im, |v| sign * v),
            );
            sbus[b] += s / sn_mva;
        }
    }
}

/// Two-port data of one in-service branch, indexed by solver bus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchFlow {
    pub from: usize,
    pub to: usize,
    pub yff: Complex64,
    pub yft: Complex64,
    pub ytf: Complex64,
    pub ytt: Complex64,
    /// Nominal voltage of the from (hv) bus.
    pub vn_from_kv: f64,
    /// Nominal voltage of the to (lv) bus.
    pub vn_to_kv: f64,
}

impl BranchFlow {
    /// Per unit current entering the branch at its from side.
    pub fn current_from(&self, vf: Complex64, vt: Complex64) -> Complex64 {
        self.yff * vf + self.yft * vt
    }

    /// Per unit current entering the branch at its to side.
    pub fn current_to(&self, vf: Complex64, vt: Complex64) -> Complex64 {
        self.ytf * vf + self.ytt * vt
    }
}

/// Immutable result of assembling one topology.
///
/// Shared through an `Arc` by every solve and batch running on that topology.
/// Solver bus indices are a compact renumbering of the in-service,
/// non-isolated buses in ascending order. Power and voltage setpoints are not
/// part of it; see [`Setpoints`].
#[derive(Debug, Clone)]
pub struct AssembledGrid {
    pub(crate) topology_id: TopologyId,
    pub(crate) sn_mva: f64,
    pub(crate) n_bus_total: usize,
    pub(crate) bus_to_solver: Vec<Option<usize>>,
    pub(crate) solver_to_bus: Vec<usize>,
    /// Nominal voltage per solver bus.
    pub(crate) vn_kv: Vec<f64>,
    pub(crate) ybus: CscMatrix<Complex64>,
    pub(crate) problem: PfProblem,
    pub(crate) isolated: Vec<usize>,
    pub(crate) gens: InjectorMap,
    /// Slack weight of every in-service slack generator, `None` otherwise.
    pub(crate) gen_slack: Vec<Option<f64>>,
    pub(crate) sgens: InjectorMap,
    pub(crate) loads: InjectorMap,
    pub(crate) storages: InjectorMap,
    pub(crate) n_lines: usize,
    /// Lines first, then transformers; `None` when out of service.
    pub(crate) branches: Vec<Option<BranchFlow>>,
}

impl AssembledGrid {
    pub fn topology_id(&self) -> TopologyId {
        self.topology_id
    }

    pub fn sn_mva(&self) -> f64 {
        self.sn_mva
    }

    /// Number of buses of the grid model, solved or not.
    pub fn n_bus_total(&self) -> usize {
        self.n_bus_total
    }

    pub fn n_solver_bus(&self) -> usize {
        self.solver_to_bus.len()
    }

    /// Admittance matrix in solver bus order.
    pub fn ybus(&self) -> &CscMatrix<Complex64> {
        &self.ybus
    }

    pub fn problem(&self) -> &PfProblem {
        &self.problem
    }

    pub fn isolated_buses(&self) -> &[usize] {
        &self.isolated
    }

    pub fn solver_bus(&self, bus: usize) -> Option<usize> {
        self.bus_to_solver.get(bus).copied().flatten()
    }

    pub fn solver_to_bus(&self) -> &[usize] {
        &self.solver_to_bus
    }

    pub fn n_branches(&self) -> usize {
        self.branches.len()
    }

    /// Two-port data of branch `j` (lines first), `None` when out of service.
    pub fn branch(&self, j: usize) -> Option<&BranchFlow> {
        self.branches.get(j).and_then(Option::as_ref)
    }

    /// Generator voltage setpoints per solver bus from per generator
    /// magnitudes and reference angles (rad).
    pub(crate) fn voltage_setpoints(&self, gen_vm: &[f64], gen_va: &[f64]) -> Vec<Option<(f64, Option<f64>)>> {
        let refs = self.problem.ref_buses();
        let mut out: Vec<Option<(f64, Option<f64>)>> = vec![None; self.n_solver_bus()];
        for (j, bus) in self.gens.bus.iter().enumerate() {
            let Some(b) = *bus else { continue };
            let vm = gen_vm[j];
            match out[b] {
                None => {
                    let angle = refs.contains(&b).then(|| self.ref_angle(gen_va, b));
                    out[b] = Some((vm, angle));
                }
                Some((kept, _)) if kept != vm => {
                    warn!(bus = self.solver_to_bus[b], kept, ignored = vm, "conflicting generator voltage setpoints");
                }
                Some(_) => {}
            }
        }
        out
    }

    /// Angle of the first in-service slack generator at solver bus `b`.
    fn ref_angle(&self, gen_va: &[f64], b: usize) -> f64 {
        self.gens
            .bus
            .iter()
            .zip(&self.gen_slack)
            .position(|(bus, slack)| *bus == Some(b) && slack.is_some())
            .map_or(0.0, |j| gen_va[j])
    }

    /// Initial voltage in solver order with generator setpoints applied.
    ///
    /// PV buses keep the angle of the guess; reference buses take the angle
    /// of their slack generator.
    pub(crate) fn initial_voltage(
        &self,
        v_init: &DVector<Complex64>,
        setpoints: &[Option<(f64, Option<f64>)>],
    ) -> Result<DVector<Complex64>> {
        if v_init.len() != self.n_bus_total {
            return Err(PfError::dimension("V init", self.n_bus_total, v_init.len()));
        }
        let mut v = self.gather(v_init);
        for (k, sp) in setpoints.iter().enumerate() {
            match *sp {
                Some((vm, Some(va))) => v[k] = Complex64::from_polar(vm, va),
                Some((vm, None)) => {
                    let angle = if v[k].norm() > 0.0 { v[k].arg() } else { 0.0 };
                    v[k] = Complex64::from_polar(vm, angle);
                }
                None => {}
            }
        }
        Ok(v)
    }

    /// Model-indexed vector to solver order.
    pub(crate) fn gather(&self, v: &DVector<Complex64>) -> DVector<Complex64> {
        DVector::from_iterator(self.n_solver_bus(), self.solver_to_bus.iter().map(|&b| v[b]))
    }

    /// Writes solver-order voltages into a copy of `fill`, which keeps the
    /// entries of buses outside the solve.
    pub(crate) fn scatter(&self, v: &DVector<Complex64>, fill: &DVector<Complex64>) -> DVector<Complex64> {
        let mut out = fill.clone();
        for (k, &b) in self.solver_to_bus.iter().enumerate() {
            out[b] = v[k];
        }
        out
    }

    /// Per unit injections of `setpoints` in solver order.
    pub(crate) fn sbus(&self, setpoints: &Setpoints) -> DVector<Complex64> {
        let mut sbus = DVector::zeros(self.n_solver_bus());
        self.gens.add(&setpoints.gens, &mut sbus, self.sn_mva);
        self.sgens.add(&setpoints.sgens, &mut sbus, self.sn_mva);
        self.loads.add(&setpoints.loads, &mut sbus, self.sn_mva);
        self.storages.add(&setpoints.storages, &mut sbus, self.sn_mva);
        sbus
    }

    /// Current magnitude in kA at the from side of every branch for the
    /// model-indexed voltages `v`. Out-of-service branches are zero.
    pub(crate) fn from_currents_ka<V>(&self, v: V) -> Vec<f64>
    where
        V: Fn(usize) -> Complex64,
    {
        let scale = self.sn_mva / 3f64.sqrt();
        self.branches
            .iter()
            .map(|br| match br {
                Some(br) => {
                    let vf = v(self.solver_to_bus[br.from]);
                    let vt = v(self.solver_to_bus[br.to]);
                    br.current_from(vf, vt).norm() * scale / br.vn_from_kv
                }
                None => 0.0,
            })
            .collect()
    }
}

fn check_bus(grid: &GridModel, kind: &'static str, id: usize, bus: usize, in_service: bool) -> Result<()> {
    let Some(b) = grid.buses.get(bus) else {
        return Err(PfError::invalid(kind, id, format!("bus {bus} does not exist")));
    };
    if in_service && !b.in_service {
        return Err(PfError::invalid(kind, id, format!("connected to out-of-service bus {bus}")));
    }
    Ok(())
}

fn check_injectors<T: BusElement>(grid: &GridModel, kind: &'static str, elements: &[T]) -> Result<()> {
    elements
        .iter()
        .enumerate()
        .try_for_each(|(id, e)| check_bus(grid, kind, id, e.bus(), e.in_service()))
}

fn check_branches<T: Branch>(grid: &GridModel, kind: &'static str, elements: &[T]) -> Result<()> {
    for (id, br) in elements.iter().enumerate() {
        if br.from_bus() == br.to_bus() {
            return Err(PfError::invalid(kind, id, "both ends on the same bus"));
        }
        check_bus(grid, kind, id, br.from_bus(), br.in_service())?;
        check_bus(grid, kind, id, br.to_bus(), br.in_service())?;
    }
    Ok(())
}

/// Referential checks of every element against the bus table.
pub(crate) fn validate(grid: &GridModel) -> Result<()> {
    check_branches(grid, "line", &grid.lines)?;
    check_branches(grid, "transformer", &grid.transformers)?;
    check_injectors(grid, "load", &grid.loads)?;
    check_injectors(grid, "generator", &grid.generators)?;
    check_injectors(grid, "static generator", &grid.static_generators)?;
    check_injectors(grid, "storage", &grid.storages)?;
    check_injectors(grid, "shunt", &grid.shunts)?;
    Ok(())
}

/// In-service branches as `(from, to)` pairs of model bus indices.
fn branch_ends(grid: &GridModel) -> impl Iterator<Item = (usize, usize)> + '_ {
    let lines = grid
        .lines
        .iter()
        .filter(|l| l.in_service)
        .map(|l| (l.from_bus, l.to_bus));
    let trafos = grid
        .transformers
        .iter()
        .filter(|t| t.in_service)
        .map(|t| (t.hv_bus, t.lv_bus));
    lines.chain(trafos)
}

/// Connected components of the in-service buses, each sorted ascending.
fn components(grid: &GridModel) -> Vec<Vec<usize>> {
    let n = grid.buses.len();
    let mut adjacency = vec![Vec::new(); n];
    for (f, t) in branch_ends(grid) {
        adjacency[f].push(t);
        adjacency[t].push(f);
    }
    let mut seen = vec![false; n];
    let mut out = Vec::new();
    for start in (0..n).filter(|&b| grid.buses[b].in_service) {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut comp = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(b) = queue.pop_front() {
            for &next in &adjacency[b] {
                if !seen[next] {
                    seen[next] = true;
                    comp.push(next);
                    queue.push_back(next);
                }
            }
        }
        comp.sort_unstable();
        out.push(comp);
    }
    out
}

/// Builds the solver view of `grid`. Deterministic: the same model always
/// yields the same matrices, bit for bit.
pub(crate) fn assemble(grid: &GridModel) -> Result<AssembledGrid> {
    validate(grid)?;
    let n_total = grid.buses.len();

    let mut slack_weight = vec![0.0; n_total];
    let mut is_slack = vec![false; n_total];
    let mut has_gen = vec![false; n_total];
    for g in grid.generators.iter().filter(|g| g.in_service) {
        has_gen[g.bus] = true;
        if g.is_slack {
            is_slack[g.bus] = true;
            slack_weight[g.bus] += g.effective_weight();
        }
    }
    if !is_slack.iter().any(|&s| s) {
        return Err(PfError::NoSlackBus {
            buses: (0..n_total).filter(|&b| grid.buses[b].in_service).collect(),
        });
    }

    let mut isolated = Vec::new();
    let mut solved = Vec::new();
    for comp in components(grid) {
        match comp.iter().copied().find(|&b| is_slack[b]) {
            Some(reference) => solved.push((reference, comp)),
            None if comp.len() == 1 => {
                warn!(bus = comp[0], "isolated bus without slack excluded from the power flow");
                isolated.push(comp[0]);
            }
            None => return Err(PfError::NoSlackBus { buses: comp }),
        }
    }

    let mut bus_to_solver = vec![None; n_total];
    let mut solver_to_bus: Vec<usize> = solved.iter().flat_map(|(_, c)| c.iter().copied()).collect();
    solver_to_bus.sort_unstable();
    for (k, &b) in solver_to_bus.iter().enumerate() {
        bus_to_solver[b] = Some(k);
    }
    let n = solver_to_bus.len();
    let idx = |b: usize| bus_to_solver[b].unwrap_or(usize::MAX);

    let mut groups = Vec::with_capacity(solved.len());
    let mut pv = Vec::new();
    for (reference, comp) in &solved {
        let raw: Vec<(usize, f64)> = comp
            .iter()
            .filter(|&&b| is_slack[b])
            .map(|&b| (idx(b), slack_weight[b]))
            .collect();
        if raw.len() > 1 {
            debug!(reference, slack_buses = raw.len(), "slack shared inside one component");
        }
        groups.push(SlackGroup::new(idx(*reference), &raw));
        pv.extend(
            comp.iter()
                .filter(|&&b| has_gen[b] && b != *reference)
                .map(|&b| idx(b)),
        );
    }

    let mut coo = CooMatrix::new(n, n);
    for k in 0..n {
        coo.push(k, k, Complex64::zero());
    }
    let mut branches = Vec::with_capacity(grid.lines.len() + grid.transformers.len());
    let two_ports = grid
        .lines
        .iter()
        .map(|l| l as &dyn Branch)
        .chain(grid.transformers.iter().map(|t| t as &dyn Branch));
    for br in two_ports {
        if !br.in_service() {
            branches.push(None);
            continue;
        }
        let (f, t) = (idx(br.from_bus()), idx(br.to_bus()));
        let tp = br.two_port();
        coo.push(f, f, tp.yff);
        coo.push(f, t, tp.yft);
        coo.push(t, f, tp.ytf);
        coo.push(t, t, tp.ytt);
        branches.push(Some(BranchFlow {
            from: f,
            to: t,
            yff: tp.yff,
            yft: tp.yft,
            ytf: tp.ytf,
            ytt: tp.ytt,
            vn_from_kv: grid.buses[br.from_bus()].vn_kv,
            vn_to_kv: grid.buses[br.to_bus()].vn_kv,
        }));
    }
    for sh in grid.shunts.iter().filter(|s| s.in_service) {
        if let Some(k) = bus_to_solver[sh.bus] {
            coo.push(k, k, sh.admittance(grid.sn_mva));
        }
    }
    let ybus = CscMatrix::from(&coo);

    let topology_id = TopologyId::next();
    let problem = PfProblem::with_components(&ybus, &pv, &groups, topology_id)?;
    debug!(
        %topology_id,
        n_bus = n,
        npv = problem.npv(),
        npq = problem.npq(),
        nref = problem.nref(),
        "assembled topology"
    );

    Ok(AssembledGrid {
        topology_id,
        sn_mva: grid.sn_mva,
        n_bus_total: n_total,
        vn_kv: solver_to_bus.iter().map(|&b| grid.buses[b].vn_kv).collect(),
        gens: InjectorMap::build(&grid.generators, &bus_to_solver, false),
        gen_slack: grid
            .generators
            .iter()
            .map(|g| (g.in_service && g.is_slack).then(|| g.effective_weight()))
            .collect(),
        sgens: InjectorMap::build(&grid.static_generators, &bus_to_solver, false),
        loads: InjectorMap::build(&grid.loads, &bus_to_solver, true),
        storages: InjectorMap::build(&grid.storages, &bus_to_solver, true),
        bus_to_solver,
        solver_to_bus,
        ybus,
        problem,
        isolated,
        n_lines: grid.lines.len(),
        branches,
    })
}
