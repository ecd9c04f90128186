use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::basic::error::{PfError, Result};
use crate::basic::system::{AssembledGrid, Setpoints};

/// Injection setpoints of many scenarios on one topology.
///
/// Every matrix has one row per scenario and one column per element of the
/// grid model (out-of-service elements included, their column is ignored).
/// Values are in MW / MVAr; loads and storage give consumed power.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioBatch {
    pub gen_p: DMatrix<f64>,
    pub sgen_p: DMatrix<f64>,
    pub load_p: DMatrix<f64>,
    pub load_q: DMatrix<f64>,
    /// Reactive output of static generators; the setpoint snapshot when absent.
    pub sgen_q: Option<DMatrix<f64>>,
    /// Storage charging power; the setpoint snapshot when absent.
    pub storage_p: Option<DMatrix<f64>>,
    /// Generator voltage magnitudes in per unit; the setpoint snapshot when absent.
    pub gen_v: Option<DMatrix<f64>>,
}

impl ScenarioBatch {
    pub fn new(
        gen_p: DMatrix<f64>,
        sgen_p: DMatrix<f64>,
        load_p: DMatrix<f64>,
        load_q: DMatrix<f64>,
    ) -> Self {
        ScenarioBatch {
            gen_p,
            sgen_p,
            load_p,
            load_q,
            sgen_q: None,
            storage_p: None,
            gen_v: None,
        }
    }

    pub fn with_sgen_q(mut self, sgen_q: DMatrix<f64>) -> Self {
        self.sgen_q = Some(sgen_q);
        self
    }

    pub fn with_storage_p(mut self, storage_p: DMatrix<f64>) -> Self {
        self.storage_p = Some(storage_p);
        self
    }

    pub fn with_gen_v(mut self, gen_v: DMatrix<f64>) -> Self {
        self.gen_v = Some(gen_v);
        self
    }

    /// `n` copies of the active and reactive setpoints of `setpoints`.
    pub fn repeat_base(setpoints: &Setpoints, n: usize) -> Self {
        let rows = |base: &[Complex64], sign: f64, part: fn(Complex64) -> f64| {
            DMatrix::from_fn(n, base.len(), |_, j| sign * part(base[j]))
        };
        ScenarioBatch::new(
            rows(&setpoints.gens, 1.0, |s| s.re),
            rows(&setpoints.sgens, 1.0, |s| s.re),
            rows(&setpoints.loads, -1.0, |s| s.re),
            rows(&setpoints.loads, -1.0, |s| s.im),
        )
    }

    pub fn n_scenarios(&self) -> usize {
        self.gen_p.nrows()
    }

    /// Shape checks against `grid`, returning the scenario count.
    pub(crate) fn check(&self, grid: &AssembledGrid) -> Result<usize> {
        let n = self.n_scenarios();
        let shapes = [
            ("gen_p", Some(&self.gen_p), grid.gens.len()),
            ("sgen_p", Some(&self.sgen_p), grid.sgens.len()),
            ("load_p", Some(&self.load_p), grid.loads.len()),
            ("load_q", Some(&self.load_q), grid.loads.len()),
            ("sgen_q", self.sgen_q.as_ref(), grid.sgens.len()),
            ("storage_p", self.storage_p.as_ref(), grid.storages.len()),
            ("gen_v", self.gen_v.as_ref(), grid.gens.len()),
        ];
        for (what, m, cols) in shapes {
            let Some(m) = m else { continue };
            if m.ncols() != cols {
                return Err(PfError::dimension(what, cols, m.ncols()));
            }
            if m.nrows() != n {
                return Err(PfError::dimension(what, n, m.nrows()));
            }
        }
        Ok(n)
    }

    /// Generator voltage magnitudes of scenario `i`, when overridden.
    pub(crate) fn gen_vm(&self, i: usize) -> Option<Vec<f64>> {
        self.gen_v
            .as_ref()
            .map(|m| m.row(i).iter().copied().collect())
    }

    /// Per unit injections of scenario `i` in solver bus order. Fields left
    /// out of the batch fall back to `setpoints`.
    pub(crate) fn sbus(&self, grid: &AssembledGrid, setpoints: &Setpoints, i: usize) -> DVector<Complex64> {
        let sn = grid.sn_mva();
        let mut sbus = DVector::zeros(grid.n_solver_bus());
        grid.gens.add_overridden(
            &setpoints.gens,
            &mut sbus,
            sn,
            |j| Some(self.gen_p[(i, j)]),
            |_| None,
        );
        grid.sgens.add_overridden(
            &setpoints.sgens,
            &mut sbus,
            sn,
            |j| Some(self.sgen_p[(i, j)]),
            |j| self.sgen_q.as_ref().map(|m| m[(i, j)]),
        );
        grid.loads.add_overridden(
            &setpoints.loads,
            &mut sbus,
            sn,
            |j| Some(self.load_p[(i, j)]),
            |j| Some(self.load_q[(i, j)]),
        );
        grid.storages.add_overridden(
            &setpoints.storages,
            &mut sbus,
            sn,
            |j| self.storage_p.as_ref().map(|m| m[(i, j)]),
            |_| None,
        );
        sbus
    }
}
