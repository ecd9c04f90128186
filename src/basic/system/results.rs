//! Per element quantities derived from a solved voltage vector.

use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::assembly::{AssembledGrid, InjectorMap};
use super::Setpoints;

/// Flow at one end of a line or transformer. Power enters the branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchEndResult {
    pub p_mw: f64,
    pub q_mvar: f64,
    pub v_kv: f64,
    pub a_ka: f64,
}

/// Power of a single-bus element and the voltage of its bus.
///
/// Generators report produced power, loads and storage consumed power.
/// Elements out of service or on a bus outside the solve report zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InjectionResult {
    pub p_mw: f64,
    pub q_mvar: f64,
    pub v_kv: f64,
    pub va_degree: f64,
}

impl AssembledGrid {
    fn at_bus(&self, v: &DVector<Complex64>, b: usize) -> InjectionResult {
        InjectionResult {
            v_kv: v[b].norm() * self.vn_kv[b],
            va_degree: v[b].arg().to_degrees(),
            ..Default::default()
        }
    }

    /// From and to side flows of every branch, lines first. `v` is in
    /// solver order.
    pub(crate) fn branch_results(&self, v: &DVector<Complex64>) -> (Vec<BranchEndResult>, Vec<BranchEndResult>) {
        let sn = self.sn_mva;
        let end = |vk: Complex64, i: Complex64, vn_kv: f64| {
            let s = vk * i.conj() * sn;
            BranchEndResult {
                p_mw: s.re,
                q_mvar: s.im,
                v_kv: vk.norm() * vn_kv,
                a_ka: i.norm() * sn / (3f64.sqrt() * vn_kv),
            }
        };
        self.branches
            .iter()
            .map(|br| match br {
                Some(br) => {
                    let (vf, vt) = (v[br.from], v[br.to]);
                    (
                        end(vf, br.current_from(vf, vt), br.vn_from_kv),
                        end(vt, br.current_to(vf, vt), br.vn_to_kv),
                    )
                }
                None => Default::default(),
            })
            .unzip()
    }

    /// Loads, static generators and storage report their setpoints.
    pub(crate) fn injector_results(
        &self,
        map: &InjectorMap,
        base: &[Complex64],
        v: &DVector<Complex64>,
    ) -> Vec<InjectionResult> {
        let sign = if map.consumer { -1.0 } else { 1.0 };
        map.bus
            .iter()
            .zip(base)
            .map(|(bus, s)| match *bus {
                Some(b) => InjectionResult {
                    p_mw: sign * s.re,
                    q_mvar: sign * s.im,
                    ..self.at_bus(v, b)
                },
                None => InjectionResult::default(),
            })
            .collect()
    }

    /// Generator output after a power flow.
    ///
    /// The reactive power left at a bus once every other injection is
    /// subtracted is split evenly between its generators. Active power above
    /// the setpoints goes to the slack generators of the bus in proportion to
    /// their weight.
    pub(crate) fn gen_results(&self, setpoints: &Setpoints, v: &DVector<Complex64>) -> Vec<InjectionResult> {
        let n = self.n_solver_bus();
        let computed = v
            .component_mul(&(&self.ybus * v).conjugate())
            .map(|s| s * self.sn_mva);
        let mut scheduled = DVector::zeros(n);
        self.gens.add(&setpoints.gens, &mut scheduled, 1.0);
        self.sgens.add(&setpoints.sgens, &mut scheduled, 1.0);
        self.loads.add(&setpoints.loads, &mut scheduled, 1.0);
        self.storages.add(&setpoints.storages, &mut scheduled, 1.0);
        let residual = computed - scheduled;

        let mut n_gen = vec![0usize; n];
        let mut n_slack = vec![0usize; n];
        let mut weight = vec![0.0; n];
        for (bus, slack) in self.gens.bus.iter().zip(&self.gen_slack) {
            let Some(b) = *bus else { continue };
            n_gen[b] += 1;
            if let Some(w) = slack {
                n_slack[b] += 1;
                weight[b] += w;
            }
        }

        self.gens
            .bus
            .iter()
            .zip(&self.gen_slack)
            .zip(&setpoints.gens)
            .map(|((bus, slack), s)| {
                let Some(b) = *bus else {
                    return InjectionResult::default();
                };
                let share = match *slack {
                    Some(w) if weight[b] > 0.0 => w / weight[b],
                    Some(_) => 1.0 / n_slack[b] as f64,
                    None => 0.0,
                };
                InjectionResult {
                    p_mw: s.re + residual[b].re * share,
                    q_mvar: residual[b].im / n_gen[b] as f64,
                    ..self.at_bus(v, b)
                }
            })
            .collect()
    }
}
