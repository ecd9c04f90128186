//! Reference networks embedded in the crate.

use crate::basic::error::{PfError, Result};
use crate::basic::system::GridModel;

/// IEEE 14-bus test system on a 100 MVA base, with bus 1 as slack.
pub const IEEE_14: &str = include_str!("case14.json");

pub fn case14() -> Result<GridModel> {
    serde_json::from_str(IEEE_14).map_err(|e| PfError::InvalidConfig(format!("case14: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::powerflow::{SolverConfig, SolverStatus, SolverType};
    use crate::basic::solver::LinearSolverKind;
    use crate::basic::system::ElementId;
    use crate::batch::{BatchConfig, Computers, FailurePolicy, ScenarioBatch, SecurityAnalysis};
    use approx::assert_abs_diff_eq;
    use nalgebra::{DMatrix, DVector, Dim, Matrix, Storage};
    use num_complex::Complex64;
    use std::sync::Arc;

    const VM: [f64; 14] = [
        1.06,
        1.045,
        1.01,
        1.0176708536917647,
        1.0195138598190605,
        1.07,
        1.0615195324909386,
        1.09,
        1.0559317206369714,
        1.0509846249998473,
        1.0569065185403648,
        1.0551885631971039,
        1.0503817136285944,
        1.0355299458535658,
    ];

    const VA: [f64; 14] = [
        0.0,
        -4.98258914197503,
        -12.725099938267958,
        -10.312901092331613,
        -8.773853898295378,
        -14.220946463702134,
        -13.35962736534635,
        -13.35962736534635,
        -14.938521295229092,
        -15.097288463071084,
        -14.790622031321648,
        -15.075584520424385,
        -15.15627633622205,
        -16.033644529205592,
    ];

    fn flat() -> DVector<Complex64> {
        DVector::from_element(14, Complex64::new(1.0, 0.0))
    }

    fn solve(algo: SolverType) -> (DVector<Complex64>, SolverStatus, usize) {
        let mut grid = case14().unwrap();
        let res = grid.ac_pf(&flat(), &SolverConfig::new(algo)).unwrap();
        (res.v, res.status, res.iterations)
    }

    fn max_diff<R, C, S1, S2>(a: &Matrix<Complex64, R, C, S1>, b: &Matrix<Complex64, R, C, S2>) -> f64
    where
        R: Dim,
        C: Dim,
        S1: Storage<Complex64, R, C>,
        S2: Storage<Complex64, R, C>,
    {
        assert_eq!(a.shape(), b.shape());
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).norm()).fold(0.0, f64::max)
    }

    #[test]
    fn test_case14_loads() {
        let mut grid = case14().unwrap();
        assert_eq!(grid.n_bus(), 14);
        assert_eq!(grid.lines().len() + grid.transformers().len(), 20);
        let a = grid.assemble().unwrap();
        assert_eq!((a.problem().npv(), a.problem().npq(), a.problem().nref()), (4, 9, 1));
    }

    #[test]
    fn test_newton_matches_reference_solution() {
        for algo in [SolverType::NewtonRaphson, SolverType::NewtonRaphsonSingleSlack] {
            let (v, status, iterations) = solve(algo);
            assert_eq!(status, SolverStatus::Converged, "{algo:?}");
            assert!(iterations <= 10, "{algo:?} took {iterations} iterations");
            for k in 0..14 {
                assert_abs_diff_eq!(v[k].norm(), VM[k], epsilon = 1e-6);
                assert_abs_diff_eq!(v[k].arg().to_degrees(), VA[k], epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_single_and_full_slack_agree() {
        let (full, ..) = solve(SolverType::NewtonRaphson);
        let (single, ..) = solve(SolverType::NewtonRaphsonSingleSlack);
        assert!(max_diff(&full, &single) < 1e-6);
    }

    #[test]
    fn test_gauss_seidel_agrees_with_newton() {
        let (nr, ..) = solve(SolverType::NewtonRaphsonSingleSlack);
        for algo in [SolverType::GaussSeidel, SolverType::GaussSeidelSynch] {
            let (gs, status, iterations) = solve(algo);
            assert_eq!(status, SolverStatus::Converged, "{algo:?}");
            assert!(iterations > 10, "{algo:?} converged suspiciously fast");
            assert!(max_diff(&gs, &nr) < 1e-5, "{algo:?} deviates from newton");
        }
    }

    #[test]
    fn test_every_backend_gives_the_same_voltages() {
        let (reference, ..) = solve(SolverType::NewtonRaphson);
        for kind in LinearSolverKind::available() {
            let mut grid = case14().unwrap();
            let cfg = SolverConfig::new(SolverType::NewtonRaphson).with_linear_solver(kind);
            let res = grid.ac_pf(&flat(), &cfg).unwrap();
            assert!(res.status.is_converged(), "{kind:?}");
            assert!(max_diff(&res.v, &reference) < 1e-8, "{kind:?}");
        }
    }

    #[test]
    fn test_solving_twice_is_bit_identical() {
        let mut grid = case14().unwrap();
        for algo in SolverType::ALL {
            let cfg = SolverConfig::new(algo);
            let a = grid.ac_pf(&flat(), &cfg).unwrap();
            let b = grid.ac_pf(&flat(), &cfg).unwrap();
            assert_eq!(a.v, b.v, "{algo:?}");
            assert_eq!(a.iterations, b.iterations);
        }
    }

    #[test]
    fn test_max_iter_zero() {
        let mut grid = case14().unwrap();
        let cfg = SolverConfig::new(SolverType::NewtonRaphson).with_max_iter(0);
        let res = grid.ac_pf(&flat(), &cfg).unwrap();
        assert_eq!((res.status, res.iterations), (SolverStatus::MaxIterExceeded, 0));
        assert_eq!(res.v[3], Complex64::new(1.0, 0.0));
        assert_eq!(res.v[1], Complex64::new(1.045, 0.0), "setpoints are applied before solving");
    }

    #[test]
    fn test_distributed_slack_shares_imbalance() {
        let mut grid = case14().unwrap();
        grid.generators[0].p_mw = 132.4;
        grid.generators[0].slack_weight = 0.5;
        grid.generators[1] = grid.generators[1].clone().with_slack_weight(0.5);
        let res = grid
            .ac_pf(&flat(), &SolverConfig::new(SolverType::NewtonRaphson))
            .unwrap();
        assert!(res.status.is_converged());
        // both slack generators pick up the same extra active power
        let a = grid.assemble().unwrap();
        let v = DVector::from_iterator(14, a.solver_to_bus().iter().map(|&b| res.v[b]));
        let s = v.component_mul(&(a.ybus() * &v).conjugate());
        let extra0 = s[0].re - 1.324;
        let extra1 = s[1].re - (0.4 - 0.217);
        assert_abs_diff_eq!(extra0, extra1, epsilon = 1e-7);
        assert!(extra0 > 0.4, "slack buses share the 100 MW deficit");
    }

    fn scenarios(grid: &mut GridModel, n: usize) -> ScenarioBatch {
        let mut batch = ScenarioBatch::repeat_base(&grid.setpoints().unwrap(), n);
        for i in 0..n {
            let scale = 0.9 + 0.05 * i as f64;
            batch.load_p.row_mut(i).scale_mut(scale);
            batch.load_q.row_mut(i).scale_mut(scale);
        }
        batch
    }

    #[test]
    fn test_batch_matches_individual_solves() {
        let mut grid = case14().unwrap();
        let batch = scenarios(&mut grid, 5);
        let cfg = SolverConfig::new(SolverType::NewtonRaphson);
        let mut seq = Computers::from_grid(&mut grid).unwrap();
        let status = seq
            .compute_vs(&batch, &flat(), &cfg, &BatchConfig::sequential())
            .unwrap();
        assert!(status.all_converged());
        let mut par = Computers::new(Arc::clone(seq.grid()), seq.setpoints().clone()).unwrap();
        par.compute_vs(&batch, &flat(), &cfg, &BatchConfig::default().with_threads(3))
            .unwrap();
        assert!(max_diff(seq.get_voltages(), par.get_voltages()) < 1e-10);

        for i in 0..5 {
            for j in 0..grid.loads().len() {
                grid.change_p(ElementId::Load(j), batch.load_p[(i, j)]).unwrap();
                grid.change_q(ElementId::Load(j), batch.load_q[(i, j)]).unwrap();
            }
            let res = grid.ac_pf(&flat(), &cfg).unwrap();
            let row = seq.get_voltages().row(i).transpose();
            assert!(max_diff(&res.v, &row) < 1e-10, "scenario {i}");
        }
    }

    #[test]
    fn test_concurrent_batches_share_topology() {
        let mut grid = case14().unwrap();
        let batch = scenarios(&mut grid, 4);
        let shared = grid.assemble().unwrap();
        let setpoints = grid.setpoints().unwrap();
        let cfg = SolverConfig::new(SolverType::NewtonRaphsonSingleSlack);
        let mut reference = Computers::new(Arc::clone(&shared), setpoints.clone()).unwrap();
        reference
            .compute_vs(&batch, &flat(), &cfg, &BatchConfig::sequential())
            .unwrap();
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..3)
                .map(|_| {
                    let shared = Arc::clone(&shared);
                    let (batch, cfg, setpoints) = (&batch, &cfg, &setpoints);
                    s.spawn(move || {
                        let mut c = Computers::new(shared, setpoints.clone()).unwrap();
                        c.compute_vs(batch, &flat(), cfg, &BatchConfig::default().with_threads(2))
                            .unwrap();
                        c.get_voltages().clone()
                    })
                })
                .collect();
            for h in handles {
                assert!(max_diff(&h.join().unwrap(), reference.get_voltages()) < 1e-10);
            }
        });
    }

    #[test]
    fn test_failure_policies() {
        let mut grid = case14().unwrap();
        let mut batch = scenarios(&mut grid, 4);
        // scenario 1 is far beyond the loadability limit
        batch.load_p.row_mut(1).scale_mut(40.0);
        let cfg = SolverConfig::new(SolverType::NewtonRaphson);
        let mut c = Computers::from_grid(&mut grid).unwrap();

        let stop = c
            .compute_vs(&batch, &flat(), &cfg, &BatchConfig::sequential())
            .unwrap();
        assert_eq!(stop.nb_solved, 1);
        assert_eq!(stop.first_failed.map(|(i, _)| i), Some(1));
        assert!(!stop.all_converged());
        assert!(c.get_voltages().row(2).iter().all(|v| *v == Complex64::new(0.0, 0.0)));

        let par = c
            .compute_vs(&batch, &flat(), &cfg, &BatchConfig::default().with_threads(4))
            .unwrap();
        assert_eq!(par, stop);

        let all = c
            .compute_vs(
                &batch,
                &flat(),
                &cfg,
                &BatchConfig::sequential().with_failure_policy(FailurePolicy::RunAll),
            )
            .unwrap();
        assert_eq!(all.nb_solved, 3);
        assert_eq!(all.failed, vec![1]);
    }

    #[test]
    fn test_flows_need_a_solved_batch() {
        let mut grid = case14().unwrap();
        let mut c = Computers::from_grid(&mut grid).unwrap();
        assert!(matches!(c.compute_flows(), Err(PfError::NoResults(_))));

        let mut batch = ScenarioBatch::repeat_base(c.setpoints(), 2);
        batch.load_p.row_mut(1).scale_mut(1.1);
        c.compute_vs(
            &batch,
            &flat(),
            &SolverConfig::new(SolverType::NewtonRaphson),
            &BatchConfig::sequential(),
        )
        .unwrap();
        let flows = c.compute_flows().unwrap().clone();
        assert_eq!(flows.shape(), (2, 20));
        assert!(flows.iter().all(|f| f.is_finite() && *f > 0.0));
        assert_eq!(c.get_flows(), &flows);

        // line 1-2 and the 4-7 transformer, from the branch two-port by hand
        let grid = Arc::clone(c.grid());
        let v = c.get_voltages();
        for i in 0..2 {
            for j in [0, 17] {
                let br = grid.branch(j).unwrap();
                let vf = v[(i, grid.solver_to_bus()[br.from])];
                let vt = v[(i, grid.solver_to_bus()[br.to])];
                let current = (br.yff * vf + br.yft * vt).norm();
                let expected = current * grid.sn_mva() / (3f64.sqrt() * br.vn_from_kv);
                assert_abs_diff_eq!(flows[(i, j)], expected, epsilon = 1e-9);
            }
        }
        assert_abs_diff_eq!(flows[(0, 0)], 0.638290, epsilon = 1e-3);
        assert_abs_diff_eq!(flows[(0, 17)], 0.124797, epsilon = 1e-3);
        assert!(flows[(1, 0)] > flows[(0, 0)], "more load, more current");
    }

    #[test]
    fn test_batch_follows_setpoint_changes_after_assembly() {
        let mut grid = case14().unwrap();
        let stale = Computers::from_grid(&mut grid).unwrap();
        grid.change_v(1, 1.03).unwrap();
        grid.change_q(ElementId::Load(0), 0.0).unwrap();
        let cfg = SolverConfig::new(SolverType::NewtonRaphson);

        let mut c = Computers::from_grid(&mut grid).unwrap();
        assert!(Arc::ptr_eq(c.grid(), stale.grid()), "setpoint changes keep the assembly");
        let batch = ScenarioBatch::repeat_base(c.setpoints(), 1);
        assert_eq!(batch.load_q[(0, 0)], 0.0);
        let status = c
            .compute_vs(&batch, &flat(), &cfg, &BatchConfig::sequential())
            .unwrap();
        assert!(status.all_converged());

        let res = grid.ac_pf(&flat(), &cfg).unwrap();
        assert_abs_diff_eq!(res.v[1].norm(), 1.03, epsilon = 1e-12);
        assert_abs_diff_eq!(c.get_voltages()[(0, 1)].norm(), 1.03, epsilon = 1e-12);
        assert!(max_diff(&res.v, &c.get_voltages().row(0).transpose()) < 1e-10);
        assert_abs_diff_eq!(c.get_sbuses()[(0, 1)].im, 0.0, epsilon = 1e-12);

        // an older snapshot keeps the old setpoints until it is replaced
        assert_eq!(stale.setpoints().gen_vm()[1], 1.045);
        let mut refreshed = stale;
        refreshed.set_setpoints(grid.setpoints().unwrap()).unwrap();
        assert_eq!(refreshed.setpoints(), c.setpoints());

        grid.deactivate(ElementId::Line(6)).unwrap();
        assert!(matches!(
            refreshed.set_setpoints(grid.setpoints().unwrap()),
            Err(PfError::TopologyMismatch { .. })
        ));
    }

    #[test]
    fn test_batch_generator_voltages() {
        let mut grid = case14().unwrap();
        let cfg = SolverConfig::new(SolverType::NewtonRaphsonSingleSlack);
        let mut c = Computers::from_grid(&mut grid).unwrap();
        let base_vm = c.setpoints().gen_vm().to_vec();
        let gen_v = DMatrix::from_fn(2, base_vm.len(), |i, j| if (i, j) == (1, 1) { 1.03 } else { base_vm[j] });
        let batch = ScenarioBatch::repeat_base(c.setpoints(), 2).with_gen_v(gen_v);
        assert!(c
            .compute_vs(&batch, &flat(), &cfg, &BatchConfig::default().with_threads(2))
            .unwrap()
            .all_converged());

        let base = grid.ac_pf(&flat(), &cfg).unwrap();
        grid.change_v(1, 1.03).unwrap();
        let changed = grid.ac_pf(&flat(), &cfg).unwrap();
        let v = c.get_voltages();
        assert!(max_diff(&base.v, &v.row(0).transpose()) < 1e-10);
        assert!(max_diff(&changed.v, &v.row(1).transpose()) < 1e-10);

        let bad = ScenarioBatch::repeat_base(c.setpoints(), 2).with_gen_v(DMatrix::zeros(2, 3));
        assert!(matches!(
            c.compute_vs(&bad, &flat(), &cfg, &BatchConfig::sequential()),
            Err(PfError::DimensionMismatch { what: "gen_v", expected: 5, actual: 3 })
        ));
    }

    #[test]
    fn test_case14_element_results() {
        let mut grid = case14().unwrap();
        grid.ac_pf(&flat(), &SolverConfig::new(SolverType::NewtonRaphson))
            .unwrap();

        let (or, ex) = (grid.line_or_results().unwrap(), grid.line_ex_results().unwrap());
        assert_eq!((or.len(), ex.len()), (17, 17));
        assert_abs_diff_eq!(or[0].p_mw, 156.8829, epsilon = 1e-3);
        assert_abs_diff_eq!(or[0].q_mvar, -20.4043, epsilon = 1e-3);
        assert_abs_diff_eq!(or[0].a_ka, 0.638290, epsilon = 1e-5);
        assert_abs_diff_eq!(or[0].v_kv, 1.06 * 135.0, epsilon = 1e-6);
        assert_abs_diff_eq!(ex[0].p_mw, -152.5853, epsilon = 1e-3);
        assert_abs_diff_eq!(ex[0].q_mvar, 27.6762, epsilon = 1e-3);
        assert_abs_diff_eq!(ex[0].a_ka, 0.634645, epsilon = 1e-5);

        let (hv, lv) = (grid.trafo_hv_results().unwrap(), grid.trafo_lv_results().unwrap());
        assert_eq!((hv.len(), lv.len()), (3, 3));
        assert_abs_diff_eq!(hv[0].p_mw, 28.0742, epsilon = 1e-3);
        assert_abs_diff_eq!(hv[0].q_mvar, -9.6811, epsilon = 1e-3);
        assert_abs_diff_eq!(hv[0].a_ka, 0.124797, epsilon = 1e-5);
        assert_abs_diff_eq!(lv[0].p_mw, -28.0742, epsilon = 1e-3);
        assert_abs_diff_eq!(lv[0].q_mvar, 11.3843, epsilon = 1e-3);
        assert_abs_diff_eq!(lv[0].a_ka, 1.176923, epsilon = 1e-4);

        let gens = grid.gen_results().unwrap();
        assert_abs_diff_eq!(gens[0].p_mw, 232.3933, epsilon = 1e-3);
        assert_abs_diff_eq!(gens[0].q_mvar, -16.5493, epsilon = 1e-3);
        assert_abs_diff_eq!(gens[1].p_mw, 40.0, epsilon = 1e-9);
        for (g, q) in [(1, 43.5571), (2, 25.0753), (3, 12.7309), (4, 17.6235)] {
            assert_abs_diff_eq!(gens[g].q_mvar, q, epsilon = 1e-3);
        }
        assert_abs_diff_eq!(gens[4].v_kv, 1.09 * grid.buses()[7].vn_kv, epsilon = 1e-6);

        let loads = grid.load_results().unwrap();
        assert_eq!((loads[0].p_mw, loads[0].q_mvar), (21.7, 12.7));
        assert_abs_diff_eq!(loads[0].va_degree, VA[1], epsilon = 1e-4);

        // line and transformer losses add up to generation minus load
        let losses: f64 = or.iter().zip(&ex).chain(hv.iter().zip(&lv)).map(|(f, t)| f.p_mw + t.p_mw).sum();
        assert_abs_diff_eq!(losses, 13.3933, epsilon = 1e-3);
    }

    #[test]
    fn test_case14_n1_security() {
        let grid = case14().unwrap();
        let mut sa = SecurityAnalysis::new(&grid);
        sa.add_all_n1().unwrap();
        assert_eq!(sa.contingencies().len(), 20);
        let cfg = SolverConfig::new(SolverType::NewtonRaphson);
        let status = sa
            .compute(
                &flat(),
                &cfg,
                &BatchConfig::default()
                    .with_threads(4)
                    .with_failure_policy(FailurePolicy::RunAll),
            )
            .unwrap();
        assert!(status.all_converged(), "{status:?}");
        assert_eq!(sa.nb_solved(), 20);
        // line 7-8 is the only link of bus 8, which drops out of that solve
        assert_eq!(sa.get_voltages()[(10, 7)], Complex64::new(0.0, 0.0));
        assert!(sa.get_voltages()[(10, 6)].norm() > 0.9);

        let flows = sa.compute_flows().unwrap().clone();
        assert_eq!(flows.shape(), (20, 20));
        for (i, cont) in sa.contingencies().iter().enumerate() {
            let j = match cont[0] {
                ElementId::Line(j) => j,
                ElementId::Transformer(t) => 17 + t,
                other => panic!("unexpected outage {other:?}"),
            };
            assert_eq!(flows[(i, j)], 0.0, "outaged branch {j} carries no current");
        }

        let mut single = grid.clone();
        single.deactivate(ElementId::Line(0)).unwrap();
        let res = single.ac_pf(&flat(), &cfg).unwrap();
        assert!(max_diff(&res.v, &sa.get_voltages().row(0).transpose()) < 1e-10);
    }

    #[test]
    fn test_batch_shape_errors() {
        let mut grid = case14().unwrap();
        let mut batch = scenarios(&mut grid, 2);
        let mut c = Computers::from_grid(&mut grid).unwrap();
        let cfg = SolverConfig::default();
        batch.load_q = DMatrix::zeros(2, 3);
        assert!(matches!(
            c.compute_vs(&batch, &flat(), &cfg, &BatchConfig::sequential()),
            Err(PfError::DimensionMismatch { what: "load_q", expected: 11, actual: 3 })
        ));
        let batch = scenarios(&mut grid, 2);
        let short = DVector::from_element(13, Complex64::new(1.0, 0.0));
        assert!(matches!(
            c.compute_vs(&batch, &short, &cfg, &BatchConfig::sequential()),
            Err(PfError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_topology_change_reassembles() {
        let mut grid = case14().unwrap();
        let before = grid.assemble().unwrap();
        grid.deactivate(ElementId::Line(6)).unwrap();
        let after = grid.assemble().unwrap();
        assert_ne!(before.topology_id(), after.topology_id());
        assert_ne!(before.ybus(), after.ybus());
        let res = grid.ac_pf(&flat(), &SolverConfig::default()).unwrap();
        assert!(res.status.is_converged());
    }
}
