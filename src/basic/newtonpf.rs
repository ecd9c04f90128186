use std::time::Instant;

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;
use tracing::{debug, warn};

use super::dsbus_dv::dSbus_dV;
use super::powerflow::problem::{max_abs, power_mismatch, single_slack_residual, PfProblem};
use super::powerflow::{Divergence, SolveOutcome, SolverStatus, SolverTimers};
use super::solver::Factorization;
use super::sparse::{
    conj::RealImage,
    slice::Slice,
    stack::{csc_hstack, csc_vstack},
};

/// Newton-Raphson in polar coordinates on a problem in solver bus order.
///
/// With `distributed` set, the unknowns are `[Va(pv,pq), Vm(pq), p_slack]`
/// with one slack power per component, and the active power balance of every
/// bus (reference buses included) is enforced. Without it the reference
/// buses are fixed and their injections are left free.
///
/// `max_iter == 0` returns [`SolverStatus::MaxIterExceeded`] without touching
/// `v_init`.
#[allow(non_snake_case)]
pub(crate) fn newton_pf(
    problem: &PfProblem,
    Sbus: &DVector<Complex64>,
    v_init: &DVector<Complex64>,
    distributed: bool,
    max_iter: usize,
    tol: f64,
    factorization: &mut Factorization,
) -> SolveOutcome {
    let start = Instant::now();
    let mut timers = SolverTimers::default();
    let (npv, npq, nref) = (problem.npv, problem.npq, problem.nref);
    let n = v_init.len();
    let n_bus = npv + npq;

    let mut v = v_init.clone();
    let mut v_m = v.map(|e| e.norm());
    let mut v_a = v.map(|e| e.arg());
    let mut p_slack = DVector::<f64>::zeros(nref);

    if max_iter == 0 {
        timers.total = start.elapsed();
        return SolveOutcome {
            v,
            status: SolverStatus::MaxIterExceeded,
            iterations: 0,
            timers,
        };
    }

    let residual = |v: &DVector<Complex64>, p_slack: &DVector<f64>| -> DVector<f64> {
        let mut mis = power_mismatch(&problem.ybus, v, Sbus);
        if distributed {
            let share = &problem.slack_weights * p_slack;
            mis.iter_mut().zip(share.iter()).for_each(|(m, s)| m.re -= s);
            DVector::from_iterator(
                n + npq,
                mis.iter()
                    .map(|s| s.re)
                    .chain(mis.rows(npv, npq).iter().map(|s| s.im)),
            )
        } else {
            single_slack_residual(&mis, npv, npq)
        }
    };

    let t = Instant::now();
    let mut F = residual(&v, &p_slack);
    timers.fx += t.elapsed();

    let t = Instant::now();
    let mut norm = max_abs(&F);
    let finite = F.iter().all(|x| x.is_finite());
    timers.check += t.elapsed();
    if !finite {
        timers.total = start.elapsed();
        return SolveOutcome {
            v,
            status: SolverStatus::Diverged(Divergence::NonFinite),
            iterations: 0,
            timers,
        };
    }
    if norm < tol {
        timers.total = start.elapsed();
        return SolveOutcome {
            v,
            status: SolverStatus::Converged,
            iterations: 0,
            timers,
        };
    }

    let neg_weights = -problem.slack_weights.clone();
    let mut status = SolverStatus::MaxIterExceeded;
    let mut iterations = max_iter;

    for it in 1..=max_iter {
        let t = Instant::now();
        let v_norm = v.map(|e| e / e.norm());
        let (dS_dVm, dS_dVa) = dSbus_dV(&problem.ybus, &v, &v_norm);
        let jac = if distributed {
            build_jacobian_distributed(&dS_dVm, &dS_dVa, npv, npq, &neg_weights)
        } else {
            build_jacobian(&dS_dVm, &dS_dVa, npv, npq)
        };
        let mut dx = F.clone();
        let solved = factorization
            .refactorize(&jac)
            .and_then(|_| factorization.solve(dx.as_mut_slice()));
        timers.solve += t.elapsed();

        if let Err(e) = solved {
            warn!(iteration = it, error = %e, "linear solve failed");
            status = SolverStatus::Diverged(Divergence::from(&e));
            iterations = it;
            break;
        }

        v_a.rows_mut(0, n_bus)
            .zip_apply(&dx.rows(0, n_bus), |a, d| *a -= d);
        v_m.rows_mut(npv, npq)
            .zip_apply(&dx.rows(n_bus, npq), |a, d| *a -= d);
        if distributed {
            p_slack.zip_apply(&dx.rows(n_bus + npq, nref), |a, d| *a -= d);
        }
        v.zip_zip_apply(&v_m, &v_a, |e, vm, va| *e = Complex64::from_polar(vm, va));

        let t = Instant::now();
        F = residual(&v, &p_slack);
        timers.fx += t.elapsed();

        let t = Instant::now();
        let finite = F.iter().all(|x| x.is_finite());
        norm = max_abs(&F);
        timers.check += t.elapsed();
        debug!(iteration = it, mismatch = norm, "newton step");

        if !finite {
            warn!(iteration = it, "non-finite mismatch");
            status = SolverStatus::Diverged(Divergence::NonFinite);
            iterations = it;
            break;
        }
        if norm < tol {
            status = SolverStatus::Converged;
            iterations = it;
            break;
        }
    }

    timers.total = start.elapsed();
    SolveOutcome {
        v,
        status,
        iterations,
        timers,
    }
}

/// `[[dP/dVa, dP/dVm], [dQ/dVa, dQ/dVm]]` restricted to pv+pq angles, pq
/// magnitudes, pv+pq active rows and pq reactive rows.
#[allow(non_snake_case)]
fn build_jacobian(
    ds_dvm: &CscMatrix<Complex64>,
    ds_dva: &CscMatrix<Complex64>,
    npv: usize,
    npq: usize,
) -> CscMatrix<f64> {
    let n_bus = npv + npq;
    let (re_va, im_va) = ds_dva.real_imag();
    let (re_vm, im_vm) = ds_dvm.real_imag();
    let J11 = re_va.block((0, 0), (n_bus, n_bus));
    let J12 = re_vm.block((0, npv), (n_bus, npq));
    let J21 = im_va.block((npv, 0), (npq, n_bus));
    let J22 = im_vm.block((npv, npv), (npq, npq));
    csc_vstack(&[&csc_hstack(&[&J11, &J12]), &csc_hstack(&[&J21, &J22])])
}

/// Same blocks as [`build_jacobian`] but with active rows for every bus and
/// the `-W` slack participation columns appended.
#[allow(non_snake_case)]
fn build_jacobian_distributed(
    ds_dvm: &CscMatrix<Complex64>,
    ds_dva: &CscMatrix<Complex64>,
    npv: usize,
    npq: usize,
    neg_weights: &CscMatrix<f64>,
) -> CscMatrix<f64> {
    let n = ds_dva.nrows();
    let n_bus = npv + npq;
    let (re_va, im_va) = ds_dva.real_imag();
    let (re_vm, im_vm) = ds_dvm.real_imag();
    let J11 = re_va.block((0, 0), (n, n_bus));
    let J12 = re_vm.block((0, npv), (n, npq));
    let J21 = im_va.block((npv, 0), (npq, n_bus));
    let J22 = im_vm.block((npv, npv), (npq, npq));
    let J23 = CscMatrix::zeros(npq, neg_weights.ncols());
    csc_vstack(&[
        &csc_hstack(&[&J11, &J12, neg_weights]),
        &csc_hstack(&[&J21, &J22, &J23]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::solver::LinearSolverKind;
    use nalgebra_sparse::CooMatrix;

    /// Two buses joined by `y`, bus 1 slack, bus 0 PQ drawing `s`.
    fn two_bus() -> (CscMatrix<Complex64>, DVector<Complex64>) {
        let y = Complex64::new(2.0, -10.0);
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, y);
        coo.push(0, 1, -y);
        coo.push(1, 0, -y);
        coo.push(1, 1, y);
        let sbus = DVector::from_vec(vec![Complex64::new(-0.5, -0.2), Complex64::new(0.0, 0.0)]);
        (CscMatrix::from(&coo), sbus)
    }

    fn run(distributed: bool, max_iter: usize) -> SolveOutcome {
        let (y, s) = two_bus();
        let problem = PfProblem::new(&y, &[1], &[]).unwrap();
        let mut f = Factorization::new(LinearSolverKind::Dense).unwrap();
        let v0 = DVector::from_element(2, Complex64::new(1.0, 0.0));
        let out = newton_pf(
            &problem,
            &problem.permute(&s),
            &problem.permute(&v0),
            distributed,
            max_iter,
            1e-10,
            &mut f,
        );
        SolveOutcome {
            v: problem.unpermute(&out.v),
            ..out
        }
    }

    #[test]
    fn test_two_bus_converges_and_balances() {
        for distributed in [false, true] {
            let (y, s) = two_bus();
            let out = run(distributed, 10);
            assert!(out.status.is_converged(), "{:?}", out.status);
            assert!(out.iterations <= 5);
            let s_calc = out.v.component_mul(&(&y * &out.v).conjugate());
            assert!((s_calc[0] - s[0]).norm() < 1e-9);
            assert!((out.v[1] - Complex64::new(1.0, 0.0)).norm() < 1e-12);
        }
    }

    #[test]
    fn test_zero_iterations_leave_voltage_untouched() {
        let out = run(false, 0);
        assert_eq!(out.status, SolverStatus::MaxIterExceeded);
        assert_eq!(out.iterations, 0);
        assert!(out.v.iter().all(|e| *e == Complex64::new(1.0, 0.0)));
    }

    #[test]
    fn test_converged_start_takes_no_iteration() {
        let (y, _) = two_bus();
        let problem = PfProblem::new(&y, &[1], &[]).unwrap();
        let mut f = Factorization::new(LinearSolverKind::Dense).unwrap();
        let v0 = DVector::from_element(2, Complex64::new(1.0, 0.0));
        let s0 = DVector::zeros(2);
        let out = newton_pf(&problem, &s0, &v0, false, 10, 1e-8, &mut f);
        assert_eq!((out.status, out.iterations), (SolverStatus::Converged, 0));
        assert_eq!(f.counts(), (0, 0));
    }

    #[test]
    fn test_jacobian_shapes() {
        let (y, _) = two_bus();
        let problem = PfProblem::new(&y, &[1], &[]).unwrap();
        let v = DVector::from_element(2, Complex64::new(1.0, 0.0));
        let (dvm, dva) = dSbus_dV(&problem.ybus, &v, &v);
        let j = build_jacobian(&dvm, &dva, 0, 1);
        assert_eq!((j.nrows(), j.ncols()), (2, 2));
        let w = -problem.slack_weights.clone();
        let j = build_jacobian_distributed(&dvm, &dva, 0, 1, &w);
        assert_eq!((j.nrows(), j.ncols()), (3, 3));
    }
}
