use std::time::Instant;

use nalgebra::DVector;
use num_complex::Complex64;
use tracing::{debug, warn};

use super::powerflow::problem::{max_abs, power_mismatch, single_slack_residual, PfProblem};
use super::powerflow::{Divergence, GsOrdering, SolveOutcome, SolverStatus, SolverTimers};

/// `(Y V)_k` from the CSR row of bus `k`.
#[inline]
fn row_current(problem: &PfProblem, v: &DVector<Complex64>, k: usize) -> Complex64 {
    let row = problem.ybus_csr.row(k);
    row.col_indices()
        .iter()
        .zip(row.values())
        .map(|(&j, y)| y * v[j])
        .sum()
}

/// New voltage of bus `k` given the current iterate.
#[inline]
fn bus_update(
    problem: &PfProblem,
    v: &DVector<Complex64>,
    sbus: &DVector<Complex64>,
    vm_set: &[f64],
    k: usize,
) -> Complex64 {
    let i_k = row_current(problem, v, k);
    let v_k = v[k];
    if k < problem.npv {
        // active power fixed, reactive power from the current iterate
        let s = Complex64::new(sbus[k].re, (v_k * i_k.conj()).im);
        let updated = v_k + ((s / v_k).conj() - i_k) / problem.diag[k];
        updated * (vm_set[k] / updated.norm())
    } else {
        v_k + ((sbus[k] / v_k).conj() - i_k) / problem.diag[k]
    }
}

/// Gauss-Seidel iteration on a problem in solver bus order.
///
/// Reference buses are never updated. Every slack bus other than the
/// component reference is handled as a PV bus.
pub(crate) fn gauss_seidel(
    problem: &PfProblem,
    sbus: &DVector<Complex64>,
    v_init: &DVector<Complex64>,
    synchronous: bool,
    ordering: GsOrdering,
    max_iter: usize,
    tol: f64,
) -> SolveOutcome {
    let start = Instant::now();
    let mut timers = SolverTimers::default();
    let (npv, npq) = (problem.npv, problem.npq);
    let n_bus = npv + npq;
    let mut v = v_init.clone();

    if max_iter == 0 {
        timers.total = start.elapsed();
        return SolveOutcome {
            v,
            status: SolverStatus::MaxIterExceeded,
            iterations: 0,
            timers,
        };
    }

    let vm_set: Vec<f64> = v.rows(0, npv).iter().map(|e| e.norm()).collect();
    let order: Vec<usize> = match ordering {
        GsOrdering::PqThenPv => (npv..n_bus).chain(0..npv).collect(),
        GsOrdering::Natural => problem.natural_order.clone(),
    };

    let check = |v: &DVector<Complex64>, timers: &mut SolverTimers| -> (bool, f64) {
        let t = Instant::now();
        let mis = power_mismatch(&problem.ybus, v, sbus);
        timers.fx += t.elapsed();
        let t = Instant::now();
        let f = single_slack_residual(&mis, npv, npq);
        let out = (f.iter().all(|x| x.is_finite()), max_abs(&f));
        timers.check += t.elapsed();
        out
    };

    match check(&v, &mut timers) {
        (false, _) => {
            timers.total = start.elapsed();
            return SolveOutcome {
                v,
                status: SolverStatus::Diverged(Divergence::NonFinite),
                iterations: 0,
                timers,
            };
        }
        (true, norm) if norm < tol => {
            timers.total = start.elapsed();
            return SolveOutcome {
                v,
                status: SolverStatus::Converged,
                iterations: 0,
                timers,
            };
        }
        _ => {}
    }

    let mut status = SolverStatus::MaxIterExceeded;
    let mut iterations = max_iter;
    let mut next = v.clone();
    for it in 1..=max_iter {
        let t = Instant::now();
        if synchronous {
            next.copy_from(&v);
            for &k in &order {
                next[k] = bus_update(problem, &v, sbus, &vm_set, k);
            }
            std::mem::swap(&mut v, &mut next);
        } else {
            for &k in &order {
                v[k] = bus_update(problem, &v, sbus, &vm_set, k);
            }
        }
        timers.solve += t.elapsed();

        let (finite, norm) = check(&v, &mut timers);
        if it % 100 == 0 {
            debug!(iteration = it, mismatch = norm, "gauss-seidel sweep");
        }
        if !finite {
            warn!(iteration = it, "non-finite voltage in gauss-seidel sweep");
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

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::{CooMatrix, CscMatrix};

    /// Three bus chain: 0 slack, 1 PV at 1.02 pu, 2 PQ load.
    fn chain() -> (PfProblem, DVector<Complex64>, DVector<Complex64>) {
        let y = Complex64::new(3.0, -12.0);
        let mut coo = CooMatrix::new(3, 3);
        for (f, t) in [(0, 1), (1, 2)] {
            coo.push(f, f, y);
            coo.push(t, t, y);
            coo.push(f, t, -y);
            coo.push(t, f, -y);
        }
        let problem = PfProblem::new(&CscMatrix::from(&coo), &[0], &[1]).unwrap();
        let sbus = DVector::from_vec(vec![
            Complex64::new(0.0, 0.0),
            Complex64::new(0.2, 0.0),
            Complex64::new(-0.6, -0.25),
        ]);
        let v0 = DVector::from_vec(vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(1.02, 0.0),
            Complex64::new(1.0, 0.0),
        ]);
        (problem.clone(), problem.permute(&sbus), problem.permute(&v0))
    }

    #[test]
    fn test_sequential_and_synchronous_agree() {
        let (p, s, v0) = chain();
        let seq = gauss_seidel(&p, &s, &v0, false, GsOrdering::PqThenPv, 10_000, 1e-10);
        let syn = gauss_seidel(&p, &s, &v0, true, GsOrdering::PqThenPv, 10_000, 1e-10);
        let nat = gauss_seidel(&p, &s, &v0, false, GsOrdering::Natural, 10_000, 1e-10);
        for out in [&seq, &syn, &nat] {
            assert!(out.status.is_converged(), "{:?}", out.status);
        }
        assert!(syn.iterations >= seq.iterations);
        for k in 0..3 {
            assert!((seq.v[k] - syn.v[k]).norm() < 1e-8);
            assert!((seq.v[k] - nat.v[k]).norm() < 1e-8);
        }
    }

    #[test]
    fn test_pv_magnitude_and_reference_are_held() {
        let (p, s, v0) = chain();
        let out = gauss_seidel(&p, &s, &v0, false, GsOrdering::PqThenPv, 10_000, 1e-10);
        let v = p.unpermute(&out.v);
        assert!((v[1].norm() - 1.02).abs() < 1e-12);
        assert_eq!(v[0], Complex64::new(1.0, 0.0));
        let s_calc = v.component_mul(&(&p.unpermute(&(&p.ybus * &out.v))).conjugate());
        assert!((s_calc[2] - Complex64::new(-0.6, -0.25)).norm() < 1e-9);
        assert!((s_calc[1].re - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_iteration_cap() {
        let (p, s, v0) = chain();
        let out = gauss_seidel(&p, &s, &v0, false, GsOrdering::PqThenPv, 2, 1e-12);
        assert_eq!((out.status, out.iterations), (SolverStatus::MaxIterExceeded, 2));
        let out = gauss_seidel(&p, &s, &v0, true, GsOrdering::PqThenPv, 0, 1e-12);
        assert_eq!((out.status, out.iterations), (SolverStatus::MaxIterExceeded, 0));
        assert_eq!(out.v, v0);
    }
}
