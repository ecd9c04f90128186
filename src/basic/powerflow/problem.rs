use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix, CsrMatrix};
use num_complex::Complex64;
use num_traits::One;

use crate::basic::error::{PfError, Result};
use crate::basic::system::TopologyId;

/// Builds the permutation matrix `P` with `P[i, order[i]] = 1`, so that
/// `P * x` gathers `x` in the order given by `order`.
fn permutation_matrix(order: &[usize]) -> CscMatrix<Complex64> {
    let n = order.len();
    let mut coo = CooMatrix::new(n, n);
    for (row, &col) in order.iter().enumerate() {
        coo.push(row, col, Complex64::one());
    }
    CscMatrix::from(&coo)
}

/// One connected component as seen by the solver: its reference bus and the
/// slack participation of its buses.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SlackGroup {
    pub reference: usize,
    /// `(bus, weight)` pairs; weights are normalized to sum to one.
    pub weights: Vec<(usize, f64)>,
}

impl SlackGroup {
    /// Normalizes raw participation factors. A group whose weights sum to zero
    /// puts the whole imbalance on its reference bus.
    pub fn new(reference: usize, raw: &[(usize, f64)]) -> Self {
        let total: f64 = raw.iter().map(|(_, w)| w).sum();
        let weights = if total > 0.0 {
            raw.iter()
                .filter(|(_, w)| *w != 0.0)
                .map(|&(b, w)| (b, w / total))
                .collect()
        } else {
            vec![(reference, 1.0)]
        };
        SlackGroup { reference, weights }
    }
}

/// Power flow problem in solver bus order `[pv..., pq..., ref...]`.
///
/// Built once per topology and shared read-only by every solve on it. Input
/// and output vectors of the public API stay in the caller's bus order; the
/// permutation is applied on entry and undone on exit.
#[derive(Debug, Clone)]
pub struct PfProblem {
    pub(crate) topology: TopologyId,
    pub(crate) ybus: CscMatrix<Complex64>,
    pub(crate) ybus_csr: CsrMatrix<Complex64>,
    pub(crate) diag: Vec<Complex64>,
    pub(crate) npv: usize,
    pub(crate) npq: usize,
    pub(crate) nref: usize,
    /// Caller bus index of each solver position.
    pub(crate) from_perm: Vec<usize>,
    /// Solver position of each caller bus.
    pub(crate) to_perm: Vec<usize>,
    /// `n x nref` participation matrix, one column per component.
    pub(crate) slack_weights: CscMatrix<f64>,
    /// Solver positions of the non reference buses, ascending by caller index.
    pub(crate) natural_order: Vec<usize>,
}

impl PfProblem {
    /// Single component problem: `slack` buses share the slack equally, the
    /// lowest indexed one is the angle reference. Buses listed in neither
    /// `slack` nor `pv` are PQ buses.
    pub fn new(ybus: &CscMatrix<Complex64>, slack: &[usize], pv: &[usize]) -> Result<Self> {
        let reference = *slack.iter().min().ok_or(PfError::NoSlackBus {
            buses: (0..ybus.nrows()).collect(),
        })?;
        let mut pv_all: Vec<usize> = slack
            .iter()
            .chain(pv)
            .copied()
            .filter(|&b| b != reference)
            .collect();
        pv_all.sort_unstable();
        pv_all.dedup();
        let mut slack_sorted = slack.to_vec();
        slack_sorted.sort_unstable();
        slack_sorted.dedup();
        let raw: Vec<(usize, f64)> = slack_sorted.iter().map(|&b| (b, 1.0)).collect();
        let group = SlackGroup::new(reference, &raw);
        Self::with_components(ybus, &pv_all, &[group], TopologyId::next())
    }

    /// Multi component problem. Every bus of `ybus` is either a reference of
    /// one group, listed in `pv`, or PQ.
    pub(crate) fn with_components(
        ybus: &CscMatrix<Complex64>,
        pv: &[usize],
        groups: &[SlackGroup],
        topology: TopologyId,
    ) -> Result<Self> {
        let n = ybus.nrows();
        if ybus.ncols() != n {
            return Err(PfError::dimension("Ybus columns", n, ybus.ncols()));
        }
        if groups.is_empty() {
            return Err(PfError::NoSlackBus {
                buses: (0..n).collect(),
            });
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Kind {
            Pq,
            Pv,
            Ref,
        }
        let mut kind = vec![Kind::Pq; n];
        for g in groups {
            if g.reference >= n {
                return Err(PfError::invalid("bus", g.reference, "reference bus out of range"));
            }
            if kind[g.reference] == Kind::Ref {
                return Err(PfError::invalid("bus", g.reference, "reference of two components"));
            }
            kind[g.reference] = Kind::Ref;
        }
        for &b in pv {
            if b >= n {
                return Err(PfError::invalid("bus", b, "pv bus out of range"));
            }
            if kind[b] == Kind::Ref {
                return Err(PfError::invalid("bus", b, "listed as pv and reference"));
            }
            kind[b] = Kind::Pv;
        }

        let kinds = &kind;
        let pick = |k: Kind| (0..n).filter(move |&b| kinds[b] == k);
        let from_perm: Vec<usize> = pick(Kind::Pv)
            .chain(pick(Kind::Pq))
            .chain(groups.iter().map(|g| g.reference))
            .collect();
        let npv = pick(Kind::Pv).count();
        let nref = groups.len();
        let npq = n - npv - nref;
        let mut to_perm = vec![0; n];
        for (pos, &bus) in from_perm.iter().enumerate() {
            to_perm[bus] = pos;
        }

        let p = permutation_matrix(&from_perm);
        let ybus_perm = &p * &(ybus * &p.transpose());
        let ybus_csr = CsrMatrix::from(&ybus_perm);
        let diag = (0..n)
            .map(|k| {
                ybus_csr
                    .get_entry(k, k)
                    .map(|e| e.into_value())
                    .unwrap_or_default()
            })
            .collect();

        let mut w = CooMatrix::new(n, nref);
        for (col, g) in groups.iter().enumerate() {
            for &(bus, weight) in &g.weights {
                if bus >= n {
                    return Err(PfError::invalid("bus", bus, "slack bus out of range"));
                }
                w.push(to_perm[bus], col, weight);
            }
        }

        let mut natural_order: Vec<usize> = (0..n)
            .filter(|&b| kind[b] != Kind::Ref)
            .map(|b| to_perm[b])
            .collect();
        natural_order.sort_unstable_by_key(|&pos| from_perm[pos]);

        Ok(PfProblem {
            topology,
            ybus: ybus_perm,
            ybus_csr,
            diag,
            npv,
            npq,
            nref,
            from_perm,
            to_perm,
            slack_weights: CscMatrix::from(&w),
            natural_order,
        })
    }

    pub fn n_bus(&self) -> usize {
        self.from_perm.len()
    }

    pub fn npv(&self) -> usize {
        self.npv
    }

    pub fn npq(&self) -> usize {
        self.npq
    }

    pub fn nref(&self) -> usize {
        self.nref
    }

    pub fn topology(&self) -> TopologyId {
        self.topology
    }

    /// Reference buses in caller order, one per component.
    pub fn ref_buses(&self) -> &[usize] {
        &self.from_perm[self.npv + self.npq..]
    }

    pub fn pv_buses(&self) -> &[usize] {
        &self.from_perm[..self.npv]
    }

    pub fn pq_buses(&self) -> &[usize] {
        &self.from_perm[self.npv..self.npv + self.npq]
    }

    /// Caller order to solver order.
    pub(crate) fn permute(&self, x: &DVector<Complex64>) -> DVector<Complex64> {
        DVector::from_iterator(x.len(), self.from_perm.iter().map(|&b| x[b]))
    }

    /// Solver order back to caller order.
    pub(crate) fn unpermute(&self, x: &DVector<Complex64>) -> DVector<Complex64> {
        DVector::from_iterator(x.len(), self.to_perm.iter().map(|&pos| x[pos]))
    }
}

/// Complex power mismatch `V ∘ conj(Y V) - S`.
pub(crate) fn power_mismatch(
    ybus: &CscMatrix<Complex64>,
    v: &DVector<Complex64>,
    sbus: &DVector<Complex64>,
) -> DVector<Complex64> {
    v.component_mul(&(ybus * v).conjugate()) - sbus
}

/// Largest absolute entry, zero for an empty vector.
pub(crate) fn max_abs(f: &DVector<f64>) -> f64 {
    f.iter().fold(0.0, |m, x| m.max(x.abs()))
}

/// Single slack residual: `P` on pv and pq buses, `Q` on pq buses.
pub(crate) fn single_slack_residual(mis: &DVector<Complex64>, npv: usize, npq: usize) -> DVector<f64> {
    let nb = npv + npq;
    DVector::from_iterator(
        nb + npq,
        mis.rows(0, nb)
            .iter()
            .map(|s| s.re)
            .chain(mis.rows(npv, npq).iter().map(|s| s.im)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring4() -> CscMatrix<Complex64> {
        let y = Complex64::new(1.0, -10.0);
        let mut coo = CooMatrix::new(4, 4);
        for (f, t) in [(0, 1), (1, 2), (2, 3), (3, 0)] {
            coo.push(f, f, y);
            coo.push(t, t, y);
            coo.push(f, t, -y);
            coo.push(t, f, -y);
        }
        CscMatrix::from(&coo)
    }

    #[test]
    fn test_bus_order_is_pv_pq_ref() {
        let p = PfProblem::new(&ring4(), &[2], &[3]).unwrap();
        assert_eq!(p.pv_buses(), &[3]);
        assert_eq!(p.pq_buses(), &[0, 1]);
        assert_eq!(p.ref_buses(), &[2]);
        assert_eq!((p.npv(), p.npq(), p.nref()), (1, 2, 1));
    }

    #[test]
    fn test_extra_slack_becomes_pv_and_shares_weight() {
        let p = PfProblem::new(&ring4(), &[3, 1], &[]).unwrap();
        assert_eq!(p.ref_buses(), &[1]);
        assert_eq!(p.pv_buses(), &[3]);
        let w = nalgebra::DMatrix::from(&p.slack_weights);
        assert_eq!(w[(p.to_perm[1], 0)], 0.5);
        assert_eq!(w[(p.to_perm[3], 0)], 0.5);
    }

    #[test]
    fn test_permuted_ybus_matches_original() {
        let y = ring4();
        let p = PfProblem::new(&y, &[2], &[3]).unwrap();
        let dense = nalgebra::DMatrix::from(&y);
        let perm = nalgebra::DMatrix::from(&p.ybus);
        for i in 0..4 {
            for j in 0..4 {
                assert_eq!(perm[(p.to_perm[i], p.to_perm[j])], dense[(i, j)]);
            }
            assert_eq!(p.diag[p.to_perm[i]], dense[(i, i)]);
        }
        let x = DVector::from_fn(4, |i, _| Complex64::new(i as f64, 0.0));
        assert_eq!(p.unpermute(&p.permute(&x)), x);
    }

    #[test]
    fn test_natural_order_skips_reference() {
        let p = PfProblem::new(&ring4(), &[2], &[3]).unwrap();
        let buses: Vec<usize> = p.natural_order.iter().map(|&pos| p.from_perm[pos]).collect();
        assert_eq!(buses, vec![0, 1, 3]);
    }

    #[test]
    fn test_missing_slack_is_an_error() {
        assert!(matches!(
            PfProblem::new(&ring4(), &[], &[1]),
            Err(PfError::NoSlackBus { .. })
        ));
    }

    #[test]
    fn test_zero_weights_fall_back_to_reference() {
        let g = SlackGroup::new(4, &[(4, 0.0), (7, 0.0)]);
        assert_eq!(g.weights, vec![(4, 1.0)]);
        let g = SlackGroup::new(4, &[(4, 1.0), (7, 3.0)]);
        assert_eq!(g.weights, vec![(4, 0.25), (7, 0.75)]);
    }
}
