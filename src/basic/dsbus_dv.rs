use crate::basic::sparse::conj::Conjugate;
use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

/// Sparse diagonal matrix holding `values`.
fn diag(values: &[Complex64]) -> CscMatrix<Complex64> {
    let mut d = CscMatrix::identity(values.len());
    d.values_mut().copy_from_slice(values);
    d
}

/// Partial derivatives of the complex bus power injections with respect to
/// voltage magnitude and angle, in polar coordinates.
///
/// # Arguments
///
/// * `Ybus` - Nodal admittance matrix.
/// * `v` - Complex bus voltages.
/// * `Vnorm` - `v` scaled to unit magnitude.
///
/// # Returns
///
/// `(dS_dVm, dS_dVa)`, both with the sparsity pattern of `Ybus` plus the
/// diagonal. The pattern only depends on the pattern of `Ybus`.
///
/// # Notes
///
/// The formulation follows R. D. Zimmerman, "AC Power Flows, Generalized OPF
/// Costs and their Derivatives using Complex Matrix Notation", MATPOWER
/// Technical Note 2, February 2010:
///
/// ```text
/// dS_dVm = diag(V) conj(Ybus diag(Vnorm)) + conj(diag(Ibus)) diag(Vnorm)
/// dS_dVa = j diag(V) conj(diag(Ibus) - Ybus diag(V))
/// ```
#[allow(non_snake_case)]
pub fn dSbus_dV(
    Ybus: &CscMatrix<Complex64>,
    v: &DVector<Complex64>,
    Vnorm: &DVector<Complex64>,
) -> (CscMatrix<Complex64>, CscMatrix<Complex64>) {
    let ibus = Ybus * v;
    let diagV = diag(v.as_slice());
    let diagVnorm = diag(Vnorm.as_slice());
    let diagIbus = diag(ibus.as_slice());

    let dS_dVm = &diagV * (Ybus * &diagVnorm).conjugate() + diagIbus.conjugate() * &diagVnorm;
    let dS_dVa = &diagV * (diagIbus - Ybus * &diagV).conjugate() * Complex64::i();
    (dS_dVm, dS_dVa)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use nalgebra_sparse::CooMatrix;

    fn s_of(ybus: &CscMatrix<Complex64>, v: &DVector<Complex64>) -> DVector<Complex64> {
        v.component_mul(&(ybus * v).conjugate())
    }

    #[allow(non_snake_case)]
    #[test]
    fn test_matches_finite_differences() {
        let mut coo = CooMatrix::new(3, 3);
        let y12 = Complex64::new(1.0, -5.0);
        let y23 = Complex64::new(2.0, -8.0);
        coo.push(0, 0, y12);
        coo.push(0, 1, -y12);
        coo.push(1, 0, -y12);
        coo.push(1, 1, y12 + y23 + Complex64::new(0.0, 0.1));
        coo.push(1, 2, -y23);
        coo.push(2, 1, -y23);
        coo.push(2, 2, y23);
        let ybus = CscMatrix::from(&coo);
        let v = DVector::from_vec(vec![
            Complex64::from_polar(1.02, 0.0),
            Complex64::from_polar(0.98, -0.05),
            Complex64::from_polar(0.97, -0.08),
        ]);
        let vnorm = v.map(|x| x / x.norm());
        let (dvm, dva) = dSbus_dV(&ybus, &v, &vnorm);
        let (dvm, dva) = (DMatrix::from(&dvm), DMatrix::from(&dva));

        let h = 1e-7;
        let s0 = s_of(&ybus, &v);
        for k in 0..3 {
            let mut v_a = v.clone();
            v_a[k] *= Complex64::from_polar(1.0, h);
            let mut v_m = v.clone();
            v_m[k] += vnorm[k] * h;
            let da = (s_of(&ybus, &v_a) - &s0) / Complex64::new(h, 0.0);
            let dm = (s_of(&ybus, &v_m) - &s0) / Complex64::new(h, 0.0);
            for i in 0..3 {
                assert!((da[i] - dva[(i, k)]).norm() < 1e-5, "dS_dVa[{i},{k}] mismatch");
                assert!((dm[i] - dvm[(i, k)]).norm() < 1e-5, "dS_dVm[{i},{k}] mismatch");
            }
        }
    }
}
