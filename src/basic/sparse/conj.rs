use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

/// Trait for computing the conjugate of a complex matrix.
pub(crate) trait Conjugate {
    type Mat;

    /// Returns the conjugate of the matrix.
    fn conjugate(&self) -> Self::Mat;

    /// Computes the conjugate of the matrix in-place.
    fn conjugate_mut(&mut self);
}

impl Conjugate for CscMatrix<Complex64> {
    type Mat = CscMatrix<Complex64>;

    fn conjugate(&self) -> Self::Mat {
        let mut out = self.clone();
        out.conjugate_mut();
        out
    }

    fn conjugate_mut(&mut self) {
        self.values_mut().iter_mut().for_each(|v| *v = v.conj());
    }
}

/// Splits a complex matrix into real matrices sharing its sparsity pattern.
///
/// Explicit zeros are kept, so the pattern of the parts never depends on the
/// numeric values.
pub(crate) trait RealImage {
    type Mat;

    /// Returns the real and imaginary parts of the matrix.
    fn real_imag(&self) -> (Self::Mat, Self::Mat);
}

impl RealImage for CscMatrix<Complex64> {
    type Mat = CscMatrix<f64>;

    fn real_imag(&self) -> (Self::Mat, Self::Mat) {
        let (re, im): (Vec<f64>, Vec<f64>) = self.values().iter().map(|v| (v.re, v.im)).unzip();
        // same pattern, same length: construction cannot fail
        let real = CscMatrix::try_from_pattern_and_values(self.pattern().clone(), re)
            .expect("pattern and values have equal length");
        let imag = CscMatrix::try_from_pattern_and_values(self.pattern().clone(), im)
            .expect("pattern and values have equal length");
        (real, imag)
    }
}
