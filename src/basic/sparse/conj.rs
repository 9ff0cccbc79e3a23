use nalgebra::{Complex, RealField};
use nalgebra_sparse::CscMatrix;

/// Splits a complex sparse matrix into real-valued matrices sharing its
/// sparsity pattern.
pub(crate) trait RealImage {
    type Mat;

    /// Returns the real part of the matrix.
    fn real(&self) -> Self::Mat;

    /// Returns the imaginary part of the matrix.
    fn imag(&self) -> Self::Mat;
}

impl<T: RealField + Copy> RealImage for CscMatrix<Complex<T>> {
    type Mat = CscMatrix<T>;

    fn real(&self) -> Self::Mat {
        map_values(self, |v| v.re)
    }

    fn imag(&self) -> Self::Mat {
        map_values(self, |v| v.im)
    }
}

fn map_values<T, U>(mat: &CscMatrix<T>, f: impl Fn(&T) -> U) -> CscMatrix<U> {
    let values = mat.values().iter().map(f).collect();
    // SAFETY: the pattern is taken from a valid matrix and the value count
    // equals its number of non-zeros.
    unsafe {
        CscMatrix::try_from_pattern_and_values(mat.pattern().clone(), values).unwrap_unchecked()
    }
}
