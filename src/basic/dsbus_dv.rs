use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

/// Computes the partial derivatives of the bus power injections with respect
/// to voltage angles and magnitudes.
///
/// Both derivatives share the sparsity pattern of `Ybus`; the values are
/// written into `dS_dVa` and `dS_dVm`, which are aligned with `Ybus.values()`:
///
/// ```text
/// dS_dVa = j·diag(V)·conj(diag(Ibus) − Ybus·diag(V))
/// dS_dVm = diag(V)·conj(Ybus·diag(Vnorm)) + conj(diag(Ibus))·diag(Vnorm)
/// ```
///
/// with `Ibus = Ybus·V` and `Vnorm = V/|V|`. This method is from MatPower:
/// R. D. Zimmerman, "AC Power Flows, Generalized OPF Costs and their
/// Derivatives using Complex Matrix Notation", MATPOWER Technical Note 2,
/// February 2010.
#[allow(non_snake_case)]
pub(crate) fn dSbus_dV(
    Ybus: &CscMatrix<Complex64>,
    v: &DVector<Complex64>,
    v_norm: &DVector<Complex64>,
    ibus: &DVector<Complex64>,
    dS_dVa: &mut [Complex64],
    dS_dVm: &mut [Complex64],
) {
    let j = Complex64::i();
    let offsets = Ybus.col_offsets();
    let rows = Ybus.row_indices();
    let values = Ybus.values();
    for col in 0..Ybus.ncols() {
        for idx in offsets[col]..offsets[col + 1] {
            let row = rows[idx];
            let y = values[idx];
            dS_dVa[idx] = -j * v[row] * (y * v[col]).conj();
            dS_dVm[idx] = v[row] * (y * v_norm[col]).conj();
            if row == col {
                dS_dVa[idx] += j * v[row] * ibus[row].conj();
                dS_dVm[idx] += ibus[row].conj() * v_norm[row];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn s_calc(y: &CscMatrix<Complex64>, v: &DVector<Complex64>) -> DVector<Complex64> {
        let i = y * v;
        v.component_mul(&i.conjugate())
    }

    #[test]
    #[allow(non_snake_case)]
    fn test_against_finite_differences() {
        let mut coo = CooMatrix::new(3, 3);
        let y01 = Complex64::new(2.0, -8.0);
        let y12 = Complex64::new(1.0, -5.0);
        coo.push(0, 0, y01 + Complex64::new(0.0, 0.05));
        coo.push(0, 1, -y01);
        coo.push(1, 0, -y01);
        coo.push(1, 1, y01 + y12);
        coo.push(1, 2, -y12);
        coo.push(2, 1, -y12);
        coo.push(2, 2, y12 + Complex64::new(0.1, 0.0));
        let y = CscMatrix::from(&coo);

        let vm = [1.02, 0.97, 0.95];
        let va = [0.0, -0.05, -0.11];
        let polar = |vm: &[f64], va: &[f64]| {
            DVector::from_fn(3, |k, _| Complex64::from_polar(vm[k], va[k]))
        };
        let v = polar(&vm, &va);
        let v_norm = v.map(|e| e / e.norm());
        let ibus = &y * &v;
        let mut dS_dVa = vec![Complex64::default(); y.nnz()];
        let mut dS_dVm = vec![Complex64::default(); y.nnz()];
        dSbus_dV(&y, &v, &v_norm, &ibus, &mut dS_dVa, &mut dS_dVm);

        let h = 1e-7;
        let s0 = s_calc(&y, &v);
        for (idx, (row, col, _)) in y.triplet_iter().enumerate() {
            let mut va_h = va;
            va_h[col] += h;
            let da = (s_calc(&y, &polar(&vm, &va_h))[row] - s0[row]) / h;
            assert!((da - dS_dVa[idx]).norm() < 1e-5, "dVa ({row}, {col})");

            let mut vm_h = vm;
            vm_h[col] += h;
            let dm = (s_calc(&y, &polar(&vm_h, &va))[row] - s0[row]) / h;
            assert!((dm - dS_dVm[idx]).norm() < 1e-5, "dVm ({row}, {col})");
        }
    }
}
