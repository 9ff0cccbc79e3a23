use nalgebra::{DVector, Scalar};
use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;

/// Power flow inputs with the buses reordered as `[pv…, pq…, slack…]`.
#[derive(Debug, Clone)]
pub struct PowerFlowMat {
    pub y_bus: CscMatrix<Complex64>,
    pub s_bus: DVector<Complex64>,
    pub v_init: DVector<Complex64>,
    pub npv: usize,
    pub npq: usize,
    /// `to_perm[bus]` is the position of `bus` in the reordered system.
    pub to_perm: Vec<usize>,
    /// `from_perm[k]` is the bus at position `k` of the reordered system.
    pub from_perm: Vec<usize>,
}

impl PowerFlowMat {
    pub(crate) fn new(
        y_bus: &CscMatrix<Complex64>,
        s_bus: &DVector<Complex64>,
        v_init: &DVector<Complex64>,
        pv: &[usize],
        pq: &[usize],
        slack: &[usize],
    ) -> Self {
        let from_perm: Vec<usize> = pv.iter().chain(pq).chain(slack).copied().collect();
        let mut to_perm = vec![0; from_perm.len()];
        for (k, &bus) in from_perm.iter().enumerate() {
            to_perm[bus] = k;
        }
        let mut mat = Self {
            y_bus: CscMatrix::zeros(0, 0),
            s_bus: DVector::zeros(0),
            v_init: DVector::zeros(0),
            npv: pv.len(),
            npq: pq.len(),
            to_perm,
            from_perm,
        };
        mat.y_bus = mat.permute_matrix(y_bus);
        mat.s_bus = mat.permute(s_bus);
        mat.v_init = mat.permute(v_init);
        mat
    }

    pub fn n_bus(&self) -> usize {
        self.from_perm.len()
    }

    pub fn n_slack(&self) -> usize {
        self.n_bus() - self.npv - self.npq
    }

    /// Reorders a vector given in bus order.
    pub fn permute<T: Scalar + Copy>(&self, x: &DVector<T>) -> DVector<T> {
        DVector::from_fn(self.n_bus(), |k, _| x[self.from_perm[k]])
    }

    /// Returns a reordered vector to bus order.
    pub fn unpermute<T: Scalar + Copy>(&self, x: &DVector<T>) -> DVector<T> {
        DVector::from_fn(self.n_bus(), |bus, _| x[self.to_perm[bus]])
    }

    fn permute_matrix(&self, y: &CscMatrix<Complex64>) -> CscMatrix<Complex64> {
        let mut coo = CooMatrix::new(y.nrows(), y.ncols());
        coo.reserve(y.nnz());
        for (i, j, v) in y.triplet_iter() {
            coo.push(self.to_perm[i], self.to_perm[j], *v);
        }
        CscMatrix::from(&coo)
    }
}
