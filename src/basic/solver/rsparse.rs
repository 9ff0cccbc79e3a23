use rsparse::{
    self,
    data::{self, Nmrc, Numeric, Symb},
    lsolve, lu, sqr, usolve,
};

use super::Solve;
use crate::basic::error::{PowerFlowError, Result};

/// Partial pivoting threshold, preferring the diagonal.
const PIVOT_TOL: f64 = 1e-6;

#[derive(Default)]
pub struct RSparseSolver {
    n: usize,
    x: Vec<f64>,
    symbolic: Option<Symb>,
    numeric: Option<Nmrc<f64>>,
}

fn sprs(n: usize, col_ptr: &[usize], row_idx: &[usize], values: Vec<f64>) -> data::Sprs<f64> {
    data::Sprs {
        m: n,
        n,
        i: row_idx.to_vec(),
        p: col_ptr.iter().map(|&v| v as isize).collect(),
        nzmax: values.len(),
        x: values,
    }
}

impl Solve for RSparseSolver {
    fn analyze(&mut self, n: usize, col_ptr: &[usize], row_idx: &[usize]) -> Result<()> {
        self.numeric = None;
        self.symbolic = None;
        self.n = n;
        self.x = vec![0.0; n];
        if n > 0 {
            let a = sprs(n, col_ptr, row_idx, vec![0.0; row_idx.len()]);
            // AMD on A+A' underflows its dense-row threshold below three columns
            let order = if n > 2 { 1 } else { -1 };
            self.symbolic = Some(sqr(&a, order, false));
        }
        Ok(())
    }

    fn factor(&mut self, col_ptr: &[usize], row_idx: &[usize], values: &[f64]) -> Result<()> {
        self.numeric = None;
        if self.n == 0 {
            return Ok(());
        }
        let symbolic = self
            .symbolic
            .as_mut()
            .ok_or_else(|| PowerFlowError::SingularMatrix("factor called before analyze".into()))?;
        let a = sprs(self.n, col_ptr, row_idx, values.to_vec());
        let numeric = lu(&a, symbolic, PIVOT_TOL)
            .map_err(|_| PowerFlowError::SingularMatrix("LU factorization failed".into()))?;
        self.numeric = Some(numeric);
        Ok(())
    }

    fn solve_in_place(&mut self, b: &mut [f64]) -> Result<()> {
        if self.n == 0 {
            return Ok(());
        }
        let (Some(s), Some(num)) = (self.symbolic.as_ref(), self.numeric.as_ref()) else {
            return Err(PowerFlowError::SingularMatrix("matrix is not factored".into()));
        };
        let x = &mut self.x;
        ipvec(&num.pinv, b, &mut x[..]); // x = P*b
        lsolve(&num.l, x); // x = L\x
        usolve(&num.u, x); // x = U\x
        ipvec(&s.q, &x[..], b); // b = Q*x
        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.numeric = None;
        self.n = 0;
    }
}

fn ipvec_identity<T: Numeric<T>>(b: &[T], x: &mut [T]) {
    x.copy_from_slice(b);
}

fn ipvec_perm<T: Numeric<T>>(p: &[isize], b: &[T], x: &mut [T]) {
    for k in 0..b.len() {
        x[p[k] as usize] = b[k];
    }
}

fn ipvec<T: Numeric<T>>(p: &Option<Vec<isize>>, b: &[T], x: &mut [T]) {
    match p {
        Some(pvec) => ipvec_perm(pvec, b, x),
        None => ipvec_identity(b, x),
    }
}
