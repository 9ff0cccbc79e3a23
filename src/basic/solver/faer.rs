use faer::{
    MatMut,
    linalg::solvers::Solve,
    sparse::{
        SparseColMatRef, SymbolicSparseColMatRef,
        linalg::solvers::{Lu, SymbolicLu},
    },
};

use super::Solve as PoSolve;
use crate::basic::error::{PowerFlowError, Result};

#[derive(Default)]
pub struct FaerSolver {
    n: usize,
    lu: Option<Lu<usize, f64>>,
    symbolic: Option<SymbolicLu<usize>>,
}

impl PoSolve for FaerSolver {
    fn analyze(&mut self, n: usize, col_ptr: &[usize], row_idx: &[usize]) -> Result<()> {
        self.lu = None;
        self.symbolic = None;
        self.n = n;
        if n == 0 {
            return Ok(());
        }
        // SAFETY: CSC data from nalgebra-sparse has sorted, unique row indices.
        let s = unsafe { SymbolicSparseColMatRef::new_unchecked(n, n, col_ptr, None, row_idx) };
        let symbolic = SymbolicLu::try_new(s)
            .map_err(|_| PowerFlowError::SingularMatrix("faer symbolic analysis failed".into()))?;
        self.symbolic = Some(symbolic);
        Ok(())
    }

    fn factor(&mut self, col_ptr: &[usize], row_idx: &[usize], values: &[f64]) -> Result<()> {
        self.lu = None;
        if self.n == 0 {
            return Ok(());
        }
        let symbolic = self
            .symbolic
            .as_ref()
            .ok_or_else(|| PowerFlowError::SingularMatrix("factor called before analyze".into()))?;
        let n = self.n;
        // SAFETY: same pattern as passed to `analyze`.
        let s = unsafe { SymbolicSparseColMatRef::new_unchecked(n, n, col_ptr, None, row_idx) };
        let mat = SparseColMatRef::new(s, values);
        let lu = Lu::try_new_with_symbolic(symbolic.clone(), mat).map_err(|_| {
            PowerFlowError::SingularMatrix("faer numeric factorization failed".into())
        })?;
        self.lu = Some(lu);
        Ok(())
    }

    fn solve_in_place(&mut self, b: &mut [f64]) -> Result<()> {
        if self.n == 0 {
            return Ok(());
        }
        let lu = self
            .lu
            .as_ref()
            .ok_or_else(|| PowerFlowError::SingularMatrix("matrix is not factored".into()))?;
        let rhs = MatMut::from_column_major_slice_mut(b, self.n, 1);
        lu.solve_in_place(rhs);
        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.lu = None;
        self.n = 0;
    }
}
