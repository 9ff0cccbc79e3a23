use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

use super::error::{PowerFlowError, Result};

/// Which part of which power derivative a Jacobian entry is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    ReVa,
    ImVa,
    ReVm,
    ImVm,
}

/// Newton-Raphson Jacobian on the reordered system `[pv…, pq…, slack…]`:
///
/// ```text
/// | Re dS/dVa[pvpq, pvpq]  Re dS/dVm[pvpq, pq] |
/// | Im dS/dVa[pq, pvpq]    Im dS/dVm[pq, pq]   |
/// ```
///
/// The pattern is derived once from the admittance matrix; each entry
/// remembers the admittance entry it is computed from, so refilling the
/// values never touches the structure.
#[derive(Debug, Clone)]
pub(crate) struct Jacobian {
    mat: CscMatrix<f64>,
    sources: Vec<(usize, Part)>,
}

impl Jacobian {
    pub fn new(y_bus: &CscMatrix<Complex64>, npv: usize, npq: usize) -> Result<Self> {
        let n_bus = npv + npq;
        let dim = npv + 2 * npq;
        let offsets = y_bus.col_offsets();
        let rows = y_bus.row_indices();

        let mut col_offsets = Vec::with_capacity(dim + 1);
        let mut row_indices = Vec::new();
        let mut sources = Vec::new();
        col_offsets.push(0);

        let mut push_column = |bus: usize, re: Part, im: Part| {
            let range = offsets[bus]..offsets[bus + 1];
            for idx in range.clone() {
                if rows[idx] < n_bus {
                    row_indices.push(rows[idx]);
                    sources.push((idx, re));
                }
            }
            for idx in range {
                if (npv..n_bus).contains(&rows[idx]) {
                    row_indices.push(n_bus + rows[idx] - npv);
                    sources.push((idx, im));
                }
            }
            col_offsets.push(row_indices.len());
        };
        for bus in 0..n_bus {
            push_column(bus, Part::ReVa, Part::ImVa);
        }
        for bus in npv..n_bus {
            push_column(bus, Part::ReVm, Part::ImVm);
        }

        let values = vec![0.0; row_indices.len()];
        let mat = CscMatrix::try_from_csc_data(dim, dim, col_offsets, row_indices, values)
            .map_err(|e| PowerFlowError::SingularMatrix(format!("invalid Jacobian pattern: {e}")))?;
        log::trace!("Jacobian pattern: {dim}×{dim}, {} non-zeros", mat.nnz());
        Ok(Self { mat, sources })
    }

    /// Refills the values from derivatives aligned with the admittance
    /// matrix values.
    #[allow(non_snake_case)]
    pub fn fill(&mut self, dS_dVa: &[Complex64], dS_dVm: &[Complex64]) {
        for (value, &(idx, part)) in self.mat.values_mut().iter_mut().zip(&self.sources) {
            *value = match part {
                Part::ReVa => dS_dVa[idx].re,
                Part::ImVa => dS_dVa[idx].im,
                Part::ReVm => dS_dVm[idx].re,
                Part::ImVm => dS_dVm[idx].im,
            };
        }
    }

    pub fn matrix(&self) -> &CscMatrix<f64> {
        &self.mat
    }
}
