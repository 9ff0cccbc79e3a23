use nalgebra_sparse::{CooMatrix, CscMatrix};

/// Copies the block of `shape` starting at `start_pos = (row, col)`.
#[inline(always)]
pub fn slice_csc_matrix_block(
    mat: &CscMatrix<f64>,
    start_pos: (usize, usize),
    shape: (usize, usize),
) -> CscMatrix<f64> {
    let (start_row, start_col) = start_pos;
    let (end_row, end_col) = (shape.0 + start_row, shape.1 + start_col);

    let mut coo = CooMatrix::new(shape.0, shape.1);
    for col in start_col..end_col {
        let lane = mat.col(col);
        for (&row, &v) in lane.row_indices().iter().zip(lane.values()) {
            if row >= start_row && row < end_row {
                coo.push(row - start_row, col - start_col, v);
            }
        }
    }
    CscMatrix::from(&coo)
}
