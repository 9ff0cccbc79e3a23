use nalgebra::DVector;
use num_complex::Complex64;

use super::{
    error::Result,
    solver::{FactorMode, Solve, SparseLu},
    sparse::{conj::RealImage, slice::slice_csc_matrix_block},
    system::PowerFlowMat,
};

/// Estimates bus angles from the linearized active power balance
/// `B'·θ = P` with `B' = −Im(Ybus)` and flat voltage magnitudes.
///
/// Works on the reordered system of `mat`: the non-slack buses come first
/// and the slack angles, taken from `mat.v_init`, move to the right-hand side.
/// `p_bus` is the active injection in the same order. Returns `mat.v_init`
/// with the non-slack angles replaced by the estimate.
///
/// An islanded bus or sub-network without slack makes `B'` singular.
pub fn dc_init<S: Solve + Default>(
    mat: &PowerFlowMat,
    p_bus: &DVector<f64>,
) -> Result<DVector<Complex64>> {
    let n = mat.npv + mat.npq;
    let n_slack = mat.n_slack();
    let mut v = mat.v_init.clone();
    if n == 0 {
        return Ok(v);
    }

    let b = mat.y_bus.imag();
    let mut b_red = slice_csc_matrix_block(&b, (0, 0), (n, n));
    b_red.values_mut().iter_mut().for_each(|x| *x = -*x);
    let b_slack = slice_csc_matrix_block(&b, (0, n), (n, n_slack));
    let theta_slack = DVector::from_fn(n_slack, |k, _| mat.v_init[n + k].arg());

    // B'_{red,slack} = −Im(Y)_{red,slack}, so its contribution is added back
    let mut rhs = p_bus.rows(0, n) + &b_slack * &theta_slack;

    let mut lu = SparseLu::<S>::new();
    lu.solve(&b_red, rhs.as_mut_slice(), FactorMode::Cold)?;
    log::debug!(
        "DC angles: min {:.4} rad, max {:.4} rad",
        rhs.min(),
        rhs.max()
    );

    for k in 0..n {
        v[k] = Complex64::from_polar(v[k].norm(), rhs[k]);
    }
    Ok(v)
}
