use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;
use serde::Serialize;

use super::{
    dsbus_dv::dSbus_dV,
    error::{PowerFlowError, Result},
    jacobian::Jacobian,
    solver::{FactorMode, Solve, SparseLu},
};

/// Terminal state of a Newton-Raphson run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConvergenceStatus {
    Converged,
    /// The iteration bound was reached; the last iterate is reported.
    MaxIterationsExceeded,
}

#[derive(Debug, Clone)]
pub struct NewtonSolution {
    /// Voltages in the order of the reordered system.
    pub v: DVector<Complex64>,
    pub status: ConvergenceStatus,
    pub iterations: usize,
    /// Largest absolute mismatch component of the last iterate (p.u.).
    pub max_mismatch: f64,
}

/// Solves the AC power flow equations by Newton-Raphson iteration.
///
/// Buses must be ordered `[pv…, pq…, slack…]`. Angles of PV and PQ buses and
/// magnitudes of PQ buses are updated; slack voltages and PV magnitudes stay
/// at their values in `v_init`. The first factorization uses `mode`, later
/// ones reuse the symbolic analysis.
///
/// A singular Jacobian or a non-finite mismatch is an error; running out of
/// iterations is not.
#[allow(non_snake_case)]
#[allow(clippy::too_many_arguments)]
pub fn newton_pf<S: Solve>(
    Ybus: &CscMatrix<Complex64>,
    Sbus: &DVector<Complex64>,
    v_init: &DVector<Complex64>,
    npv: usize,
    npq: usize,
    tolerance: f64,
    max_iter: usize,
    mode: FactorMode,
    solver: &mut SparseLu<S>,
) -> Result<NewtonSolution> {
    let n_bus = npv + npq;
    let num_state = npv + 2 * npq;

    let mut v = v_init.clone();
    let mut v_m = v.map(|e| e.norm());
    let mut v_a = v.map(|e| e.arg());
    let mut v_norm = v.map(|e| e / e.norm());

    let mut ibus = Ybus * &v;
    let mut F = DVector::zeros(num_state);
    assemble_f(&mut F, &v, &ibus, Sbus, npv, n_bus);

    let mut jacobian = Jacobian::new(Ybus, npv, npq)?;
    let mut dS_dVa = vec![Complex64::default(); Ybus.nnz()];
    let mut dS_dVm = vec![Complex64::default(); Ybus.nnz()];
    let mut iterations = 0;
    let mut mode = mode;

    loop {
        let max_mismatch = norm_inf(&F).ok_or(PowerFlowError::Diverged { iterations })?;
        log::trace!("iteration {iterations}: max mismatch {max_mismatch:.3e}");
        if max_mismatch < tolerance || iterations >= max_iter {
            let status = if max_mismatch < tolerance {
                ConvergenceStatus::Converged
            } else {
                log::debug!(
                    "no convergence after {iterations} iterations, max mismatch {max_mismatch:.3e}"
                );
                ConvergenceStatus::MaxIterationsExceeded
            };
            return Ok(NewtonSolution {
                v,
                status,
                iterations,
                max_mismatch,
            });
        }

        dSbus_dV(Ybus, &v, &v_norm, &ibus, &mut dS_dVa, &mut dS_dVm);
        jacobian.fill(&dS_dVa, &dS_dVm);
        solver.solve(jacobian.matrix(), F.as_mut_slice(), mode)?;
        mode = FactorMode::Warm;

        let dx = &F;
        update_v(&mut v_a, &mut v_m, dx, npv, n_bus);
        for k in 0..n_bus {
            v[k] = Complex64::from_polar(v_m[k], v_a[k]);
            v_norm[k] = Complex64::from_polar(1.0, v_a[k]);
        }
        iterations += 1;

        ibus = Ybus * &v;
        assemble_f(&mut F, &v, &ibus, Sbus, npv, n_bus);
    }
}

/// `F = [Re ΔS[pv, pq], Im ΔS[pq]]` with `ΔS = V·conj(Ibus) − Sbus`.
#[inline(always)]
fn assemble_f(
    f: &mut DVector<f64>,
    v: &DVector<Complex64>,
    ibus: &DVector<Complex64>,
    sbus: &DVector<Complex64>,
    npv: usize,
    n_bus: usize,
) {
    for k in 0..n_bus {
        let mis = v[k] * ibus[k].conj() - sbus[k];
        f[k] = mis.re;
        if k >= npv {
            f[n_bus + k - npv] = mis.im;
        }
    }
}

/// Largest absolute component, or `None` if any component is not finite.
fn norm_inf(f: &DVector<f64>) -> Option<f64> {
    f.iter()
        .try_fold(0.0_f64, |acc, x| x.is_finite().then(|| acc.max(x.abs())))
}

#[inline(always)]
fn update_v(
    v_a: &mut DVector<f64>,
    v_m: &mut DVector<f64>,
    dx: &DVector<f64>,
    npv: usize,
    n_bus: usize,
) {
    v_a.rows_range_mut(0..n_bus)
        .zip_apply(&dx.rows_range(0..n_bus), |a, b| *a -= b);
    v_m.rows_range_mut(npv..n_bus)
        .zip_apply(&dx.rows_range(n_bus..dx.len()), |a, b| *a -= b);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::solver::DefaultSolver;
    use nalgebra_sparse::CooMatrix;
    use num_traits::One;

    /// Reordered 2-bus system: bus 0 PQ, bus 1 slack.
    fn two_bus(p_load: f64) -> (CscMatrix<Complex64>, DVector<Complex64>, DVector<Complex64>) {
        let ys = Complex64::one() / Complex64::new(0.02, 0.06);
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, ys);
        coo.push(0, 1, -ys);
        coo.push(1, 0, -ys);
        coo.push(1, 1, ys);
        let sbus = DVector::from_vec(vec![Complex64::new(-p_load, 0.0), Complex64::default()]);
        let v0 = DVector::from_element(2, Complex64::one());
        (CscMatrix::from(&coo), sbus, v0)
    }

    #[test]
    fn test_two_bus_load() {
        let (y, s, v0) = two_bus(0.5);
        let mut lu = SparseLu::<DefaultSolver>::new();
        let sol = newton_pf(&y, &s, &v0, 0, 1, 1e-8, 10, FactorMode::Cold, &mut lu).unwrap();
        assert_eq!(sol.status, ConvergenceStatus::Converged);
        assert!(sol.iterations <= 10);
        assert!(sol.max_mismatch < 1e-8);
        let v1 = sol.v[0];
        assert!(v1.norm() > 0.9 && v1.norm() < 1.0);
        assert!(v1.arg() < 0.0);
        assert_eq!(sol.v[1], Complex64::one());
        // one symbolic analysis for the whole run
        assert_eq!(lu.stats().symbolic, 1);
        assert_eq!(lu.stats().numeric, sol.iterations);
    }

    #[test]
    fn test_converged_at_start() {
        let (y, s, v0) = two_bus(0.0);
        let mut lu = SparseLu::<DefaultSolver>::new();
        let sol = newton_pf(&y, &s, &v0, 0, 1, 1e-8, 10, FactorMode::Cold, &mut lu).unwrap();
        assert_eq!(sol.iterations, 0);
        assert_eq!(sol.status, ConvergenceStatus::Converged);
        assert_eq!(lu.stats().numeric, 0);
    }

    #[test]
    fn test_max_iterations() {
        let (y, s, v0) = two_bus(0.5);
        let mut lu = SparseLu::<DefaultSolver>::new();
        let sol = newton_pf(&y, &s, &v0, 0, 1, 1e-12, 1, FactorMode::Cold, &mut lu).unwrap();
        assert_eq!(sol.status, ConvergenceStatus::MaxIterationsExceeded);
        assert_eq!(sol.iterations, 1);
        assert!(sol.max_mismatch > 1e-12);
    }

    #[test]
    fn test_diverged_on_nan() {
        let (y, mut s, v0) = two_bus(0.5);
        s[0] = Complex64::new(f64::NAN, 0.0);
        let mut lu = SparseLu::<DefaultSolver>::new();
        let err = newton_pf(&y, &s, &v0, 0, 1, 1e-8, 10, FactorMode::Cold, &mut lu).unwrap_err();
        assert_eq!(err, PowerFlowError::Diverged { iterations: 0 });
    }
}
