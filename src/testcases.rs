//! Small reference networks used by the tests and demos.

use num_complex::Complex64;

use crate::basic::error::Result;
use crate::basic::system::GridModel;
use crate::io::converter::{ElementConverter, LineInput, TrafoInput};

/// Two 110 kV buses joined by a line of `r = 0.02`, `x = 0.06` p.u. on a
/// 100 MVA base, with bus 0 as slack at 1.0∠0° and a purely active load of
/// `p_load_mw` on bus 1.
pub fn two_bus(p_load_mw: f64) -> Result<GridModel> {
    GridModel::builder(100.0)
        .init_bus(&[110.0, 110.0])?
        .init_lines(&[0.02], &[0.06], &[Complex64::default()], &[0], &[1])?
        .init_loads(&[p_load_mw], &[0.0], &[1])?
        .add_slack_buses(&[0], &[1.0], &[0.0])?
        .build()
}

/// Four-bus feeder at 50 Hz on a 100 MVA base:
///
/// ```text
/// (0) slack ──110 kV line── (1) PV ──110/20 kV trafo── (2) ──20 kV cable── (3)
/// ```
///
/// Bus 1 carries a generator at 1.02 p.u. and a load, buses 2 and 3 carry
/// loads and bus 3 a capacitor bank. Branch data are converted from
/// physical ratings.
pub fn feeder() -> Result<GridModel> {
    let vn_kv = [110.0, 110.0, 20.0, 20.0];
    let conv = ElementConverter::new(100.0, 50.0)?;

    let lines = conv.line_params(
        &[
            LineInput {
                r_ohm_per_km: 0.12,
                x_ohm_per_km: 0.39,
                c_nf_per_km: 9.5,
                g_us_per_km: 0.0,
                length_km: 20.0,
                parallel: 1,
            },
            LineInput {
                r_ohm_per_km: 0.16,
                x_ohm_per_km: 0.12,
                c_nf_per_km: 250.0,
                g_us_per_km: 0.0,
                length_km: 2.0,
                parallel: 2,
            },
        ],
        &[vn_kv[0], vn_kv[2]],
        &[vn_kv[1], vn_kv[3]],
    )?;
    let trafos = conv.trafo_params(
        &[TrafoInput {
            vn_hv_kv: 110.0,
            vn_lv_kv: 20.0,
            vk_percent: 12.0,
            vkr_percent: 0.4,
            sn_mva: 25.0,
            pfe_kw: 14.0,
            i0_percent: 0.07,
            parallel: 1,
        }],
        &[vn_kv[2]],
    )?;

    GridModel::builder(100.0)
        .init_bus(&vn_kv)?
        .init_lines(&lines.r, &lines.x, &lines.h, &[0, 2], &[1, 3])?
        .init_trafos(
            &trafos.r,
            &trafos.x,
            &trafos.h,
            &[1.5],
            &[0],
            &[true],
            &[1],
            &[2],
        )?
        .init_shunts(&[0.0], &[-1.0], &[3])?
        .init_loads(&[10.0, 6.0, 4.0], &[3.0, 2.0, 1.2], &[1, 2, 3])?
        .init_generators(&[20.0], &[1.02], &[-15.0], &[15.0], &[1])?
        .add_slack_buses(&[0], &[1.0], &[0.0])?
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::config::{PowerFlowConfig, StartMode};
    use crate::basic::error::PowerFlowError;
    use crate::basic::newtonpf::ConvergenceStatus;
    use crate::basic::session::{PowerFlow, SessionState};
    use crate::basic::solver::DefaultSolver;
    use crate::basic::system::BusType;
    use nalgebra::DVector;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn flat() -> PowerFlowConfig {
        PowerFlowConfig::new(StartMode::Flat)
    }

    fn max_diff(a: &DVector<Complex64>, b: &DVector<Complex64>) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).norm()).fold(0.0, f64::max)
    }

    /// Largest mismatch over the equations Newton-Raphson solves.
    fn max_mismatch(grid: &GridModel, v: &DVector<Complex64>) -> f64 {
        let ibus = grid.y_bus() * v;
        let s_bus = grid.s_bus();
        let mut max = 0.0_f64;
        for (bus, kind) in grid.bus_types().iter().enumerate() {
            let mis = v[bus] * ibus[bus].conj() - s_bus[bus];
            match kind {
                BusType::PQ => max = max.max(mis.re.abs()).max(mis.im.abs()),
                BusType::PV => max = max.max(mis.re.abs()),
                BusType::Slack => {}
            }
        }
        max
    }

    #[test]
    fn test_two_bus_flat() {
        init();
        let mut pf = PowerFlow::<DefaultSolver>::new(two_bus(50.0).unwrap());
        let res = pf.solve(&flat()).unwrap();
        assert!(res.converged);
        assert!(res.iterations <= 10);
        let vm = res.results.buses[1].vm_pu;
        assert!(vm > 0.95 && vm < 1.0, "vm = {vm}");
        assert!(res.results.buses[1].va_degree < 0.0);
        // slack covers load plus losses
        let line = &res.results.lines[0];
        assert!(line.pl_mw > 0.0);
        assert!((res.results.slack[0].p_mw - 50.0 - line.pl_mw).abs() < 1e-6);
        assert_eq!(res.results.slack[0].bus, 0);
        assert_eq!(pf.state(), SessionState::Solved);
    }

    #[test]
    fn test_two_bus_every_start_mode() {
        init();
        let mut pf = PowerFlow::<DefaultSolver>::new(two_bus(50.0).unwrap());
        let mut voltages = Vec::new();
        for start in [StartMode::Dc, StartMode::Flat, StartMode::Warm] {
            let res = pf.solve(&PowerFlowConfig::new(start)).unwrap();
            assert_eq!(res.start, start);
            assert!(res.converged, "{start:?}");
            assert!(res.iterations <= 10);
            let v1 = res.v[1];
            assert!(v1.norm() > 0.9 && v1.norm() < 1.0);
            assert!(v1.arg() < 0.0);
            voltages.push(res.v.clone());
        }
        assert!(max_diff(&voltages[0], &voltages[1]) < 1e-8);
        assert!(max_diff(&voltages[2], &voltages[1]) < 1e-8);
    }

    #[test]
    fn test_slack_and_single_pv_bus() {
        init();
        let grid = GridModel::builder(100.0)
            .init_bus(&[110.0, 110.0])
            .unwrap()
            .init_lines(&[0.02], &[0.06], &[Complex64::default()], &[0], &[1])
            .unwrap()
            .init_generators(&[30.0], &[1.01], &[-50.0], &[50.0], &[1])
            .unwrap()
            .add_slack_buses(&[0], &[1.0], &[0.0])
            .unwrap()
            .build()
            .unwrap();
        let mut pf = PowerFlow::<DefaultSolver>::new(grid);
        for start in [StartMode::Flat, StartMode::Dc] {
            let res = pf.solve(&PowerFlowConfig::new(start)).unwrap();
            assert!(res.converged, "{start:?}");
            assert!((res.v[1].norm() - 1.01).abs() < 1e-12);
            assert!(res.v[1].arg() > 0.0);
            assert!((res.results.buses[1].p_mw - 30.0).abs() < 1e-5);
            assert!((res.results.gens[0].q_mvar - res.results.buses[1].q_mvar).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zero_load_converges_immediately() {
        init();
        let mut pf = PowerFlow::<DefaultSolver>::new(two_bus(0.0).unwrap());
        let res = pf.solve(&flat()).unwrap();
        assert!(res.converged);
        assert!(res.iterations <= 1);
        assert!((res.v[1] - Complex64::new(1.0, 0.0)).norm() < 1e-10);
    }

    #[test]
    fn test_feeder_mismatch_below_tolerance() {
        init();
        let mut pf = PowerFlow::<DefaultSolver>::new(feeder().unwrap());
        let res = pf.solve(&flat().with_tol(1e-10)).unwrap().clone();
        assert_eq!(res.status, ConvergenceStatus::Converged);
        assert!(res.max_mismatch < 1e-10);
        assert!(max_mismatch(pf.grid(), &res.v) < 1e-10);
        // PV magnitude and slack voltage are held
        assert!((res.v[1].norm() - 1.02).abs() < 1e-12);
        assert!((res.v[0] - Complex64::new(1.0, 0.0)).norm() < 1e-12);
        // gen P is its setpoint, its Q balances bus 1
        assert_eq!(res.results.gens[0].p_mw, 20.0);
        let q_bus1 = res.results.buses[1].q_mvar + 3.0;
        assert!((res.results.gens[0].q_mvar - q_bus1).abs() < 1e-9);
    }

    #[test]
    fn test_solve_is_idempotent() {
        init();
        let mut pf = PowerFlow::<DefaultSolver>::new(feeder().unwrap());
        let v1 = pf.solve(&flat()).unwrap().v.clone();
        let v2 = pf.solve(&flat()).unwrap().v.clone();
        assert_eq!(v1, v2);
    }

    #[test]
    fn test_dc_start_matches_flat() {
        init();
        let mut pf = PowerFlow::<DefaultSolver>::new(feeder().unwrap());
        let v_flat = pf.solve(&flat().with_tol(1e-10)).unwrap().v.clone();
        let res = pf
            .solve(&PowerFlowConfig::new(StartMode::Dc).with_tol(1e-10))
            .unwrap();
        assert_eq!(res.start, StartMode::Dc);
        assert!(res.converged);
        assert!(max_diff(&res.v, &v_flat) < 1e-8);
    }

    #[test]
    fn test_warm_start_after_load_change() {
        init();
        let cfg = |start| PowerFlowConfig::new(start).with_tol(1e-10);
        let mut pf = PowerFlow::<DefaultSolver>::new(feeder().unwrap());
        pf.solve(&cfg(StartMode::Flat)).unwrap();
        let symbolic = pf.solver_stats().symbolic;

        pf.grid_mut().set_load_pq(2, 5.0, 1.5).unwrap();
        assert!(pf.result().is_none());
        let warm = pf.solve(&cfg(StartMode::Warm)).unwrap().clone();
        assert_eq!(warm.start, StartMode::Warm);
        assert!(warm.converged);
        // same Jacobian pattern, no new symbolic analysis
        assert_eq!(pf.solver_stats().symbolic, symbolic);

        let mut fresh = PowerFlow::<DefaultSolver>::new(pf.grid().clone());
        let cold = fresh.solve(&cfg(StartMode::Flat)).unwrap();
        assert!(max_diff(&warm.v, &cold.v) < 1e-8);
        assert!(warm.iterations <= cold.iterations);
    }

    #[test]
    fn test_warm_start_of_solved_case() {
        init();
        let mut pf = PowerFlow::<DefaultSolver>::new(feeder().unwrap());
        let v = pf.solve(&flat()).unwrap().v.clone();
        let res = pf.solve(&PowerFlowConfig::new(StartMode::Warm)).unwrap();
        assert_eq!(res.iterations, 0);
        assert!(max_diff(&res.v, &v) < 1e-12);
    }

    #[test]
    fn test_warm_start_falls_back_to_flat() {
        init();
        let mut pf = PowerFlow::<DefaultSolver>::new(feeder().unwrap());
        let warm = PowerFlowConfig::new(StartMode::Warm);
        // nothing solved yet
        assert_eq!(pf.solve(&warm).unwrap().start, StartMode::Flat);

        pf.grid_mut().set_gen_status(0, false).unwrap();
        let res = pf.solve(&warm).unwrap();
        assert_eq!(res.start, StartMode::Flat);
        assert!(res.converged);
        assert_eq!(res.results.gens[0].p_mw, 0.0);
    }

    #[test]
    fn test_warm_start_after_load_and_shunt_switching() {
        init();
        let mut pf = PowerFlow::<DefaultSolver>::new(feeder().unwrap());
        pf.solve(&flat()).unwrap();
        pf.grid_mut().set_load_status(0, false).unwrap();
        pf.grid_mut().set_shunt_status(0, false).unwrap();
        let res = pf.solve(&PowerFlowConfig::new(StartMode::Warm)).unwrap();
        assert_eq!(res.start, StartMode::Warm);
        assert!(res.converged);
        assert_eq!(res.results.shunts[0].q_mvar, 0.0);
        assert_eq!(res.results.loads[0].p_mw, 0.0);
    }

    #[test]
    fn test_tap_raises_ratio() {
        init();
        let mut pf = PowerFlow::<DefaultSolver>::new(feeder().unwrap());
        let before = pf.solve(&flat()).unwrap().results.clone();
        let revision = pf.grid().structure_revision();
        let nnz = pf.grid().y_bus().nnz();

        pf.grid_mut().set_trafo_tap(0, 2).unwrap();
        assert_eq!(pf.grid().structure_revision(), revision);
        let res = pf.solve(&PowerFlowConfig::new(StartMode::Warm)).unwrap();
        assert_eq!(res.start, StartMode::Warm);
        assert!(res.converged);
        // tap on the HV side: a higher ratio lowers the LV voltage
        assert!(res.results.buses[2].vm_pu < before.buses[2].vm_pu);
        assert!((res.results.trafos[0].q_to_mvar - before.trafos[0].q_to_mvar).abs() > 1e-6);
        assert_eq!(res.results.buses.len(), 4);
        assert_eq!(pf.grid().y_bus().nnz(), nnz);
        assert_eq!(pf.grid().slack_buses(), vec![0]);
    }

    #[test]
    fn test_max_iterations_is_not_an_error() {
        init();
        let mut pf = PowerFlow::<DefaultSolver>::new(feeder().unwrap());
        let res = pf.solve(&flat().with_max_it(1).with_tol(1e-12)).unwrap();
        assert!(!res.converged);
        assert_eq!(res.status, ConvergenceStatus::MaxIterationsExceeded);
        assert_eq!(res.iterations, 1);
        assert_eq!(res.results.buses.len(), 4);
        // non-converged voltages are never used for a warm start
        let res = pf.solve(&PowerFlowConfig::new(StartMode::Warm)).unwrap();
        assert_eq!(res.start, StartMode::Flat);
    }

    #[test]
    fn test_islanded_bus_is_singular() {
        init();
        let grid = GridModel::builder(100.0)
            .init_bus(&[110.0, 110.0, 110.0])
            .unwrap()
            .init_lines(&[0.02], &[0.06], &[Complex64::default()], &[0], &[1])
            .unwrap()
            .init_loads(&[10.0, 5.0], &[0.0, 0.0], &[1, 2])
            .unwrap()
            .add_slack_buses(&[0], &[1.0], &[0.0])
            .unwrap()
            .build()
            .unwrap();
        let mut pf = PowerFlow::<DefaultSolver>::new(grid);
        let err = pf.solve(&PowerFlowConfig::new(StartMode::Dc)).unwrap_err();
        assert!(matches!(err, PowerFlowError::SingularMatrix(_)));
        assert_eq!(pf.state(), SessionState::Built);
        assert!(pf.result().is_none());
    }

    #[test]
    fn test_missing_slack() {
        let err = GridModel::builder(100.0)
            .init_bus(&[110.0, 110.0])
            .unwrap()
            .init_lines(&[0.02], &[0.06], &[Complex64::default()], &[0], &[1])
            .unwrap()
            .build()
            .unwrap_err();
        assert!(matches!(err, PowerFlowError::Topology(_)));
    }

    #[test]
    fn test_json_config() {
        init();
        let cfg = PowerFlowConfig::from_json(r#"{"start": "dc", "tol": 1e-9, "max_it": 20}"#)
            .unwrap();
        let mut pf = PowerFlow::<DefaultSolver>::new(feeder().unwrap());
        let res = pf.solve(&cfg).unwrap();
        assert!(res.converged);
        assert!(res.max_mismatch < 1e-9);
        let json = serde_json::to_value(res).unwrap();
        assert_eq!(json["status"], "Converged");
        assert_eq!(json["results"]["buses"].as_array().map(Vec::len), Some(4));
    }

    #[test]
    fn test_gen_out_of_service_turns_bus_pq() {
        init();
        let mut pf = PowerFlow::<DefaultSolver>::new(feeder().unwrap());
        pf.grid_mut().set_gen_status(0, false).unwrap();
        assert_eq!(pf.grid().bus_types()[1], BusType::PQ);
        let res = pf.solve(&flat()).unwrap();
        assert!(res.converged);
        assert!(res.results.buses[1].vm_pu < 1.02);
        assert_eq!(res.results.gens[0].p_mw, 0.0);
    }
}
