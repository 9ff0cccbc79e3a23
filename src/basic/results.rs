//! Per-element flows derived from a bus voltage solution.
//!
//! Powers are in MW / MVAr, voltages in kV and currents in kA. Power at a
//! branch terminal is counted positive when it flows from the bus into the
//! branch. Out-of-service elements report zeros. Nothing here checks for
//! convergence; NaN voltages give NaN results.

use nalgebra::DVector;
use num_complex::Complex64;
use serde::Serialize;

use super::system::{BranchAdmittance, GridModel, elements::BusType};

/// Tolerance keeping the reactive sharing weights of generators with an
/// empty range positive.
const EPS_Q: f64 = 1e-4;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BusResult {
    pub vm_pu: f64,
    pub va_degree: f64,
    pub v_kv: f64,
    /// Net injection into the network.
    pub p_mw: f64,
    pub q_mvar: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BranchResult {
    pub p_from_mw: f64,
    pub q_from_mvar: f64,
    pub v_from_kv: f64,
    pub i_from_ka: f64,
    pub p_to_mw: f64,
    pub q_to_mvar: f64,
    pub v_to_kv: f64,
    pub i_to_ka: f64,
    /// Active losses (MW)
    pub pl_mw: f64,
    /// Reactive losses (MVAr)
    pub ql_mvar: f64,
}

/// Power drawn from (loads, shunts) or supplied to (generators) a bus.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InjectionResult {
    pub p_mw: f64,
    pub q_mvar: f64,
    pub v_kv: f64,
}

/// Power supplied by a slack bus on top of its scheduled injection. The
/// generators on the bus report it as part of their output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SlackResult {
    pub bus: usize,
    pub p_mw: f64,
    pub q_mvar: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkResults {
    pub buses: Vec<BusResult>,
    pub lines: Vec<BranchResult>,
    pub trafos: Vec<BranchResult>,
    pub loads: Vec<InjectionResult>,
    pub shunts: Vec<InjectionResult>,
    pub gens: Vec<InjectionResult>,
    pub slack: Vec<SlackResult>,
}

/// Line-to-line current magnitude in kA of apparent power `s_mva` at a
/// terminal of `vm_pu` on a bus of `vn_kv`.
#[inline]
fn current_ka(s_mva: Complex64, vm_pu: f64, vn_kv: f64) -> f64 {
    s_mva.norm() / (3f64.sqrt() * vm_pu * vn_kv)
}

fn branch_result(
    grid: &GridModel,
    v: &DVector<Complex64>,
    branch: &BranchAdmittance,
) -> BranchResult {
    let sn = grid.sn_mva();
    let (f, t) = (branch.port.from_bus(), branch.port.to_bus());
    let (i_f, i_t) = branch.currents(v[f], v[t]);
    let s_f = v[f] * i_f.conj() * sn;
    let s_t = v[t] * i_t.conj() * sn;
    let (vn_f, vn_t) = (grid.buses()[f].vn_kv, grid.buses()[t].vn_kv);
    BranchResult {
        p_from_mw: s_f.re,
        q_from_mvar: s_f.im,
        v_from_kv: v[f].norm() * vn_f,
        i_from_ka: current_ka(s_f, v[f].norm(), vn_f),
        p_to_mw: s_t.re,
        q_to_mvar: s_t.im,
        v_to_kv: v[t].norm() * vn_t,
        i_to_ka: current_ka(s_t, v[t].norm(), vn_t),
        pl_mw: s_f.re + s_t.re,
        ql_mvar: s_f.im + s_t.im,
    }
}

/// Computes all element results for voltages `v` given in bus order.
pub fn extract_results(grid: &GridModel, v: &DVector<Complex64>) -> NetworkResults {
    let sn = grid.sn_mva();
    let n_bus = grid.n_bus();
    let vm = v.map(|e| e.norm());
    let v_kv = |bus: usize| vm[bus] * grid.buses()[bus].vn_kv;

    let ibus = grid.y_bus() * v;
    let s_calc = v.component_mul(&ibus.conjugate());

    let buses = (0..n_bus)
        .map(|bus| BusResult {
            vm_pu: vm[bus],
            va_degree: v[bus].arg().to_degrees(),
            v_kv: v_kv(bus),
            p_mw: s_calc[bus].re * sn,
            q_mvar: s_calc[bus].im * sn,
        })
        .collect();

    let lines = grid
        .lines()
        .iter()
        .map(|l| {
            if l.in_service {
                branch_result(grid, v, &BranchAdmittance::line(l))
            } else {
                BranchResult::default()
            }
        })
        .collect();

    let trafos = grid
        .trafos()
        .iter()
        .map(|t| {
            if t.in_service {
                branch_result(grid, v, &BranchAdmittance::transformer(t))
            } else {
                BranchResult::default()
            }
        })
        .collect();

    let loads = grid
        .loads()
        .iter()
        .map(|l| {
            if !l.in_service {
                return InjectionResult::default();
            }
            InjectionResult {
                p_mw: l.p_mw,
                q_mvar: l.q_mvar,
                v_kv: v_kv(l.bus),
            }
        })
        .collect();

    // constant admittance: consumption scales with the voltage squared
    let shunts = grid
        .shunts()
        .iter()
        .map(|s| {
            if !s.in_service {
                return InjectionResult::default();
            }
            let vm2 = vm[s.bus] * vm[s.bus];
            InjectionResult {
                p_mw: s.p_mw * vm2,
                q_mvar: s.q_mvar * vm2,
                v_kv: v_kv(s.bus),
            }
        })
        .collect();

    let s_bus = grid.s_bus();
    let gens = gen_results(grid, &s_calc, &s_bus, &vm);

    let slack = grid
        .slack()
        .iter()
        .map(|s| {
            let residual = (s_calc[s.bus] - s_bus[s.bus]) * sn;
            SlackResult {
                bus: s.bus,
                p_mw: residual.re,
                q_mvar: residual.im,
            }
        })
        .collect();

    NetworkResults {
        buses,
        lines,
        trafos,
        loads,
        shunts,
        gens,
        slack,
    }
}

/// Generators on PV buses report their active setpoint. The reactive power a
/// bus needs is shared between its generators in proportion to their
/// reactive ranges. On slack buses the active residual the slack supplies is
/// shared the same way on top of the setpoints.
fn gen_results(
    grid: &GridModel,
    s_calc: &DVector<Complex64>,
    s_bus: &DVector<Complex64>,
    vm: &DVector<f64>,
) -> Vec<InjectionResult> {
    let n_bus = grid.n_bus();
    let sn = grid.sn_mva();

    let mut q_needed = s_calc.map(|s| s.im * sn);
    for l in grid.loads().iter().filter(|l| l.in_service) {
        q_needed[l.bus] += l.q_mvar;
    }
    let mut q_range = vec![0.0; n_bus];
    let mut count = vec![0usize; n_bus];
    for g in grid.generators().iter().filter(|g| g.in_service) {
        q_range[g.bus] += g.max_q_mvar - g.min_q_mvar;
        count[g.bus] += 1;
    }

    grid.generators()
        .iter()
        .map(|g| {
            if !g.in_service {
                return InjectionResult::default();
            }
            let share = if count[g.bus] == 1 {
                1.0
            } else {
                (g.max_q_mvar - g.min_q_mvar + EPS_Q)
                    / (q_range[g.bus] + count[g.bus] as f64 * EPS_Q)
            };
            let p_mw = match grid.bus_types()[g.bus] {
                BusType::Slack => g.p_mw + (s_calc[g.bus].re - s_bus[g.bus].re) * sn * share,
                _ => g.p_mw,
            };
            InjectionResult {
                p_mw,
                q_mvar: q_needed[g.bus] * share,
                v_kv: vm[g.bus] * grid.buses()[g.bus].vn_kv,
            }
        })
        .collect()
}
