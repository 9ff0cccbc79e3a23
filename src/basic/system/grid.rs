use std::cell::OnceCell;

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;
use num_traits::{One, Zero};

use super::admittance::create_y_bus;
use super::builder::{GridBuilder, check_ratio};
use super::elements::*;
use super::matrices::PowerFlowMat;
use crate::basic::error::{PowerFlowError, Result, ensure_finite, ensure_positive};

/// Element collections of one network plus the derived bus classification and
/// a lazily assembled admittance matrix.
///
/// The topology is fixed once built; only element status and setpoints can be
/// changed through the setters. Every setter that touches the admittance
/// matrix drops the cached copy. Switching a branch or a generator bumps
/// [`GridModel::structure_revision`], since it changes the admittance
/// pattern or the bus classification.
#[derive(Debug, Clone)]
pub struct GridModel {
    pub(super) sn_mva: f64,
    pub(super) buses: Vec<Bus>,
    pub(super) lines: Vec<Line>,
    pub(super) trafos: Vec<Transformer>,
    pub(super) shunts: Vec<Shunt>,
    pub(super) loads: Vec<Load>,
    pub(super) gens: Vec<Generator>,
    pub(super) slack: Vec<SlackBus>,
    pub(super) bus_types: BusTypes,
    pub(super) revision: u64,
    pub(super) y_bus: OnceCell<CscMatrix<Complex64>>,
}

fn check_id(element: &str, id: usize, len: usize) -> Result<()> {
    if id < len {
        Ok(())
    } else {
        Err(PowerFlowError::topology(format!(
            "{element} {id} does not exist ({len} defined)"
        )))
    }
}

fn check_in_service(
    element: &'static str,
    name: &'static str,
    id: usize,
    in_service: bool,
) -> Result<()> {
    if in_service {
        Ok(())
    } else {
        Err(PowerFlowError::invalid(
            element,
            name,
            id,
            "element is out of service",
        ))
    }
}

impl GridModel {
    /// Starts a new grid with the system base power in MVA.
    pub fn builder(sn_mva: f64) -> GridBuilder {
        GridBuilder::new(sn_mva)
    }

    pub fn sn_mva(&self) -> f64 {
        self.sn_mva
    }
    pub fn n_bus(&self) -> usize {
        self.buses.len()
    }
    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }
    pub fn trafos(&self) -> &[Transformer] {
        &self.trafos
    }
    pub fn shunts(&self) -> &[Shunt] {
        &self.shunts
    }
    pub fn loads(&self) -> &[Load] {
        &self.loads
    }
    pub fn generators(&self) -> &[Generator] {
        &self.gens
    }
    pub fn slack(&self) -> &[SlackBus] {
        &self.slack
    }

    /// Counter bumped whenever an element is switched in or out of service.
    pub fn structure_revision(&self) -> u64 {
        self.revision
    }

    /// Nodal admittance matrix, assembled on first access after a change.
    pub fn y_bus(&self) -> &CscMatrix<Complex64> {
        self.y_bus.get_or_init(|| {
            let y = create_y_bus(
                self.n_bus(),
                self.sn_mva,
                &self.lines,
                &self.trafos,
                &self.shunts,
            );
            log::debug!("assembled Y-bus: {} buses, {} non-zeros", y.nrows(), y.nnz());
            y
        })
    }

    /// Whether the admittance matrix is currently cached.
    pub fn y_bus_cached(&self) -> bool {
        self.y_bus.get().is_some()
    }

    pub fn bus_types(&self) -> &BusTypes {
        &self.bus_types
    }
    pub fn pv_buses(&self) -> Vec<usize> {
        self.bus_types.of(BusType::PV)
    }
    pub fn pq_buses(&self) -> Vec<usize> {
        self.bus_types.of(BusType::PQ)
    }
    pub fn slack_buses(&self) -> Vec<usize> {
        self.bus_types.of(BusType::Slack)
    }

    /// Specified complex injection per bus in p.u.: generation minus load.
    /// Shunt consumption is part of the admittance matrix.
    pub fn s_bus(&self) -> DVector<Complex64> {
        let mut s = DVector::from_element(self.n_bus(), Complex64::zero());
        let frac = 1.0 / self.sn_mva;
        for g in self.gens.iter().filter(|g| g.in_service) {
            s[g.bus].re += g.p_mw * frac;
        }
        for l in self.loads.iter().filter(|l| l.in_service) {
            s[l.bus] -= Complex64::new(l.p_mw, l.q_mvar) * frac;
        }
        s
    }

    /// Active injection for the DC approximation, with shunt losses at
    /// nominal voltage taken out of the injection.
    pub fn p_bus_dc(&self) -> DVector<f64> {
        let mut p = self.s_bus().map(|s| s.re);
        for sh in self.shunts.iter().filter(|s| s.in_service) {
            p[sh.bus] -= sh.p_mw / self.sn_mva;
        }
        p
    }

    /// Voltage magnitude setpoint of a PV bus, taken from its first
    /// in-service generator.
    pub(crate) fn pv_setpoint(&self, bus: usize) -> Option<f64> {
        let mut setpoints = self
            .gens
            .iter()
            .filter(|g| g.in_service && g.bus == bus)
            .map(|g| g.vm_pu);
        let first = setpoints.next()?;
        if setpoints.any(|vm| vm != first) {
            log::debug!("bus {bus}: generators disagree on vm_pu, using {first}");
        }
        Some(first)
    }

    /// Flat start: 1.0∠0° on PQ buses, generator setpoints on PV buses and
    /// the given magnitude and angle on slack buses.
    pub fn v_init(&self) -> DVector<Complex64> {
        let mut v = DVector::from_element(self.n_bus(), Complex64::one());
        for bus in self.pv_buses() {
            if let Some(vm) = self.pv_setpoint(bus) {
                v[bus] = Complex64::new(vm, 0.0);
            }
        }
        for s in &self.slack {
            v[s.bus] = Complex64::from_polar(s.vm_pu, s.va_degree.to_radians());
        }
        v
    }

    /// Permuted matrices for the Newton-Raphson solver, starting from
    /// [`GridModel::v_init`].
    pub fn prepare_matrices(&self) -> PowerFlowMat {
        PowerFlowMat::new(
            self.y_bus(),
            &self.s_bus(),
            &self.v_init(),
            &self.pv_buses(),
            &self.pq_buses(),
            &self.slack_buses(),
        )
    }

    fn invalidate(&mut self) {
        self.y_bus.take();
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    pub fn set_line_status(&mut self, id: usize, in_service: bool) -> Result<()> {
        check_id("line", id, self.lines.len())?;
        if self.lines[id].in_service != in_service {
            self.lines[id].in_service = in_service;
            self.invalidate();
            self.bump();
        }
        Ok(())
    }

    pub fn set_trafo_status(&mut self, id: usize, in_service: bool) -> Result<()> {
        check_id("trafo", id, self.trafos.len())?;
        if self.trafos[id].in_service != in_service {
            self.trafos[id].in_service = in_service;
            self.invalidate();
            self.bump();
        }
        Ok(())
    }

    /// Moves the tap changer. The pattern of the admittance matrix is kept.
    pub fn set_trafo_tap(&mut self, id: usize, tap_pos: i32) -> Result<()> {
        check_id("trafo", id, self.trafos.len())?;
        check_in_service("trafo", "tap_pos", id, self.trafos[id].in_service)?;
        let mut trafo = self.trafos[id].clone();
        trafo.tap_pos = tap_pos;
        check_ratio(id, &trafo)?;
        self.trafos[id] = trafo;
        self.invalidate();
        Ok(())
    }

    pub fn set_shunt_status(&mut self, id: usize, in_service: bool) -> Result<()> {
        check_id("shunt", id, self.shunts.len())?;
        if self.shunts[id].in_service != in_service {
            self.shunts[id].in_service = in_service;
            self.invalidate();
        }
        Ok(())
    }

    pub fn set_shunt_pq(&mut self, id: usize, p_mw: f64, q_mvar: f64) -> Result<()> {
        check_id("shunt", id, self.shunts.len())?;
        check_in_service("shunt", "p_mw", id, self.shunts[id].in_service)?;
        ensure_finite("shunt", "p_mw", id, p_mw)?;
        ensure_finite("shunt", "q_mvar", id, q_mvar)?;
        self.shunts[id].p_mw = p_mw;
        self.shunts[id].q_mvar = q_mvar;
        self.invalidate();
        Ok(())
    }

    pub fn set_load_status(&mut self, id: usize, in_service: bool) -> Result<()> {
        check_id("load", id, self.loads.len())?;
        if self.loads[id].in_service != in_service {
            self.loads[id].in_service = in_service;
        }
        Ok(())
    }

    pub fn set_load_pq(&mut self, id: usize, p_mw: f64, q_mvar: f64) -> Result<()> {
        check_id("load", id, self.loads.len())?;
        check_in_service("load", "p_mw", id, self.loads[id].in_service)?;
        ensure_finite("load", "p_mw", id, p_mw)?;
        ensure_finite("load", "q_mvar", id, q_mvar)?;
        self.loads[id].p_mw = p_mw;
        self.loads[id].q_mvar = q_mvar;
        Ok(())
    }

    /// Switches a generator; its bus is reclassified accordingly.
    pub fn set_gen_status(&mut self, id: usize, in_service: bool) -> Result<()> {
        check_id("gen", id, self.gens.len())?;
        if self.gens[id].in_service != in_service {
            self.gens[id].in_service = in_service;
            self.bus_types = classify_buses(self.n_bus(), &self.slack, &self.gens);
            self.bump();
            log::debug!(
                "gen {id} {}: bus {} is now {}",
                if in_service { "in service" } else { "out of service" },
                self.gens[id].bus,
                self.bus_types[self.gens[id].bus]
            );
        }
        Ok(())
    }

    pub fn set_gen_p(&mut self, id: usize, p_mw: f64) -> Result<()> {
        check_id("gen", id, self.gens.len())?;
        check_in_service("gen", "p_mw", id, self.gens[id].in_service)?;
        ensure_finite("gen", "p_mw", id, p_mw)?;
        self.gens[id].p_mw = p_mw;
        Ok(())
    }

    pub fn set_gen_vm(&mut self, id: usize, vm_pu: f64) -> Result<()> {
        check_id("gen", id, self.gens.len())?;
        check_in_service("gen", "vm_pu", id, self.gens[id].in_service)?;
        ensure_positive("gen", "vm_pu", id, vm_pu)?;
        self.gens[id].vm_pu = vm_pu;
        Ok(())
    }

    /// Changes the voltage magnitude of the `id`-th registered slack bus.
    pub fn set_slack_vm(&mut self, id: usize, vm_pu: f64) -> Result<()> {
        check_id("slack", id, self.slack.len())?;
        ensure_positive("slack", "vm_pu", id, vm_pu)?;
        self.slack[id].vm_pu = vm_pu;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 0 (slack) -- 1 (gen) -- 2 (load, shunt), plus a transformer 1 -> 2.
    fn grid() -> GridModel {
        GridModel::builder(100.0)
            .init_bus(&[110.0, 110.0, 20.0])
            .unwrap()
            .init_lines(
                &[0.01, 0.02],
                &[0.1, 0.2],
                &[Complex64::new(0.0, 0.02); 2],
                &[0, 1],
                &[1, 2],
            )
            .unwrap()
            .init_trafos(
                &[0.01],
                &[0.1],
                &[Complex64::zero()],
                &[2.5],
                &[0],
                &[true],
                &[1],
                &[2],
            )
            .unwrap()
            .init_shunts(&[1.0], &[-5.0], &[2])
            .unwrap()
            .init_loads(&[30.0, 10.0], &[10.0, 5.0], &[2, 2])
            .unwrap()
            .init_generators(&[20.0], &[1.02], &[-10.0], &[10.0], &[1])
            .unwrap()
            .add_slack_buses(&[0], &[1.01], &[5.0])
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_s_bus_and_dc_injection() {
        let g = grid();
        let s = g.s_bus();
        assert!((s[1] - Complex64::new(0.2, 0.0)).norm() < 1e-12);
        assert!((s[2] - Complex64::new(-0.4, -0.15)).norm() < 1e-12);
        assert!(s[0].is_zero());
        let p = g.p_bus_dc();
        assert!((p[2] + 0.41).abs() < 1e-12);
    }

    #[test]
    fn test_v_init() {
        let v = grid().v_init();
        assert!((v[0].norm() - 1.01).abs() < 1e-12);
        assert!((v[0].arg().to_degrees() - 5.0).abs() < 1e-9);
        assert_eq!(v[1], Complex64::new(1.02, 0.0));
        assert_eq!(v[2], Complex64::one());
    }

    #[test]
    fn test_cache_and_revision() {
        let mut g = grid();
        let nnz = g.y_bus().nnz();
        assert!(g.y_bus_cached());

        g.set_trafo_tap(0, 3).unwrap();
        assert!(!g.y_bus_cached());
        assert_eq!(g.structure_revision(), 0);
        assert_eq!(g.y_bus().nnz(), nnz);

        g.set_load_pq(0, 40.0, 10.0).unwrap();
        assert!(g.y_bus_cached());

        // the diagonal stays in the pattern, bus types are unchanged
        g.set_load_status(0, false).unwrap();
        g.set_shunt_status(0, false).unwrap();
        assert_eq!(g.structure_revision(), 0);
        assert!(!g.y_bus_cached());
        assert_eq!(g.y_bus().nnz(), nnz);

        g.set_line_status(0, false).unwrap();
        assert_eq!(g.structure_revision(), 1);
        assert!(g.y_bus().nnz() < nnz);
        // same status again is a no-op
        // the diagonal stays in the pattern, bus types are unchanged
        g.set_load_status(0, false).unwrap();
        g.set_shunt_status(0, false).unwrap();
        assert_eq!(g.structure_revision(), 0);
        assert!(!g.y_bus_cached());
        assert_eq!(g.y_bus().nnz(), nnz);

        g.set_line_status(0, false).unwrap();
        assert_eq!(g.structure_revision(), 1);
    }

    #[test]
    fn test_gen_status_reclassifies() {
        let mut g = grid();
        assert_eq!(g.bus_types()[1], BusType::PV);
        g.set_gen_status(0, false).unwrap();
        assert_eq!(g.bus_types()[1], BusType::PQ);
        assert_eq!(g.pq_buses(), vec![1, 2]);
        assert!(g.s_bus()[1].is_zero());
        assert!(matches!(
            g.set_gen_p(0, 10.0),
            Err(PowerFlowError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_setter_errors() {
        let mut g = grid();
        assert!(matches!(
            g.set_line_status(5, true),
            Err(PowerFlowError::Topology(_))
        ));
        assert!(matches!(
            g.set_load_pq(0, f64::NAN, 0.0),
            Err(PowerFlowError::InvalidParameter { .. })
        ));
        assert!(matches!(
            g.set_gen_vm(0, 0.0),
            Err(PowerFlowError::InvalidParameter { .. })
        ));
        // -40 steps of 2.5 % gives a zero ratio
        assert!(matches!(
            g.set_trafo_tap(0, -40),
            Err(PowerFlowError::InvalidParameter { .. })
        ));
        assert_eq!(g.trafos()[0].tap_pos, 0);
    }

    #[test]
    fn test_prepare_matrices() {
        let g = grid();
        let mat = g.prepare_matrices();
        assert_eq!((mat.npv, mat.npq, mat.n_slack()), (1, 1, 1));
        assert_eq!(mat.from_perm, vec![1, 2, 0]);
        assert_eq!(mat.y_bus.nrows(), 3);
        assert_eq!(mat.v_init[0], Complex64::new(1.02, 0.0));
    }
}
