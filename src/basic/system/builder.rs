use num_complex::Complex64;

use super::GridModel;
use super::elements::*;
use crate::basic::error::{PowerFlowError, Result, ensure_finite, ensure_positive};

/// Sequenced constructor for a [`GridModel`].
///
/// Buses come first, then any of the element kinds (each at most once), then
/// the slack buses, then [`GridBuilder::build`]. Every call consumes the
/// builder, so a rejected call never leaves a half-initialized model behind.
#[derive(Debug, Clone)]
pub struct GridBuilder {
    sn_mva: f64,
    buses: Option<Vec<Bus>>,
    lines: Option<Vec<Line>>,
    trafos: Option<Vec<Transformer>>,
    shunts: Option<Vec<Shunt>>,
    loads: Option<Vec<Load>>,
    gens: Option<Vec<Generator>>,
    slack: Option<Vec<SlackBus>>,
}

fn check_lengths(element: &str, lengths: &[(&str, usize)]) -> Result<usize> {
    let expected = lengths.first().map_or(0, |(_, n)| *n);
    for (name, n) in lengths {
        if *n != expected {
            return Err(PowerFlowError::topology(format!(
                "{element}: `{name}` has {n} entries, expected {expected}"
            )));
        }
    }
    Ok(expected)
}

fn check_bus(element: &str, name: &str, index: usize, bus: usize, n_bus: usize) -> Result<()> {
    if bus >= n_bus {
        return Err(PowerFlowError::topology(format!(
            "{element} {index}: `{name}` references bus {bus}, but only {n_bus} buses exist"
        )));
    }
    Ok(())
}

impl GridBuilder {
    pub(crate) fn new(sn_mva: f64) -> Self {
        Self {
            sn_mva,
            buses: None,
            lines: None,
            trafos: None,
            shunts: None,
            loads: None,
            gens: None,
            slack: None,
        }
    }

    /// Number of buses, failing when buses are missing or slack buses were
    /// already registered.
    fn element_stage(&self, element: &str) -> Result<usize> {
        let n_bus = self.buses.as_ref().map(Vec::len).ok_or_else(|| {
            PowerFlowError::topology(format!("{element} initialized before buses"))
        })?;
        if self.slack.is_some() {
            return Err(PowerFlowError::topology(format!(
                "{element} initialized after slack buses"
            )));
        }
        Ok(n_bus)
    }

    fn once<T>(slot: &Option<T>, element: &str) -> Result<()> {
        match slot {
            Some(_) => Err(PowerFlowError::topology(format!(
                "{element} initialized twice"
            ))),
            None => Ok(()),
        }
    }

    pub fn init_bus(mut self, vn_kv: &[f64]) -> Result<Self> {
        ensure_positive("grid", "sn_mva", 0, self.sn_mva)?;
        Self::once(&self.buses, "buses")?;
        if vn_kv.is_empty() {
            return Err(PowerFlowError::topology("a grid needs at least one bus"));
        }
        let buses = vn_kv
            .iter()
            .enumerate()
            .map(|(i, &vn_kv)| {
                ensure_positive("bus", "vn_kv", i, vn_kv)?;
                Ok(Bus { vn_kv })
            })
            .collect::<Result<Vec<_>>>()?;
        log::debug!("initialized {} buses", buses.len());
        self.buses = Some(buses);
        Ok(self)
    }

    /// Lines from per-unit series `r`, `x` and total charging admittance `h`.
    pub fn init_lines(
        mut self,
        r: &[f64],
        x: &[f64],
        h: &[Complex64],
        from_bus: &[usize],
        to_bus: &[usize],
    ) -> Result<Self> {
        let n_bus = self.element_stage("lines")?;
        Self::once(&self.lines, "lines")?;
        let n = check_lengths(
            "lines",
            &[
                ("r", r.len()),
                ("x", x.len()),
                ("h", h.len()),
                ("from_bus", from_bus.len()),
                ("to_bus", to_bus.len()),
            ],
        )?;
        let mut lines = Vec::with_capacity(n);
        for i in 0..n {
            check_bus("line", "from_bus", i, from_bus[i], n_bus)?;
            check_bus("line", "to_bus", i, to_bus[i], n_bus)?;
            if from_bus[i] == to_bus[i] {
                return Err(PowerFlowError::topology(format!(
                    "line {i} connects bus {} to itself",
                    from_bus[i]
                )));
            }
            check_series("line", i, r[i], x[i])?;
            ensure_finite("line", "h", i, h[i].re)?;
            ensure_finite("line", "h", i, h[i].im)?;
            lines.push(Line {
                from_bus: from_bus[i],
                to_bus: to_bus[i],
                r_pu: r[i],
                x_pu: x[i],
                h_pu: h[i],
                in_service: true,
            });
        }
        self.lines = Some(lines);
        Ok(self)
    }

    /// Transformers from per-unit parameters and tap state. A zero or
    /// non-finite tap step is kept and treated as "no tap changer".
    #[allow(clippy::too_many_arguments)]
    pub fn init_trafos(
        mut self,
        r: &[f64],
        x: &[f64],
        h: &[Complex64],
        tap_step_percent: &[f64],
        tap_pos: &[i32],
        tap_hv_side: &[bool],
        hv_bus: &[usize],
        lv_bus: &[usize],
    ) -> Result<Self> {
        let n_bus = self.element_stage("transformers")?;
        Self::once(&self.trafos, "transformers")?;
        let n = check_lengths(
            "transformers",
            &[
                ("r", r.len()),
                ("x", x.len()),
                ("h", h.len()),
                ("tap_step_percent", tap_step_percent.len()),
                ("tap_pos", tap_pos.len()),
                ("tap_hv_side", tap_hv_side.len()),
                ("hv_bus", hv_bus.len()),
                ("lv_bus", lv_bus.len()),
            ],
        )?;
        let mut trafos = Vec::with_capacity(n);
        for i in 0..n {
            check_bus("trafo", "hv_bus", i, hv_bus[i], n_bus)?;
            check_bus("trafo", "lv_bus", i, lv_bus[i], n_bus)?;
            if hv_bus[i] == lv_bus[i] {
                return Err(PowerFlowError::topology(format!(
                    "trafo {i} connects bus {} to itself",
                    hv_bus[i]
                )));
            }
            check_series("trafo", i, r[i], x[i])?;
            ensure_finite("trafo", "h", i, h[i].re)?;
            ensure_finite("trafo", "h", i, h[i].im)?;
            let trafo = Transformer {
                hv_bus: hv_bus[i],
                lv_bus: lv_bus[i],
                r_pu: r[i],
                x_pu: x[i],
                h_pu: h[i],
                tap_step_percent: tap_step_percent[i],
                tap_pos: tap_pos[i],
                tap_side: if tap_hv_side[i] { TapSide::HV } else { TapSide::LV },
                in_service: true,
            };
            check_ratio(i, &trafo)?;
            trafos.push(trafo);
        }
        self.trafos = Some(trafos);
        Ok(self)
    }

    pub fn init_shunts(mut self, p_mw: &[f64], q_mvar: &[f64], bus: &[usize]) -> Result<Self> {
        let n_bus = self.element_stage("shunts")?;
        Self::once(&self.shunts, "shunts")?;
        let n = check_lengths(
            "shunts",
            &[("p_mw", p_mw.len()), ("q_mvar", q_mvar.len()), ("bus", bus.len())],
        )?;
        let mut shunts = Vec::with_capacity(n);
        for i in 0..n {
            check_bus("shunt", "bus", i, bus[i], n_bus)?;
            ensure_finite("shunt", "p_mw", i, p_mw[i])?;
            ensure_finite("shunt", "q_mvar", i, q_mvar[i])?;
            shunts.push(Shunt {
                bus: bus[i],
                p_mw: p_mw[i],
                q_mvar: q_mvar[i],
                in_service: true,
            });
        }
        self.shunts = Some(shunts);
        Ok(self)
    }

    pub fn init_loads(mut self, p_mw: &[f64], q_mvar: &[f64], bus: &[usize]) -> Result<Self> {
        let n_bus = self.element_stage("loads")?;
        Self::once(&self.loads, "loads")?;
        let n = check_lengths(
            "loads",
            &[("p_mw", p_mw.len()), ("q_mvar", q_mvar.len()), ("bus", bus.len())],
        )?;
        let mut loads = Vec::with_capacity(n);
        for i in 0..n {
            check_bus("load", "bus", i, bus[i], n_bus)?;
            ensure_finite("load", "p_mw", i, p_mw[i])?;
            ensure_finite("load", "q_mvar", i, q_mvar[i])?;
            loads.push(Load {
                bus: bus[i],
                p_mw: p_mw[i],
                q_mvar: q_mvar[i],
                in_service: true,
            });
        }
        self.loads = Some(loads);
        Ok(self)
    }

    /// Voltage-controlling generators. The reactive range only weights how a
    /// bus's reactive output is shared between its generators.
    pub fn init_generators(
        mut self,
        p_mw: &[f64],
        vm_pu: &[f64],
        min_q_mvar: &[f64],
        max_q_mvar: &[f64],
        bus: &[usize],
    ) -> Result<Self> {
        let n_bus = self.element_stage("generators")?;
        Self::once(&self.gens, "generators")?;
        let n = check_lengths(
            "generators",
            &[
                ("p_mw", p_mw.len()),
                ("vm_pu", vm_pu.len()),
                ("min_q_mvar", min_q_mvar.len()),
                ("max_q_mvar", max_q_mvar.len()),
                ("bus", bus.len()),
            ],
        )?;
        let mut gens = Vec::with_capacity(n);
        for i in 0..n {
            check_bus("gen", "bus", i, bus[i], n_bus)?;
            ensure_finite("gen", "p_mw", i, p_mw[i])?;
            ensure_positive("gen", "vm_pu", i, vm_pu[i])?;
            ensure_finite("gen", "min_q_mvar", i, min_q_mvar[i])?;
            ensure_finite("gen", "max_q_mvar", i, max_q_mvar[i])?;
            if min_q_mvar[i] > max_q_mvar[i] {
                return Err(PowerFlowError::invalid(
                    "gen",
                    "min_q_mvar",
                    i,
                    format!("{} exceeds max_q_mvar {}", min_q_mvar[i], max_q_mvar[i]),
                ));
            }
            gens.push(Generator {
                bus: bus[i],
                p_mw: p_mw[i],
                vm_pu: vm_pu[i],
                min_q_mvar: min_q_mvar[i],
                max_q_mvar: max_q_mvar[i],
                in_service: true,
            });
        }
        self.gens = Some(gens);
        Ok(self)
    }

    /// Registers the slack buses. The first one is the angle reference.
    pub fn add_slack_buses(
        mut self,
        bus: &[usize],
        vm_pu: &[f64],
        va_degree: &[f64],
    ) -> Result<Self> {
        let n_bus = self.element_stage("slack buses")?;
        let n = check_lengths(
            "slack buses",
            &[("bus", bus.len()), ("vm_pu", vm_pu.len()), ("va_degree", va_degree.len())],
        )?;
        if n == 0 {
            return Err(PowerFlowError::topology("at least one slack bus is required"));
        }
        let mut slack: Vec<SlackBus> = Vec::with_capacity(n);
        for i in 0..n {
            check_bus("slack", "bus", i, bus[i], n_bus)?;
            if slack.iter().any(|s| s.bus == bus[i]) {
                return Err(PowerFlowError::topology(format!(
                    "bus {} registered as slack twice",
                    bus[i]
                )));
            }
            ensure_positive("slack", "vm_pu", i, vm_pu[i])?;
            ensure_finite("slack", "va_degree", i, va_degree[i])?;
            slack.push(SlackBus {
                bus: bus[i],
                vm_pu: vm_pu[i],
                va_degree: va_degree[i],
            });
        }
        self.slack = Some(slack);
        Ok(self)
    }

    pub fn build(self) -> Result<GridModel> {
        let buses = self
            .buses
            .ok_or_else(|| PowerFlowError::topology("grid has no buses"))?;
        let slack = self
            .slack
            .ok_or_else(|| PowerFlowError::topology("grid has no slack bus"))?;
        let gens = self.gens.unwrap_or_default();
        let bus_types = classify_buses(buses.len(), &slack, &gens);
        log::debug!(
            "built grid: {} buses, {} slack, {} PV, {} PQ",
            buses.len(),
            slack.len(),
            bus_types.of(BusType::PV).len(),
            bus_types.of(BusType::PQ).len()
        );
        Ok(GridModel {
            sn_mva: self.sn_mva,
            buses,
            lines: self.lines.unwrap_or_default(),
            trafos: self.trafos.unwrap_or_default(),
            shunts: self.shunts.unwrap_or_default(),
            loads: self.loads.unwrap_or_default(),
            gens,
            slack,
            bus_types,
            revision: 0,
            y_bus: Default::default(),
        })
    }
}

fn check_series(element: &'static str, index: usize, r: f64, x: f64) -> Result<()> {
    ensure_finite(element, "r", index, r)?;
    ensure_finite(element, "x", index, x)?;
    if r == 0.0 && x == 0.0 {
        return Err(PowerFlowError::invalid(
            element,
            "x",
            index,
            "series impedance is zero",
        ));
    }
    Ok(())
}

pub(crate) fn check_ratio(index: usize, trafo: &Transformer) -> Result<()> {
    let ratio = trafo.ratio();
    if ratio > 0.0 && ratio.is_finite() {
        Ok(())
    } else {
        Err(PowerFlowError::invalid(
            "trafo",
            "tap_pos",
            index,
            format!("tap position {} gives ratio {ratio}", trafo.tap_pos),
        ))
    }
}
