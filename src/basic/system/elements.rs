//! Element collections owned by a [`GridModel`](super::GridModel).
//!
//! All power quantities are stored in MW / MVAr as given by the caller and
//! converted to per-unit on the system base when the injection vector or the
//! admittance matrix is assembled. Branch parameters are already per-unit.

use derive_more::{Deref, Display};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Classification of a bus for the power flow equations.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusType {
    /// Fixed voltage magnitude and angle.
    Slack,
    /// Fixed active power and voltage magnitude.
    PV,
    /// Fixed active and reactive power.
    PQ,
}

/// Authoritative per-bus classification, indexed by bus id.
#[derive(Debug, Clone, Default, PartialEq, Deref, Serialize)]
pub struct BusTypes(pub(crate) Vec<BusType>);

impl BusTypes {
    /// Bus ids of the given kind in ascending order.
    pub fn of(&self, kind: BusType) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, t)| (*t == kind).then_some(i))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bus {
    pub vn_kv: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub from_bus: usize,
    pub to_bus: usize,
    pub r_pu: f64,
    pub x_pu: f64,
    /// Total charging admittance, split evenly between both ends.
    pub h_pu: Complex64,
    pub in_service: bool,
}

/// Side of the transformer that carries the tap changer.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapSide {
    HV,
    LV,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transformer {
    pub hv_bus: usize,
    pub lv_bus: usize,
    pub r_pu: f64,
    pub x_pu: f64,
    /// Magnetizing admittance, split evenly between both ends.
    pub h_pu: Complex64,
    pub tap_step_percent: f64,
    pub tap_pos: i32,
    pub tap_side: TapSide,
    pub in_service: bool,
}

impl Transformer {
    /// Off-nominal ratio seen from the high-voltage side.
    ///
    /// A zero or non-finite step means the transformer has no tap changer.
    pub fn ratio(&self) -> f64 {
        if self.tap_step_percent == 0.0 || !self.tap_step_percent.is_finite() {
            return 1.0;
        }
        let sign = match self.tap_side {
            TapSide::HV => 1.0,
            TapSide::LV => -1.0,
        };
        1.0 + 0.01 * self.tap_step_percent * self.tap_pos as f64 * sign
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shunt {
    pub bus: usize,
    pub p_mw: f64,
    pub q_mvar: f64,
    pub in_service: bool,
}

impl Shunt {
    /// Constant admittance drawing `p_mw + j·q_mvar` at 1.0 p.u. voltage.
    pub fn admittance_pu(&self, sn_mva: f64) -> Complex64 {
        Complex64::new(self.p_mw, -self.q_mvar) / sn_mva
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Load {
    pub bus: usize,
    pub p_mw: f64,
    pub q_mvar: f64,
    pub in_service: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generator {
    pub bus: usize,
    pub p_mw: f64,
    pub vm_pu: f64,
    pub min_q_mvar: f64,
    pub max_q_mvar: f64,
    pub in_service: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlackBus {
    pub bus: usize,
    pub vm_pu: f64,
    pub va_degree: f64,
}

/// Recomputes the bus classification from slack membership and in-service
/// generators. Slack wins over PV; everything else is PQ.
pub(crate) fn classify_buses(n_bus: usize, slack: &[SlackBus], gens: &[Generator]) -> BusTypes {
    let mut types = vec![BusType::PQ; n_bus];
    for g in gens.iter().filter(|g| g.in_service) {
        types[g.bus] = BusType::PV;
    }
    for s in slack {
        types[s.bus] = BusType::Slack;
    }
    BusTypes(types)
}
