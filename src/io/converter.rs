//! Conversion of physical element ratings into the per-unit parameters
//! consumed by [`GridBuilder`](crate::prelude::GridBuilder).
//!
//! Line parameters are given per kilometre in ohms, nanofarads and microsiemens;
//! transformer parameters are given as rated values and percentages of the
//! rated impedance. Every output is expressed on the system base `sn_mva` and
//! the nominal voltage of the relevant bus.

use std::f64::consts::PI;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::basic::error::{PowerFlowError, Result, ensure_finite, ensure_positive};

/// Physical line data, per kilometre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineInput {
    pub r_ohm_per_km: f64,
    pub x_ohm_per_km: f64,
    pub c_nf_per_km: f64,
    pub g_us_per_km: f64,
    pub length_km: f64,
    pub parallel: u32,
}

/// Rated transformer data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafoInput {
    pub vn_hv_kv: f64,
    pub vn_lv_kv: f64,
    pub vk_percent: f64,
    pub vkr_percent: f64,
    pub sn_mva: f64,
    pub pfe_kw: f64,
    pub i0_percent: f64,
    pub parallel: u32,
}

/// Per-unit branch parameters, positionally aligned with the inputs.
///
/// `h` is the total shunt admittance of the branch (charging for lines,
/// magnetizing for transformers).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchPu {
    pub r: Vec<f64>,
    pub x: Vec<f64>,
    pub h: Vec<Complex64>,
}

impl BranchPu {
    fn with_capacity(n: usize) -> Self {
        Self {
            r: Vec::with_capacity(n),
            x: Vec::with_capacity(n),
            h: Vec::with_capacity(n),
        }
    }
    pub fn len(&self) -> usize {
        self.r.len()
    }
    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }
}

/// Converts physical element data to per-unit admittance parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementConverter {
    sn_mva: f64,
    f_hz: f64,
}

impl ElementConverter {
    pub fn new(sn_mva: f64, f_hz: f64) -> Result<Self> {
        ensure_positive("system", "sn_mva", 0, sn_mva)?;
        ensure_positive("system", "f_hz", 0, f_hz)?;
        Ok(Self { sn_mva, f_hz })
    }

    pub fn sn_mva(&self) -> f64 {
        self.sn_mva
    }

    pub fn f_hz(&self) -> f64 {
        self.f_hz
    }

    /// Converts lines to per-unit `r`, `x` and total charging admittance `h`.
    ///
    /// The impedance base is taken from the from-side nominal voltage.
    pub fn line_params(
        &self,
        lines: &[LineInput],
        vn_from_kv: &[f64],
        vn_to_kv: &[f64],
    ) -> Result<BranchPu> {
        if lines.len() != vn_from_kv.len() || lines.len() != vn_to_kv.len() {
            return Err(PowerFlowError::topology(format!(
                "line conversion: {} lines but {} from-side and {} to-side voltages",
                lines.len(),
                vn_from_kv.len(),
                vn_to_kv.len()
            )));
        }
        let wbase = 2.0 * PI * self.f_hz;
        let mut out = BranchPu::with_capacity(lines.len());
        for (idx, (line, (&vn_f, &vn_t))) in lines
            .iter()
            .zip(vn_from_kv.iter().zip(vn_to_kv))
            .enumerate()
        {
            check_line(idx, line, vn_f, vn_t)?;
            if (vn_f - vn_t).abs() > 1e-6 * vn_f {
                log::debug!(
                    "line {idx} joins buses at {vn_f} kV and {vn_t} kV; \
                     using the from side as base"
                );
            }
            let z_base = vn_f * vn_f / self.sn_mva;
            let parallel = line.parallel as f64;
            let r = line.r_ohm_per_km * line.length_km / parallel / z_base;
            let x = line.x_ohm_per_km * line.length_km / parallel / z_base;
            if r == 0.0 && x == 0.0 {
                return Err(PowerFlowError::invalid(
                    "line",
                    "x_ohm_per_km",
                    idx,
                    "series impedance is zero",
                ));
            }
            let g = line.g_us_per_km * 1e-6;
            let b = wbase * line.c_nf_per_km * 1e-9;
            let h = Complex64::new(g, b) * (line.length_km * parallel * z_base);
            out.r.push(r);
            out.x.push(x);
            out.h.push(h);
        }
        Ok(out)
    }

    /// Converts transformers to per-unit `r`, `x` and magnetizing admittance `h`,
    /// referred to the low-voltage bus.
    pub fn trafo_params(&self, trafos: &[TrafoInput], vn_lv_bus_kv: &[f64]) -> Result<BranchPu> {
        if trafos.len() != vn_lv_bus_kv.len() {
            return Err(PowerFlowError::topology(format!(
                "trafo conversion: {} transformers but {} lv bus voltages",
                trafos.len(),
                vn_lv_bus_kv.len()
            )));
        }
        let mut out = BranchPu::with_capacity(trafos.len());
        for (idx, (t, &vn_lv_bus)) in trafos.iter().zip(vn_lv_bus_kv).enumerate() {
            check_trafo(idx, t, vn_lv_bus)?;
            let parallel = t.parallel as f64;

            let tap_lv = (t.vn_lv_kv / vn_lv_bus).powi(2) * self.sn_mva;
            let z_sc = t.vk_percent * 0.01 / t.sn_mva * tap_lv;
            let r_sc = t.vkr_percent * 0.01 / t.sn_mva * tap_lv;
            let x_sc = (z_sc * z_sc - r_sc * r_sc).sqrt();

            let base = vn_lv_bus * vn_lv_bus / self.sn_mva;
            let vnl_squared = t.vn_lv_kv * t.vn_lv_kv;
            let g = t.pfe_kw / (1000.0 * vnl_squared) * base;
            let b_sq = (t.i0_percent * 0.01 * t.sn_mva).powi(2) - (t.pfe_kw * 0.001).powi(2);
            let b = b_sq.max(0.0).sqrt() * base / vnl_squared;

            out.r.push(r_sc / parallel);
            out.x.push(x_sc / parallel);
            out.h.push(Complex64::new(g, -b) * parallel);
        }
        Ok(out)
    }
}

fn check_line(idx: usize, line: &LineInput, vn_f: f64, vn_t: f64) -> Result<()> {
    const E: &str = "line";
    ensure_finite(E, "r_ohm_per_km", idx, line.r_ohm_per_km)?;
    ensure_finite(E, "x_ohm_per_km", idx, line.x_ohm_per_km)?;
    ensure_finite(E, "c_nf_per_km", idx, line.c_nf_per_km)?;
    ensure_finite(E, "g_us_per_km", idx, line.g_us_per_km)?;
    ensure_positive(E, "length_km", idx, line.length_km)?;
    ensure_positive(E, "vn_from_kv", idx, vn_f)?;
    ensure_positive(E, "vn_to_kv", idx, vn_t)?;
    if line.r_ohm_per_km < 0.0 {
        return Err(PowerFlowError::invalid(E, "r_ohm_per_km", idx, "must not be negative"));
    }
    if line.parallel == 0 {
        return Err(PowerFlowError::invalid(E, "parallel", idx, "at least one circuit is required"));
    }
    Ok(())
}

fn check_trafo(idx: usize, t: &TrafoInput, vn_lv_bus: f64) -> Result<()> {
    const E: &str = "trafo";
    ensure_positive(E, "vn_hv_kv", idx, t.vn_hv_kv)?;
    ensure_positive(E, "vn_lv_kv", idx, t.vn_lv_kv)?;
    ensure_positive(E, "vn_lv_bus_kv", idx, vn_lv_bus)?;
    ensure_positive(E, "sn_mva", idx, t.sn_mva)?;
    ensure_positive(E, "vk_percent", idx, t.vk_percent)?;
    ensure_finite(E, "vkr_percent", idx, t.vkr_percent)?;
    ensure_finite(E, "pfe_kw", idx, t.pfe_kw)?;
    ensure_finite(E, "i0_percent", idx, t.i0_percent)?;
    if t.vkr_percent < 0.0 || t.vkr_percent > t.vk_percent {
        return Err(PowerFlowError::invalid(
            E,
            "vkr_percent",
            idx,
            format!("must lie in [0, vk_percent = {}], got {}", t.vk_percent, t.vkr_percent),
        ));
    }
    if t.pfe_kw < 0.0 {
        return Err(PowerFlowError::invalid(E, "pfe_kw", idx, "must not be negative"));
    }
    if t.i0_percent < 0.0 {
        return Err(PowerFlowError::invalid(E, "i0_percent", idx, "must not be negative"));
    }
    if t.parallel == 0 {
        return Err(PowerFlowError::invalid(E, "parallel", idx, "at least one unit is required"));
    }
    Ok(())
}
