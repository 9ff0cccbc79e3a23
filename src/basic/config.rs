use serde::{Deserialize, Serialize};

use super::error::{PowerFlowError, Result};

/// Default convergence tolerance on the largest mismatch component (p.u.).
pub const DEFAULT_TOL: f64 = 1e-8;
/// Default bound on Newton-Raphson iterations.
pub const DEFAULT_MAX_IT: usize = 10;

/// How the initial voltage vector of a solve is chosen.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartMode {
    /// 1.0∠0° on PQ buses, setpoint magnitudes on PV and slack buses.
    #[default]
    Flat,
    /// Flat magnitudes with angles from a DC power flow.
    Dc,
    /// Previous solution and symbolic factorization.
    Warm,
}

/// Power flow options, such as the start mode, maximum iterations and
/// convergence tolerance.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PowerFlowConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_it: Option<usize>, // Maximum number of iterations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tol: Option<f64>, // Tolerance for convergence
    #[serde(default)]
    pub start: StartMode,
}

/// Options after defaults have been applied and values checked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedConfig {
    pub max_it: usize,
    pub tol: f64,
    pub start: StartMode,
}

impl PowerFlowConfig {
    pub fn new(start: StartMode) -> Self {
        Self {
            start,
            ..Default::default()
        }
    }

    pub fn with_max_it(mut self, max_it: usize) -> Self {
        self.max_it = Some(max_it);
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = Some(tol);
        self
    }

    /// Parses options from a JSON document such as
    /// `{"max_it": 20, "tol": 1e-8, "start": "dc"}`.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| PowerFlowError::InvalidParameter {
            element: "config",
            name: "json",
            index: 0,
            reason: e.to_string(),
        })
    }

    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let max_it = self.max_it.unwrap_or(DEFAULT_MAX_IT);
        let tol = self.tol.unwrap_or(DEFAULT_TOL);
        if max_it == 0 {
            return Err(PowerFlowError::invalid(
                "config",
                "max_it",
                0,
                "at least one iteration is required",
            ));
        }
        if !(tol.is_finite() && tol > 0.0) {
            return Err(PowerFlowError::invalid(
                "config",
                "tol",
                0,
                format!("must be positive and finite, got {tol}"),
            ));
        }
        Ok(ResolvedConfig {
            max_it,
            tol,
            start: self.start,
        })
    }
}
