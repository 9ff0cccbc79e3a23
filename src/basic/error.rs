use thiserror::Error;

/// Errors raised while building a grid model or running a power flow.
///
/// A non-converged Newton-Raphson run is not an error: it is reported through
/// [`ConvergenceStatus::MaxIterationsExceeded`](crate::prelude::ConvergenceStatus)
/// together with the last voltage iterate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PowerFlowError {
    /// Malformed or non-physical element parameter.
    #[error("invalid parameter `{name}` for {element} {index}: {reason}")]
    InvalidParameter {
        element: &'static str,
        name: &'static str,
        index: usize,
        reason: String,
    },

    /// Inconsistent array lengths, out-of-range bus references, missing slack
    /// or an initialization call made out of order.
    #[error("topology error: {0}")]
    Topology(String),

    /// Zero pivot or non-finite values during a sparse factorization.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// The Newton-Raphson mismatch became non-finite.
    #[error("power flow diverged after {iterations} iterations")]
    Diverged { iterations: usize },
}

pub type Result<T> = std::result::Result<T, PowerFlowError>;

impl PowerFlowError {
    pub(crate) fn invalid(
        element: &'static str,
        name: &'static str,
        index: usize,
        reason: impl Into<String>,
    ) -> Self {
        PowerFlowError::InvalidParameter {
            element,
            name,
            index,
            reason: reason.into(),
        }
    }

    pub(crate) fn topology(msg: impl Into<String>) -> Self {
        PowerFlowError::Topology(msg.into())
    }
}

/// Rejects NaN and infinities for a named parameter.
pub(crate) fn ensure_finite(
    element: &'static str,
    name: &'static str,
    index: usize,
    value: f64,
) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PowerFlowError::invalid(
            element,
            name,
            index,
            format!("expected a finite value, got {value}"),
        ))
    }
}

/// Rejects values that are not strictly positive (NaN included).
pub(crate) fn ensure_positive(
    element: &'static str,
    name: &'static str,
    index: usize,
    value: f64,
) -> Result<()> {
    ensure_finite(element, name, index, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(PowerFlowError::invalid(
            element,
            name,
            index,
            format!("must be positive, got {value}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_checks() {
        assert!(ensure_positive("line", "length_km", 0, 1.5).is_ok());
        assert!(ensure_positive("line", "length_km", 0, 0.0).is_err());
        assert!(ensure_positive("line", "length_km", 0, f64::NAN).is_err());
        assert!(ensure_finite("trafo", "vk_percent", 3, f64::INFINITY).is_err());
    }

    #[test]
    fn test_error_message() {
        let err = PowerFlowError::invalid("trafo", "sn_mva", 2, "must be positive, got 0");
        assert_eq!(
            err.to_string(),
            "invalid parameter `sn_mva` for trafo 2: must be positive, got 0"
        );
    }
}
