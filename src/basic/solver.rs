//! Sparse LU factorization of the real systems built by the power flow: the
//! Newton-Raphson Jacobian and the DC susceptance matrix.
//!
//! Factorization has two explicit phases. The symbolic phase orders and
//! analyzes the sparsity pattern; the numeric phase factors the values. A
//! [`SparseLu`] keeps the symbolic context between calls, so consecutive
//! solves on the same pattern only pay for the numeric phase.

use std::time::{Duration, Instant};

use nalgebra_sparse::{CscMatrix, pattern::SparsityPattern};
use serde::Serialize;

use super::error::{PowerFlowError, Result};

#[cfg(feature = "faer")]
mod faer;
#[cfg(feature = "faer")]
pub use faer::*;

#[cfg(feature = "rsparse")]
mod rsparse;
#[cfg(feature = "rsparse")]
pub use rsparse::*;

#[cfg(feature = "rsparse")]
pub type DefaultSolver = RSparseSolver;

#[cfg(all(not(feature = "rsparse"), feature = "faer"))]
pub type DefaultSolver = FaerSolver;

/// A sparse LU backend operating on square CSC data with sorted row indices.
pub trait Solve {
    /// Symbolic analysis of the pattern `(col_ptr, row_idx)` of an `n × n`
    /// matrix. Discards any previous factorization.
    fn analyze(&mut self, n: usize, col_ptr: &[usize], row_idx: &[usize]) -> Result<()>;

    /// Numeric factorization reusing the last symbolic analysis.
    fn factor(&mut self, col_ptr: &[usize], row_idx: &[usize], values: &[f64]) -> Result<()>;

    /// Overwrites `b` with the solution of `A·x = b` for the last factored `A`.
    fn solve_in_place(&mut self, b: &mut [f64]) -> Result<()>;

    /// Drops both the symbolic and the numeric context.
    fn reset(&mut self);
}

/// Whether a factorization may reuse the previous symbolic analysis.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FactorMode {
    /// Analyze the pattern from scratch.
    #[default]
    Cold,
    /// Reuse the symbolic context if the pattern is unchanged.
    Warm,
}

/// Counters and cumulative durations of the factorization phases.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct SolverStats {
    pub symbolic: usize,
    pub numeric: usize,
    pub solves: usize,
    pub symbolic_time: Duration,
    pub numeric_time: Duration,
    pub solve_time: Duration,
}

/// Two-phase sparse LU handle around a [`Solve`] backend.
#[derive(Default)]
pub struct SparseLu<S: Solve = DefaultSolver> {
    backend: S,
    pattern: Option<SparsityPattern>,
    factored: bool,
    stats: SolverStats,
}

impl<S: Solve> std::fmt::Debug for SparseLu<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseLu")
            .field("analyzed", &self.pattern.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<S: Solve + Default> SparseLu<S> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: Solve> SparseLu<S> {
    pub fn with_backend(backend: S) -> Self {
        Self {
            backend,
            pattern: None,
            factored: false,
            stats: SolverStats::default(),
        }
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Whether a symbolic context is available for warm factorizations.
    pub fn is_analyzed(&self) -> bool {
        self.pattern.is_some()
    }

    /// Forgets the symbolic and numeric contexts. Counters are kept.
    pub fn reset(&mut self) {
        self.backend.reset();
        self.pattern = None;
        self.factored = false;
    }

    /// Factors `a`, analyzing its pattern first unless `mode` is warm and the
    /// pattern matches the previous analysis.
    pub fn factor(&mut self, a: &CscMatrix<f64>, mode: FactorMode) -> Result<()> {
        if a.nrows() != a.ncols() {
            return Err(PowerFlowError::SingularMatrix(format!(
                "matrix is not square ({}×{})",
                a.nrows(),
                a.ncols()
            )));
        }
        self.factored = false;
        let n = a.nrows();
        let reuse = mode == FactorMode::Warm && self.pattern.as_ref() == Some(a.pattern());
        if !reuse {
            if mode == FactorMode::Warm && self.pattern.is_some() {
                log::debug!("sparsity pattern changed, redoing symbolic analysis");
            }
            self.pattern = None;
            let start = Instant::now();
            self.backend.analyze(n, a.col_offsets(), a.row_indices())?;
            self.stats.symbolic += 1;
            self.stats.symbolic_time += start.elapsed();
            self.pattern = Some(a.pattern().clone());
        }
        let start = Instant::now();
        self.backend
            .factor(a.col_offsets(), a.row_indices(), a.values())?;
        self.stats.numeric += 1;
        self.stats.numeric_time += start.elapsed();
        self.factored = true;
        Ok(())
    }

    /// Solves with the last factorization, overwriting `b`.
    pub fn solve_factored(&mut self, b: &mut [f64]) -> Result<()> {
        let n = match (&self.pattern, self.factored) {
            (Some(p), true) => p.major_dim(),
            _ => {
                return Err(PowerFlowError::SingularMatrix(
                    "no valid factorization available".into(),
                ));
            }
        };
        if b.len() != n {
            return Err(PowerFlowError::topology(format!(
                "right-hand side has {} entries, matrix has {n} rows",
                b.len()
            )));
        }
        let start = Instant::now();
        self.backend.solve_in_place(b)?;
        self.stats.solves += 1;
        self.stats.solve_time += start.elapsed();
        if let Some(k) = b.iter().position(|x| !x.is_finite()) {
            return Err(PowerFlowError::SingularMatrix(format!(
                "non-finite solution component at index {k}"
            )));
        }
        Ok(())
    }

    /// Factors `a` and solves `a·x = b`, overwriting `b` with `x`.
    pub fn solve(&mut self, a: &CscMatrix<f64>, b: &mut [f64], mode: FactorMode) -> Result<()> {
        self.factor(a, mode)?;
        self.solve_factored(b)
    }
}
