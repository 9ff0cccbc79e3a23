use std::time::{Duration, Instant};

use nalgebra::DVector;
use num_complex::Complex64;
use serde::Serialize;

use super::{
    config::{PowerFlowConfig, StartMode},
    dcpf::dc_init,
    error::Result,
    newtonpf::{ConvergenceStatus, newton_pf},
    results::{NetworkResults, extract_results},
    solver::{DefaultSolver, FactorMode, Solve, SolverStats, SparseLu},
    system::GridModel,
};

/// Lifecycle of a [`PowerFlow`] session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// The model may have changed since the last solve.
    Built,
    /// The last call to [`PowerFlow::solve`] produced a result for the
    /// current model.
    Solved,
}

/// Wall-clock time spent in each phase of a solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Timings {
    pub options: Duration,
    pub model_build: Duration,
    pub ybus_build: Duration,
    pub dc_init: Duration,
    pub ac_solve: Duration,
    pub result_extraction: Duration,
    pub total: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct PowerFlowResult {
    /// Bus voltages in p.u., in bus order.
    pub v: DVector<Complex64>,
    pub converged: bool,
    pub status: ConvergenceStatus,
    pub iterations: usize,
    pub max_mismatch: f64,
    /// Start actually used, after any fallback.
    pub start: StartMode,
    /// Cumulative counters of the session's factorizations.
    pub stats: SolverStats,
    pub timings: Timings,
    pub results: NetworkResults,
}

/// A power flow session owning the grid, the factorization context and the
/// last voltage solution.
///
/// ```no_run
/// # use gridflow::prelude::*;
/// # fn run(grid: GridModel) -> gridflow::prelude::Result<()> {
/// let mut pf = PowerFlow::<DefaultSolver>::new(grid);
/// pf.solve(&PowerFlowConfig::new(StartMode::Dc))?;
/// pf.grid_mut().set_load_pq(0, 12.0, 3.0)?;
/// let res = pf.solve(&PowerFlowConfig::new(StartMode::Warm))?;
/// assert!(res.converged);
/// # Ok(())
/// # }
/// ```
pub struct PowerFlow<S: Solve = DefaultSolver> {
    grid: GridModel,
    lu: SparseLu<S>,
    /// Last converged voltages with the structure revision they belong to.
    warm: Option<(u64, DVector<Complex64>)>,
    state: SessionState,
    last: Option<PowerFlowResult>,
}

impl<S: Solve> std::fmt::Debug for PowerFlow<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerFlow")
            .field("n_bus", &self.grid.n_bus())
            .field("state", &self.state)
            .field("lu", &self.lu)
            .finish()
    }
}

impl<S: Solve + Default> PowerFlow<S> {
    pub fn new(grid: GridModel) -> Self {
        Self {
            grid,
            lu: SparseLu::new(),
            warm: None,
            state: SessionState::Built,
            last: None,
        }
    }

    pub fn grid(&self) -> &GridModel {
        &self.grid
    }

    /// Gives access to the setters. The session returns to
    /// [`SessionState::Built`]; the last voltages stay available for a warm
    /// start.
    pub fn grid_mut(&mut self) -> &mut GridModel {
        self.state = SessionState::Built;
        &mut self.grid
    }

    pub fn into_grid(self) -> GridModel {
        self.grid
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Result of the last solve, if the model has not changed since.
    pub fn result(&self) -> Option<&PowerFlowResult> {
        match self.state {
            SessionState::Solved => self.last.as_ref(),
            SessionState::Built => None,
        }
    }

    pub fn solver_stats(&self) -> &SolverStats {
        self.lu.stats()
    }

    /// Runs options → matrices → optional DC start → Newton-Raphson →
    /// results.
    ///
    /// A run that hits the iteration bound still returns `Ok`, flagged as not
    /// converged. Singular or diverging runs return `Err` and leave the
    /// session in [`SessionState::Built`].
    pub fn solve(&mut self, config: &PowerFlowConfig) -> Result<&PowerFlowResult> {
        let total = Instant::now();
        let mut timings = Timings::default();
        self.state = SessionState::Built;

        let t = Instant::now();
        let cfg = config.resolve()?;
        timings.options = t.elapsed();

        let t = Instant::now();
        self.grid.y_bus();
        timings.ybus_build = t.elapsed();

        let t = Instant::now();
        let mat = self.grid.prepare_matrices();
        timings.model_build = t.elapsed();
        log::debug!(
            "solving {} buses ({} PV, {} PQ, {} slack) with {:?} start",
            mat.n_bus(),
            mat.npv,
            mat.npq,
            mat.n_slack(),
            cfg.start
        );

        let revision = self.grid.structure_revision();
        let (start, v0, mode) = match (cfg.start, &self.warm) {
            (StartMode::Warm, Some((rev, v))) if *rev == revision => {
                // keep the previous angles, pick up setpoint changes
                let mut v0 = mat.permute(v);
                for k in 0..mat.npv {
                    v0[k] = Complex64::from_polar(mat.v_init[k].norm(), v0[k].arg());
                }
                for k in mat.npv + mat.npq..mat.n_bus() {
                    v0[k] = mat.v_init[k];
                }
                (StartMode::Warm, v0, FactorMode::Warm)
            }
            (StartMode::Warm, _) => {
                log::warn!(
                    "no warm start available for structure revision {revision}, using flat start"
                );
                (StartMode::Flat, mat.v_init.clone(), FactorMode::Cold)
            }
            (StartMode::Dc, _) => {
                let t = Instant::now();
                let p_bus = mat.permute(&self.grid.p_bus_dc());
                let v0 = dc_init::<S>(&mat, &p_bus)
                    .inspect_err(|e| log::warn!("DC initialization failed: {e}"))?;
                timings.dc_init = t.elapsed();
                (StartMode::Dc, v0, FactorMode::Cold)
            }
            (StartMode::Flat, _) => (StartMode::Flat, mat.v_init.clone(), FactorMode::Cold),
        };

        let t = Instant::now();
        let solution = newton_pf(
            &mat.y_bus,
            &mat.s_bus,
            &v0,
            mat.npv,
            mat.npq,
            cfg.tol,
            cfg.max_it,
            mode,
            &mut self.lu,
        )
        .inspect_err(|e| log::warn!("AC power flow failed: {e}"))?;
        timings.ac_solve = t.elapsed();

        let v = mat.unpermute(&solution.v);
        let converged = solution.status == ConvergenceStatus::Converged;
        if converged {
            self.warm = Some((revision, v.clone()));
        }

        let t = Instant::now();
        let results = extract_results(&self.grid, &v);
        timings.result_extraction = t.elapsed();
        timings.total = total.elapsed();

        log::debug!(
            "power flow {:?} after {} iterations, max mismatch {:.3e}, {:?}",
            solution.status,
            solution.iterations,
            solution.max_mismatch,
            timings.total
        );

        self.state = SessionState::Solved;
        Ok(self.last.insert(PowerFlowResult {
            v,
            converged,
            status: solution.status,
            iterations: solution.iterations,
            max_mismatch: solution.max_mismatch,
            start,
            stats: *self.lu.stats(),
            timings,
            results,
        }))
    }
}
