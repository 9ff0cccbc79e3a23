mod basic;
pub mod io;
pub mod testcases;
pub mod prelude {
    use crate::basic;
    pub use crate::io::converter::{BranchPu, ElementConverter, LineInput, TrafoInput};
    pub use basic::*;

    pub use basic::{
        config::{PowerFlowConfig, StartMode},
        dcpf::dc_init,
        error::{PowerFlowError, Result},
        newtonpf::{ConvergenceStatus, NewtonSolution},
        results::{NetworkResults, extract_results},
        session::{PowerFlow, PowerFlowResult, SessionState, Timings},
        solver::{DefaultSolver, FactorMode, Solve, SolverStats, SparseLu},
        system::{BusType, GridBuilder, GridModel, PowerFlowMat},
    };
}
