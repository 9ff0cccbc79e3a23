//! Network model: element collections, bus classification and admittance
//! matrix assembly.

mod admittance;
mod builder;
pub mod elements;
mod grid;
mod matrices;

pub use admittance::{BranchAdmittance, Port2};
pub use builder::GridBuilder;
pub use elements::{BusType, BusTypes};
pub use grid::GridModel;
pub use matrices::PowerFlowMat;
