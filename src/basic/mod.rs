pub mod config;
pub mod dcpf;
pub(crate) mod dsbus_dv;
pub mod error;
pub(crate) mod jacobian;
pub mod newtonpf;
pub mod results;
pub mod session;
pub mod solver;
pub(crate) mod sparse;
pub mod system;

pub use newtonpf::newton_pf;
