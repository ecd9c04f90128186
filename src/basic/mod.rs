pub(crate) mod dsbus_dv;
pub(crate) mod gauss_seidel;
pub(crate) mod newtonpf;

pub mod elements;
pub mod error;
pub mod powerflow;
pub mod solver;
pub(crate) mod sparse;
pub mod system;
