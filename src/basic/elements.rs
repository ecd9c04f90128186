//! Typed records for the electrical elements of a grid.
//!
//! All records carry their bus connectivity and an in-service flag. Power
//! setpoints are stored in physical units (MW / MVAr) and converted to per
//! unit at assembly time; impedances of branches are already per unit on the
//! system base.

pub mod bus;
pub mod generator;
pub mod line;
pub mod load;
pub mod sgen;
pub mod shunt;
pub mod trans;

pub use bus::Bus;
pub use generator::Generator;
pub use line::Line;
pub use load::{Load, Storage};
pub use sgen::StaticGenerator;
pub use shunt::Shunt;
pub use trans::Transformer;

use num_complex::Complex64;

pub(crate) fn default_true() -> bool {
    true
}

/// Elements connected to a single bus.
pub trait BusElement {
    fn bus(&self) -> usize;
    fn set_bus(&mut self, bus: usize);
    fn in_service(&self) -> bool;
    fn set_in_service(&mut self, status: bool);
}

/// Elements that inject (or absorb) complex power at their bus.
pub trait Injector: BusElement {
    /// Injection seen by the network in MVA; consumers return a negated value.
    fn injection_mva(&self) -> Complex64;
    fn set_p_mw(&mut self, p_mw: f64);
    fn set_q_mvar(&mut self, q_mvar: f64);
}

/// Two-port π-model of a branch, per unit on the system base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchTwoPort {
    pub yff: Complex64,
    pub yft: Complex64,
    pub ytf: Complex64,
    pub ytt: Complex64,
}

/// Elements connecting two buses.
pub trait Branch {
    fn from_bus(&self) -> usize;
    fn to_bus(&self) -> usize;
    fn set_from_bus(&mut self, bus: usize);
    fn set_to_bus(&mut self, bus: usize);
    fn in_service(&self) -> bool;
    fn set_in_service(&mut self, status: bool);
    fn two_port(&self) -> BranchTwoPort;
}

macro_rules! impl_bus_element {
    ($($t:ty),*) => {
        $(impl BusElement for $t {
            fn bus(&self) -> usize {
                self.bus
            }
            fn set_bus(&mut self, bus: usize) {
                self.bus = bus;
            }
            fn in_service(&self) -> bool {
                self.in_service
            }
            fn set_in_service(&mut self, status: bool) {
                self.in_service = status;
            }
        })*
    };
}
impl_bus_element!(Load, Storage, Generator, StaticGenerator, Shunt);
