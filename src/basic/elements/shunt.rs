use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::default_true;

/// Fixed shunt, given by its consumption at 1 p.u. voltage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shunt {
    pub bus: usize,
    #[serde(default)]
    pub p_mw: f64,
    pub q_mvar: f64,
    #[serde(default = "default_true")]
    pub in_service: bool,
}

impl Shunt {
    pub fn new(bus: usize, p_mw: f64, q_mvar: f64) -> Self {
        Shunt {
            bus,
            p_mw,
            q_mvar,
            in_service: true,
        }
    }

    /// Per unit admittance to ground; positive `q_mvar` is inductive.
    pub fn admittance(&self, sn_mva: f64) -> Complex64 {
        Complex64::new(self.p_mw, -self.q_mvar) / sn_mva
    }
}
