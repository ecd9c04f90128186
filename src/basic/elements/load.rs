use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{Injector, default_true};

/// Constant power consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Load {
    pub bus: usize,
    pub p_mw: f64,
    #[serde(default)]
    pub q_mvar: f64,
    #[serde(default = "default_true")]
    pub in_service: bool,
}

impl Load {
    pub fn new(bus: usize, p_mw: f64, q_mvar: f64) -> Self {
        Load {
            bus,
            p_mw,
            q_mvar,
            in_service: true,
        }
    }
}

/// Storage unit modelled as a consumer; positive `p_mw` means charging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storage {
    pub bus: usize,
    pub p_mw: f64,
    #[serde(default)]
    pub q_mvar: f64,
    #[serde(default = "default_true")]
    pub in_service: bool,
}

impl Storage {
    pub fn new(bus: usize, p_mw: f64, q_mvar: f64) -> Self {
        Storage {
            bus,
            p_mw,
            q_mvar,
            in_service: true,
        }
    }
}

impl Injector for Load {
    fn injection_mva(&self) -> Complex64 {
        -Complex64::new(self.p_mw, self.q_mvar)
    }
    fn set_p_mw(&mut self, p_mw: f64) {
        self.p_mw = p_mw;
    }
    fn set_q_mvar(&mut self, q_mvar: f64) {
        self.q_mvar = q_mvar;
    }
}

impl Injector for Storage {
    fn injection_mva(&self) -> Complex64 {
        -Complex64::new(self.p_mw, self.q_mvar)
    }
    fn set_p_mw(&mut self, p_mw: f64) {
        self.p_mw = p_mw;
    }
    fn set_q_mvar(&mut self, q_mvar: f64) {
        self.q_mvar = q_mvar;
    }
}
