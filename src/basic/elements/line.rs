use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{Branch, BranchTwoPort, default_true};

/// Transmission line with a symmetric π-model, per unit on the system base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub from_bus: usize,
    pub to_bus: usize,
    pub r_pu: f64,
    pub x_pu: f64,
    /// Total shunt conductance, split evenly between both ends.
    #[serde(default)]
    pub g_pu: f64,
    /// Total shunt susceptance (line charging), split evenly between both ends.
    #[serde(default)]
    pub b_pu: f64,
    #[serde(default = "default_true")]
    pub in_service: bool,
}

impl Line {
    pub fn new(from_bus: usize, to_bus: usize, r_pu: f64, x_pu: f64, b_pu: f64) -> Self {
        Line {
            from_bus,
            to_bus,
            r_pu,
            x_pu,
            g_pu: 0.0,
            b_pu,
            in_service: true,
        }
    }
}

impl Branch for Line {
    fn from_bus(&self) -> usize {
        self.from_bus
    }
    fn to_bus(&self) -> usize {
        self.to_bus
    }
    fn set_from_bus(&mut self, bus: usize) {
        self.from_bus = bus;
    }
    fn set_to_bus(&mut self, bus: usize) {
        self.to_bus = bus;
    }
    fn in_service(&self) -> bool {
        self.in_service
    }
    fn set_in_service(&mut self, status: bool) {
        self.in_service = status;
    }

    fn two_port(&self) -> BranchTwoPort {
        let ys = Complex64::new(self.r_pu, self.x_pu).inv();
        let half_h = Complex64::new(self.g_pu, self.b_pu) * 0.5;
        BranchTwoPort {
            yff: ys + half_h,
            yft: -ys,
            ytf: -ys,
            ytt: ys + half_h,
        }
    }
}
