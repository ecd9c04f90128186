//! Two-winding transformer model.
//!
//! The off-nominal tap `ratio` and the phase `shift_degree` sit on the hv
//! side. With `τ = ratio·e^{jθ}` and the series admittance `ys`:
//!
//! ```text
//! yff = (ys + h/2) / ratio²    yft = -ys / conj(τ)
//! ytf = -ys / τ                ytt =  ys + h/2
//! ```
//!
//! A phase shift makes `yft != ytf`, so Ybus is no longer symmetric.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{Branch, BranchTwoPort, default_true};

fn default_ratio() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformer {
    pub hv_bus: usize,
    pub lv_bus: usize,
    pub r_pu: f64,
    pub x_pu: f64,
    /// Magnetizing conductance.
    #[serde(default)]
    pub g_pu: f64,
    /// Magnetizing susceptance.
    #[serde(default)]
    pub b_pu: f64,
    #[serde(default = "default_ratio")]
    pub ratio: f64,
    #[serde(default)]
    pub shift_degree: f64,
    #[serde(default = "default_true")]
    pub in_service: bool,
}

impl Transformer {
    pub fn new(hv_bus: usize, lv_bus: usize, r_pu: f64, x_pu: f64, ratio: f64) -> Self {
        Transformer {
            hv_bus,
            lv_bus,
            r_pu,
            x_pu,
            g_pu: 0.0,
            b_pu: 0.0,
            ratio,
            shift_degree: 0.0,
            in_service: true,
        }
    }

    pub fn with_shift(mut self, shift_degree: f64) -> Self {
        self.shift_degree = shift_degree;
        self
    }
}

impl Branch for Transformer {
    fn from_bus(&self) -> usize {
        self.hv_bus
    }
    fn to_bus(&self) -> usize {
        self.lv_bus
    }
    fn set_from_bus(&mut self, bus: usize) {
        self.hv_bus = bus;
    }
    fn set_to_bus(&mut self, bus: usize) {
        self.lv_bus = bus;
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
        let ratio = if self.ratio > 0.0 { self.ratio } else { 1.0 };
        let tau = Complex64::from_polar(ratio, self.shift_degree.to_radians());
        BranchTwoPort {
            yff: (ys + half_h) / (ratio * ratio),
            yft: -ys / tau.conj(),
            ytf: -ys / tau,
            ytt: ys + half_h,
        }
    }
}
