//! Voltage controlling generators.
//!
//! A generator holds the voltage magnitude of its bus at `vm_pu`. When
//! `is_slack` is set it additionally fixes the voltage angle (`va_degree`) of
//! the bus that serves as reference for its connected component and takes a
//! share of the active power imbalance proportional to `slack_weight`.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{Injector, default_true};

fn default_vm() -> f64 {
    1.0
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub bus: usize,
    pub p_mw: f64,
    /// Voltage magnitude setpoint, per unit.
    #[serde(default = "default_vm")]
    pub vm_pu: f64,
    #[serde(default)]
    pub is_slack: bool,
    /// Participation factor in the distributed slack, ignored unless `is_slack`.
    #[serde(default = "default_weight")]
    pub slack_weight: f64,
    /// Reference angle in degrees, ignored unless `is_slack`.
    #[serde(default)]
    pub va_degree: f64,
    #[serde(default = "default_true")]
    pub in_service: bool,
}

impl Generator {
    pub fn new(bus: usize, p_mw: f64, vm_pu: f64) -> Self {
        Generator {
            bus,
            p_mw,
            vm_pu,
            is_slack: false,
            slack_weight: default_weight(),
            va_degree: 0.0,
            in_service: true,
        }
    }

    pub fn slack(bus: usize, vm_pu: f64) -> Self {
        Generator {
            is_slack: true,
            ..Generator::new(bus, 0.0, vm_pu)
        }
    }

    pub fn with_slack_weight(mut self, weight: f64) -> Self {
        self.is_slack = true;
        self.slack_weight = weight;
        self
    }

    /// Weight actually used by the distributed slack.
    pub fn effective_weight(&self) -> f64 {
        if self.is_slack && self.in_service {
            self.slack_weight.max(0.0)
        } else {
            0.0
        }
    }
}

impl Injector for Generator {
    fn injection_mva(&self) -> Complex64 {
        Complex64::new(self.p_mw, 0.0)
    }
    fn set_p_mw(&mut self, p_mw: f64) {
        self.p_mw = p_mw;
    }
    /// Reactive output is a result of the power flow, not a setpoint.
    fn set_q_mvar(&mut self, _q_mvar: f64) {}
}
