//! Conversion of physical line and transformer data to per unit parameters.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::basic::elements::{Line, Transformer};

/// Per unit series and shunt parameters of a branch on the system base.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BranchParams {
    pub r_pu: f64,
    pub x_pu: f64,
    pub g_pu: f64,
    pub b_pu: f64,
}

impl BranchParams {
    pub fn into_line(self, from_bus: usize, to_bus: usize) -> Line {
        Line {
            from_bus,
            to_bus,
            r_pu: self.r_pu,
            x_pu: self.x_pu,
            g_pu: self.g_pu,
            b_pu: self.b_pu,
            in_service: true,
        }
    }

    pub fn into_transformer(self, hv_bus: usize, lv_bus: usize, ratio: f64) -> Transformer {
        Transformer {
            hv_bus,
            lv_bus,
            r_pu: self.r_pu,
            x_pu: self.x_pu,
            g_pu: self.g_pu,
            b_pu: self.b_pu,
            ratio,
            shift_degree: 0.0,
            in_service: true,
        }
    }
}

/// Rated data of a two-winding transformer as found on its nameplate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafoRating {
    pub sn_mva: f64,
    pub vn_hv_kv: f64,
    pub vn_lv_kv: f64,
    pub vk_percent: f64,
    pub vkr_percent: f64,
    #[serde(default)]
    pub pfe_kw: f64,
    #[serde(default)]
    pub i0_percent: f64,
    #[serde(default)]
    pub tap_step_percent: f64,
    #[serde(default)]
    pub tap_pos: f64,
    #[serde(default)]
    pub tap_neutral: f64,
    #[serde(default = "one")]
    pub parallel: u32,
}

fn one() -> u32 {
    1
}

/// Converts physical quantities to per unit on a common power base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PuConverter {
    pub sn_mva: f64,
    pub f_hz: f64,
}

impl Default for PuConverter {
    fn default() -> Self {
        PuConverter {
            sn_mva: 1.0,
            f_hz: 50.0,
        }
    }
}

impl PuConverter {
    pub fn new(sn_mva: f64, f_hz: f64) -> Self {
        PuConverter { sn_mva, f_hz }
    }

    /// Impedance base in ohm for a bus of nominal voltage `vn_kv`.
    pub fn z_base(&self, vn_kv: f64) -> f64 {
        vn_kv * vn_kv / self.sn_mva
    }

    /// Line parameters from per-km data.
    ///
    /// # Arguments
    ///
    /// * `c_nf_per_km` - Capacitance per km, converted to susceptance at `f_hz`.
    /// * `g_us_per_km` - Dielectric conductance per km in µS.
    /// * `parallel` - Number of identical parallel circuits.
    /// * `vn_kv` - Nominal voltage of the from bus.
    #[allow(clippy::too_many_arguments)]
    pub fn line_params(
        &self,
        r_ohm_per_km: f64,
        x_ohm_per_km: f64,
        c_nf_per_km: f64,
        g_us_per_km: f64,
        length_km: f64,
        parallel: u32,
        vn_kv: f64,
    ) -> BranchParams {
        let n = parallel.max(1) as f64;
        let z_base = self.z_base(vn_kv);
        let b = 2.0 * PI * self.f_hz * 1e-9 * c_nf_per_km * length_km * n;
        let g = 1e-6 * g_us_per_km * length_km * n;
        BranchParams {
            r_pu: r_ohm_per_km * length_km / n / z_base,
            x_pu: x_ohm_per_km * length_km / n / z_base,
            g_pu: g * z_base,
            b_pu: b * z_base,
        }
    }

    /// Transformer parameters referred to the lv bus, whose nominal voltage is `vn_lv_bus_kv`.
    ///
    /// The magnetizing branch is folded into the shunt term of the π-model.
    pub fn trafo_params(&self, rating: &TrafoRating, vn_lv_bus_kv: f64) -> BranchParams {
        let n = rating.parallel.max(1) as f64;
        let z_trafo = rating.vn_lv_kv * rating.vn_lv_kv / rating.sn_mva;
        let z_sys = self.z_base(vn_lv_bus_kv);

        let z_sc = rating.vk_percent * 0.01 * z_trafo;
        let r_sc = rating.vkr_percent * 0.01 * z_trafo;
        let x_sc = (z_sc * z_sc - r_sc * r_sc).max(0.0).sqrt();

        let y_mag = rating.i0_percent * 0.01;
        let g_mag = rating.pfe_kw * 1e-3 / rating.sn_mva;
        let b_mag = -(y_mag * y_mag - g_mag * g_mag).max(0.0).sqrt();

        BranchParams {
            r_pu: r_sc / n / z_sys,
            x_pu: x_sc / n / z_sys,
            g_pu: g_mag * n / z_trafo * z_sys,
            b_pu: b_mag * n / z_trafo * z_sys,
        }
    }

    /// Off-nominal tap ratio seen by the per unit model.
    pub fn trafo_ratio(rating: &TrafoRating, vn_hv_bus_kv: f64, vn_lv_bus_kv: f64) -> f64 {
        let tap_m = 1.0 + (rating.tap_pos - rating.tap_neutral) * 0.01 * rating.tap_step_percent;
        (rating.vn_hv_kv * tap_m / rating.vn_lv_kv) / (vn_hv_bus_kv / vn_lv_bus_kv)
    }
}
