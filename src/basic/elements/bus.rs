use serde::{Deserialize, Serialize};

use super::default_true;

/// A network node. Buses are identified by their position in the grid model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    #[serde(default)]
    pub name: Option<String>,
    /// Nominal voltage in kV, used to express currents in kA.
    pub vn_kv: f64,
    #[serde(default = "default_true")]
    pub in_service: bool,
}

impl Bus {
    pub fn new(vn_kv: f64) -> Self {
        Bus {
            name: None,
            vn_kv,
            in_service: true,
        }
    }

    pub fn named(name: impl Into<String>, vn_kv: f64) -> Self {
        Bus {
            name: Some(name.into()),
            ..Bus::new(vn_kv)
        }
    }
}
