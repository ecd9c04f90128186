//! Grid model, per unit conversion and network assembly.

mod assembly;
pub mod converter;
mod grid;
mod results;
mod setpoints;

pub use assembly::{AssembledGrid, BranchFlow};
pub use converter::*;
pub use grid::*;
pub use results::{BranchEndResult, InjectionResult};
pub use setpoints::Setpoints;

use std::sync::atomic::{AtomicU64, Ordering};

use derive_more::{Display, From};

/// Process-unique identifier of one assembled topology.
///
/// Factorization handles remember the id they were built for and start over
/// when they see a different one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, From, Display)]
#[display("topology#{_0}")]
pub struct TopologyId(u64);

impl TopologyId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TopologyId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}
