//! Diagnostic Data Model
//!
//! Protocol-neutral types produced by the OBD-II and J1939 codecs and
//! consumed by the session layer and its callers.

mod error;
mod fault;
mod live;

pub use error::DecodeError;
pub use fault::{FaultRecord, J1939Fault, ObdFault, Severity};
pub use live::{EvBatteryStatus, LiveDataSample, LiveField};

use serde::{Deserialize, Serialize};

/// Wire protocol a fault record or session belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// ISO 15031-6 (OBD-II, light vehicles)
    Obd2,
    /// SAE J1939-73 (heavy duty, CAN)
    J1939,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Obd2 => f.write_str("obd2"),
            Protocol::J1939 => f.write_str("j1939"),
        }
    }
}

/// Current time as Unix milliseconds (0 if the clock is before the epoch)
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
