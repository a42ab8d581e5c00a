//! Adapter Protocol Selectors

use serde::{Deserialize, Serialize};

/// Bus protocols an ELM327-compatible adapter is told to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ElmProtocol {
    /// Automatic OBD-II protocol detection
    #[default]
    Auto,
    /// SAE J1939 CAN (29 bit ID, 250 kbaud)
    SaeJ1939,
}

impl ElmProtocol {
    /// ELM327 AT command that selects this protocol
    pub fn to_elm_command(&self) -> &'static str {
        match self {
            ElmProtocol::Auto => "ATSP0",
            ElmProtocol::SaeJ1939 => "ATSPA",
        }
    }
}
