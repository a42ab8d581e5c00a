//! J1939 Protocol Implementation
//!
//! SAE J1939 request encoding and decoding for heavy-duty vehicles read
//! through an ELM327-compatible adapter in J1939 mode: DM1/DM2 trouble
//! codes, DM11/DM3 clears, and broadcast parameter groups for live data.

mod dm;
mod fmi;
mod frame;
mod live;
pub mod pgn;
mod spn;

pub use dm::{decode_dm, encode_dtc, parse_dm_reply, DmEntry};
pub use fmi::{describe as describe_fmi, severity as fmi_severity};
pub use frame::{pgn_messages, PgnMessage};
pub use live::{decode_pgn, live_pgns, parse_pgn_reply, LIVE_SPNS};
pub use pgn::build_request;
pub use spn::{extract as extract_spn, label as spn_label, lookup as lookup_spn, SpnDescriptor, SPN_TABLE};

/// Request for active trouble codes
pub fn build_read_active_faults() -> String {
    build_request(pgn::DM1)
}

/// Request for previously active trouble codes
pub fn build_read_previous_faults() -> String {
    build_request(pgn::DM2)
}

/// Requests that clear active then previously active trouble codes
pub fn build_clear_faults() -> [String; 2] {
    [build_request(pgn::DM11), build_request(pgn::DM3)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_requests() {
        assert_eq!(build_read_active_faults(), "00 FECA");
        assert_eq!(build_read_previous_faults(), "00 FECB");
        assert_eq!(build_clear_faults(), ["00 FED3".to_string(), "00 FECC".to_string()]);
    }
}
