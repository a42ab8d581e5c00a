//! OBD-II Protocol Implementation
//!
//! Request encoding and reply decoding for ELM327-compatible OBD-II
//! adapters: stored trouble codes, Mode 01 live data, VIN and best-effort
//! EV battery readings. Replies may arrive with or without CAN/legacy
//! headers.

mod dtc;
mod ev;
mod frame;
mod pid;
mod protocol;
mod vin;

pub use dtc::{decode_dtc_bytes, decode_dtcs, encode_dtc, is_clear_acknowledged, parse_stored_faults};
pub use ev::{apply as apply_ev_reading, EvMetric, EvQuery, EV_QUERIES};
pub use frame::{split_messages, EcuMessage, FrameKind};
pub use pid::{parse_pid_reply, pid_payload, Pid, SupportedPids};
pub use protocol::ElmProtocol;
pub use vin::parse_vin;

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Diagnostic trouble codes
    pub const READ_DTC: u8 = 0x03;
    /// Clear trouble codes
    pub const CLEAR_DTC: u8 = 0x04;
    /// Vehicle information
    pub const VEHICLE_INFO: u8 = 0x09;
}

/// Request for stored trouble codes
pub fn build_read_stored_faults() -> String {
    format!("{:02X}", mode::READ_DTC)
}

/// Request to clear trouble codes and freeze-frame data
pub fn build_clear_faults() -> String {
    format!("{:02X}", mode::CLEAR_DTC)
}

/// Mode 01 request for `pid`
pub fn build_read_pid(pid: u8) -> String {
    format!("{:02X}{:02X}", mode::CURRENT_DATA, pid)
}

/// Supported-PID bitmap request for PIDs `base+1 ..= base+32`
pub fn build_supported_pids(base: u8) -> String {
    build_read_pid(base)
}

/// Request for the VIN
pub fn build_read_vin() -> String {
    format!("{:02X}02", mode::VEHICLE_INFO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_text() {
        assert_eq!(build_read_stored_faults(), "03");
        assert_eq!(build_clear_faults(), "04");
        assert_eq!(build_read_pid(0x0C), "010C");
        assert_eq!(build_read_pid(Pid::FuelLevel.as_hex()), Pid::FuelLevel.command());
        assert_eq!(build_supported_pids(0x20), "0120");
        assert_eq!(build_read_vin(), "0902");
    }

    #[test]
    fn test_stored_fault_round_trip() {
        let request = build_read_stored_faults();
        assert_eq!(request, "03");
        let faults = parse_stored_faults("43 01 06").unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].code(), "P0106");
    }
}
