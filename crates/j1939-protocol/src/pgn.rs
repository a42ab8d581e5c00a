//! Parameter Group Numbers
//!
//! PGNs requested by the engine, as the 16-bit values that appear in
//! request text and in 29-bit CAN headers.

/// Electronic Engine Controller 2 (accelerator, load)
pub const EEC2: u16 = 0xF003;
/// Electronic Engine Controller 1 (engine speed, torque)
pub const EEC1: u16 = 0xF004;
/// Diesel Particulate Filter Control 1 (soot load)
pub const DPFC1: u16 = 0xFD7B;
/// Aftertreatment 1 Diesel Exhaust Fluid Tank 1 Information
pub const AT1T1I: u16 = 0xFE56;
/// Active Diagnostic Trouble Codes
pub const DM1: u16 = 0xFECA;
/// Previously Active Diagnostic Trouble Codes
pub const DM2: u16 = 0xFECB;
/// Diagnostic Data Clear/Reset of Previously Active DTCs
pub const DM3: u16 = 0xFECC;
/// Diagnostic Data Clear/Reset for Active DTCs
pub const DM11: u16 = 0xFED3;
/// Engine Hours, Revolutions
pub const HOURS: u16 = 0xFEE5;
/// Fuel Consumption (Liquid)
pub const LFC: u16 = 0xFEE9;
/// Engine Temperature 1
pub const ET1: u16 = 0xFEEE;
/// Engine Fluid Level/Pressure 1
pub const EFLP1: u16 = 0xFEEF;
/// Cruise Control/Vehicle Speed
pub const CCVS: u16 = 0xFEF1;
/// Fuel Economy (Liquid)
pub const LFE: u16 = 0xFEF2;
/// Ambient Conditions
pub const AMB: u16 = 0xFEF5;
/// Inlet/Exhaust Conditions 1
pub const IC1: u16 = 0xFEF6;
/// Vehicle Electrical Power 1
pub const VEP1: u16 = 0xFEF7;
/// Dash Display
pub const DD: u16 = 0xFEFC;

/// Global request for `pgn`
pub fn build_request(pgn: u16) -> String {
    format!("00 {:04X}", pgn)
}

/// Short name of a PGN for logs
pub fn name(pgn: u16) -> &'static str {
    match pgn {
        EEC2 => "EEC2",
        EEC1 => "EEC1",
        DPFC1 => "DPFC1",
        AT1T1I => "AT1T1I",
        DM1 => "DM1",
        DM2 => "DM2",
        DM3 => "DM3",
        DM11 => "DM11",
        HOURS => "HOURS",
        LFC => "LFC",
        ET1 => "ET1",
        EFLP1 => "EFL/P1",
        CCVS => "CCVS",
        LFE => "LFE",
        AMB => "AMB",
        IC1 => "IC1",
        VEP1 => "VEP1",
        DD => "DD",
        _ => "PGN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_text() {
        assert_eq!(build_request(ET1), "00 FEEE");
        assert_eq!(build_request(EEC1), "00 F004");
        assert_eq!(build_request(DM1), "00 FECA");
    }

    #[test]
    fn test_names() {
        assert_eq!(name(DPFC1), "DPFC1");
        assert_eq!(name(0x1234), "PGN");
    }
}
