//! Suspect Parameter Numbers
//!
//! Static SPN table: display metadata for fault records plus, for the
//! parameters read as live data, the PGN that carries them and a
//! per-parameter extraction function.

use crate::pgn;

/// Extracts one parameter from a PGN payload
pub type Extract = fn(&[u8]) -> Option<f64>;

/// Metadata for one SPN
#[derive(Debug, Clone, Copy)]
pub struct SpnDescriptor {
    /// Suspect parameter number
    pub spn: u32,
    /// Parameter name
    pub name: &'static str,
    /// Engineering unit
    pub unit: &'static str,
    /// Vehicle system
    pub system: &'static str,
    /// PGN the parameter is broadcast in, for live-data parameters
    pub pgn: Option<u16>,
    /// Payload extraction, for live-data parameters
    pub extract: Option<Extract>,
}

impl SpnDescriptor {
    const fn fault(spn: u32, name: &'static str, unit: &'static str, system: &'static str) -> Self {
        Self {
            spn,
            name,
            unit,
            system,
            pgn: None,
            extract: None,
        }
    }

    const fn live(
        spn: u32,
        name: &'static str,
        unit: &'static str,
        system: &'static str,
        pgn: u16,
        extract: Extract,
    ) -> Self {
        Self {
            spn,
            name,
            unit,
            system,
            pgn: Some(pgn),
            extract: Some(extract),
        }
    }
}

// Raw-value readers. Values in the "error" / "not available" ranges are
// treated as absent.

fn byte(bytes: &[u8], i: usize) -> Option<f64> {
    let value = *bytes.get(i)?;
    (value < 0xFB).then_some(f64::from(value))
}

fn word_le(bytes: &[u8], i: usize) -> Option<f64> {
    let raw = bytes.get(i..i + 2)?;
    let value = u16::from_le_bytes([raw[0], raw[1]]);
    (value < 0xFB00).then_some(f64::from(value))
}

fn dword_le(bytes: &[u8], i: usize) -> Option<f64> {
    let raw = bytes.get(i..i + 4)?;
    let value = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
    (value < 0xFB00_0000).then_some(f64::from(value))
}

fn vehicle_speed(bytes: &[u8]) -> Option<f64> {
    // (bytes[1]*256 + bytes[0]) / 256
    Some(word_le(bytes, 0)? / 256.0)
}

fn engine_load(bytes: &[u8]) -> Option<f64> {
    byte(bytes, 2)
}

fn fuel_level(bytes: &[u8]) -> Option<f64> {
    Some(byte(bytes, 1)? * 0.4)
}

fn oil_pressure(bytes: &[u8]) -> Option<f64> {
    Some(byte(bytes, 3)? * 4.0)
}

fn coolant_temp(bytes: &[u8]) -> Option<f64> {
    Some(byte(bytes, 0)? - 40.0)
}

fn battery_voltage(bytes: &[u8]) -> Option<f64> {
    Some(word_le(bytes, 4)? * 0.05)
}

fn ambient_temp(bytes: &[u8]) -> Option<f64> {
    Some(word_le(bytes, 3)? * 0.03125 - 273.0)
}

fn oil_temp(bytes: &[u8]) -> Option<f64> {
    Some(word_le(bytes, 2)? * 0.03125 - 273.0)
}

fn fuel_rate(bytes: &[u8]) -> Option<f64> {
    Some(word_le(bytes, 0)? * 0.05)
}

fn engine_speed(bytes: &[u8]) -> Option<f64> {
    // (bytes[3]*256 + bytes[2]) * 0.125
    Some(word_le(bytes, 2)? * 0.125)
}

fn engine_hours(bytes: &[u8]) -> Option<f64> {
    Some(dword_le(bytes, 0)? * 0.05)
}

fn total_fuel_used(bytes: &[u8]) -> Option<f64> {
    Some(dword_le(bytes, 4)? * 0.5)
}

fn def_level(bytes: &[u8]) -> Option<f64> {
    Some(byte(bytes, 0)? * 0.4)
}

fn soot_load(bytes: &[u8]) -> Option<f64> {
    byte(bytes, 2)
}

/// Known SPNs, sorted by number
pub static SPN_TABLE: &[SpnDescriptor] = &[
    SpnDescriptor::fault(27, "EGR Valve Position", "%", "Air Intake"),
    SpnDescriptor::fault(51, "Throttle Position", "%", "Air Intake"),
    SpnDescriptor::live(84, "Wheel-Based Vehicle Speed", "km/h", "Vehicle", pgn::CCVS, vehicle_speed),
    SpnDescriptor::fault(91, "Accelerator Pedal Position 1", "%", "Powertrain"),
    SpnDescriptor::live(92, "Engine Percent Load At Current Speed", "%", "Engine", pgn::EEC2, engine_load),
    SpnDescriptor::fault(94, "Engine Fuel Delivery Pressure", "kPa", "Fuel"),
    SpnDescriptor::live(96, "Fuel Level 1", "%", "Fuel", pgn::DD, fuel_level),
    SpnDescriptor::fault(97, "Water In Fuel Indicator", "", "Fuel"),
    SpnDescriptor::fault(98, "Engine Oil Level", "%", "Lubrication"),
    SpnDescriptor::live(100, "Engine Oil Pressure", "kPa", "Lubrication", pgn::EFLP1, oil_pressure),
    SpnDescriptor::fault(102, "Engine Intake Manifold 1 Pressure", "kPa", "Air Intake"),
    SpnDescriptor::fault(105, "Engine Intake Manifold 1 Temperature", "°C", "Air Intake"),
    SpnDescriptor::fault(108, "Barometric Pressure", "kPa", "Environment"),
    SpnDescriptor::live(110, "Engine Coolant Temperature", "°C", "Cooling", pgn::ET1, coolant_temp),
    SpnDescriptor::fault(111, "Engine Coolant Level", "%", "Cooling"),
    SpnDescriptor::fault(157, "Engine Fuel 1 Injector Metering Rail 1 Pressure", "MPa", "Fuel"),
    SpnDescriptor::fault(158, "Key Switch Battery Potential", "V", "Electrical"),
    SpnDescriptor::live(168, "Battery Potential / Power Input 1", "V", "Electrical", pgn::VEP1, battery_voltage),
    SpnDescriptor::live(171, "Ambient Air Temperature", "°C", "Environment", pgn::AMB, ambient_temp),
    SpnDescriptor::live(175, "Engine Oil Temperature 1", "°C", "Lubrication", pgn::ET1, oil_temp),
    SpnDescriptor::live(183, "Engine Fuel Rate", "L/h", "Fuel", pgn::LFE, fuel_rate),
    SpnDescriptor::live(190, "Engine Speed", "rpm", "Engine", pgn::EEC1, engine_speed),
    SpnDescriptor::live(247, "Engine Total Hours of Operation", "h", "Engine", pgn::HOURS, engine_hours),
    SpnDescriptor::live(250, "Engine Total Fuel Used", "L", "Fuel", pgn::LFC, total_fuel_used),
    SpnDescriptor::fault(513, "Actual Engine - Percent Torque", "%", "Engine"),
    SpnDescriptor::fault(629, "Controller #1", "", "Electrical"),
    SpnDescriptor::fault(636, "Engine Position Sensor", "", "Engine"),
    SpnDescriptor::fault(639, "J1939 Network #1", "", "Network"),
    SpnDescriptor::fault(651, "Engine Injector Cylinder #1", "", "Fuel"),
    SpnDescriptor::fault(652, "Engine Injector Cylinder #2", "", "Fuel"),
    SpnDescriptor::fault(653, "Engine Injector Cylinder #3", "", "Fuel"),
    SpnDescriptor::fault(654, "Engine Injector Cylinder #4", "", "Fuel"),
    SpnDescriptor::fault(655, "Engine Injector Cylinder #5", "", "Fuel"),
    SpnDescriptor::fault(656, "Engine Injector Cylinder #6", "", "Fuel"),
    SpnDescriptor::fault(1569, "Engine Protection Torque Derate", "%", "Engine"),
    SpnDescriptor::live(1761, "Aftertreatment 1 DEF Tank Volume", "%", "Aftertreatment", pgn::AT1T1I, def_level),
    SpnDescriptor::fault(3031, "Aftertreatment 1 DEF Tank Temperature", "°C", "Aftertreatment"),
    SpnDescriptor::fault(3216, "Aftertreatment 1 Intake NOx", "ppm", "Aftertreatment"),
    SpnDescriptor::fault(3226, "Aftertreatment 1 Outlet NOx", "ppm", "Aftertreatment"),
    SpnDescriptor::fault(3251, "Aftertreatment 1 DPF Differential Pressure", "kPa", "Aftertreatment"),
    SpnDescriptor::fault(3361, "Aftertreatment 1 DEF Dosing Unit", "", "Aftertreatment"),
    SpnDescriptor::live(3719, "Aftertreatment 1 DPF Soot Load Percent", "%", "Aftertreatment", pgn::DPFC1, soot_load),
    SpnDescriptor::fault(4364, "Aftertreatment 1 SCR Conversion Efficiency", "%", "Aftertreatment"),
    SpnDescriptor::fault(5246, "Aftertreatment SCR Operator Inducement Severity", "", "Aftertreatment"),
];

/// Look up an SPN
pub fn lookup(spn: u32) -> Option<&'static SpnDescriptor> {
    SPN_TABLE
        .binary_search_by_key(&spn, |d| d.spn)
        .ok()
        .map(|i| &SPN_TABLE[i])
}

/// Display name of an SPN, "SPN {n}" when it is not in the table
pub fn label(spn: u32) -> String {
    match lookup(spn) {
        Some(descriptor) => descriptor.name.to_string(),
        None => format!("SPN {spn}"),
    }
}

/// Extract `spn` from a payload of its PGN
pub fn extract(spn: u32, payload: &[u8]) -> Option<f64> {
    let extract = lookup(spn)?.extract?;
    extract(payload)
}
