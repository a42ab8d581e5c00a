//! OBD-II PID Definitions and Response Parsing
//!
//! Defines the Mode 01 Parameter IDs polled for live data and their
//! decoding formulas.

use crate::frame::split_messages;
use diag_core::{DecodeError, LiveField};
use serde::{Deserialize, Serialize};

/// Positive response SID for Mode 01
const CURRENT_DATA_RESPONSE: u8 = 0x41;

/// Negative response SID
const NEGATIVE_RESPONSE: u8 = 0x7F;

/// Standard OBD-II PIDs for Mode 01 (current data)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// Calculated engine load (0x04)
    EngineLoad = 0x04,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Fuel pressure, gauge (0x0A)
    FuelPressure = 0x0A,
    /// Intake manifold absolute pressure (0x0B)
    IntakeManifoldPressure = 0x0B,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Timing advance (0x0E)
    TimingAdvance = 0x0E,
    /// Intake air temperature (0x0F)
    IntakeTemp = 0x0F,
    /// Mass air flow rate (0x10)
    Maf = 0x10,
    /// Throttle position (0x11)
    ThrottlePosition = 0x11,
    /// Run time since engine start (0x1F)
    RunTime = 0x1F,
    /// Fuel tank level input (0x2F)
    FuelLevel = 0x2F,
    /// Control module voltage (0x42)
    ControlModuleVoltage = 0x42,
    /// Ambient air temperature (0x46)
    AmbientTemp = 0x46,
    /// Engine oil temperature (0x5C)
    OilTemp = 0x5C,
    /// Engine fuel rate (0x5E)
    FuelRate = 0x5E,
}

impl Pid {
    /// Every PID polled for a live-data sample, in polling order
    pub const ALL: [Pid; 16] = [
        Pid::Rpm,
        Pid::Speed,
        Pid::CoolantTemp,
        Pid::EngineLoad,
        Pid::ThrottlePosition,
        Pid::IntakeTemp,
        Pid::Maf,
        Pid::IntakeManifoldPressure,
        Pid::FuelPressure,
        Pid::TimingAdvance,
        Pid::FuelLevel,
        Pid::ControlModuleVoltage,
        Pid::AmbientTemp,
        Pid::OilTemp,
        Pid::FuelRate,
        Pid::RunTime,
    ];

    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    /// Get the number of response bytes for this PID
    pub fn response_bytes(&self) -> usize {
        match self {
            Pid::Rpm
            | Pid::Maf
            | Pid::RunTime
            | Pid::ControlModuleVoltage
            | Pid::FuelRate => 2,
            _ => 1,
        }
    }

    /// Live-data field this PID fills
    pub fn field(&self) -> LiveField {
        match self {
            Pid::EngineLoad => LiveField::EngineLoad,
            Pid::CoolantTemp => LiveField::CoolantTemp,
            Pid::FuelPressure => LiveField::FuelPressure,
            Pid::IntakeManifoldPressure => LiveField::IntakePressure,
            Pid::Rpm => LiveField::Rpm,
            Pid::Speed => LiveField::Speed,
            Pid::TimingAdvance => LiveField::TimingAdvance,
            Pid::IntakeTemp => LiveField::IntakeTemp,
            Pid::Maf => LiveField::Maf,
            Pid::ThrottlePosition => LiveField::Throttle,
            Pid::RunTime => LiveField::RunTime,
            Pid::FuelLevel => LiveField::FuelLevel,
            Pid::ControlModuleVoltage => LiveField::ControlModuleVoltage,
            Pid::AmbientTemp => LiveField::AmbientTemp,
            Pid::OilTemp => LiveField::OilTemp,
            Pid::FuelRate => LiveField::FuelRate,
        }
    }

    /// Request text for this PID, e.g. "010C"
    pub fn command(&self) -> String {
        format!("01{:02X}", self.as_hex())
    }

    /// Decode the data bytes that follow the `41 PID` echo.
    ///
    /// Returns `None` when fewer bytes than the PID needs were received.
    pub fn decode(&self, bytes: &[u8]) -> Option<f64> {
        if bytes.len() < self.response_bytes() {
            return None;
        }
        let a = bytes[0] as f64;
        let word = || (bytes[0] as f64 * 256.0) + bytes[1] as f64;

        let value = match self {
            // RPM: ((A*256)+B)/4
            Pid::Rpm => word() / 4.0,
            // Speed: A (km/h)
            Pid::Speed => a,
            // Temperatures: A - 40 (°C)
            Pid::CoolantTemp | Pid::IntakeTemp | Pid::AmbientTemp | Pid::OilTemp => a - 40.0,
            // Load, throttle, fuel level: A * 100 / 255 (%)
            Pid::EngineLoad | Pid::ThrottlePosition | Pid::FuelLevel => a * 100.0 / 255.0,
            // Fuel pressure: A * 3 (kPa)
            Pid::FuelPressure => a * 3.0,
            // Intake manifold pressure: A (kPa)
            Pid::IntakeManifoldPressure => a,
            // Timing advance: A/2 - 64 (°)
            Pid::TimingAdvance => a / 2.0 - 64.0,
            // MAF: ((A*256)+B) / 100 (g/s)
            Pid::Maf => word() / 100.0,
            // Run time: (A*256)+B (s)
            Pid::RunTime => word(),
            // Control module voltage: ((A*256)+B) / 1000 (V)
            Pid::ControlModuleVoltage => word() / 1000.0,
            // Fuel rate: ((A*256)+B) / 20 (L/h)
            Pid::FuelRate => word() / 20.0,
        };
        Some(value)
    }
}

/// Find the data bytes answering `01 pid` in a reply.
///
/// `Ok(None)` when the ECU answered with a negative response; a reply that
/// does not answer this PID at all is a decode error.
pub fn pid_payload(pid: u8, raw: &str) -> Result<Option<Vec<u8>>, DecodeError> {
    let messages = split_messages(raw)?;
    let mut refused = false;

    for message in &messages {
        match message.data.as_slice() {
            [CURRENT_DATA_RESPONSE, echoed, payload @ ..] if *echoed == pid => {
                return Ok(Some(payload.to_vec()));
            }
            [NEGATIVE_RESPONSE, 0x01, ..] => refused = true,
            _ => {}
        }
    }

    if refused {
        Ok(None)
    } else {
        Err(DecodeError::new(format!("PID {pid:02X}"), raw))
    }
}

/// Decode a Mode 01 reply for `pid` into its physical value.
///
/// A payload shorter than the PID needs yields `Ok(None)`.
pub fn parse_pid_reply(pid: Pid, raw: &str) -> Result<Option<f64>, DecodeError> {
    Ok(pid_payload(pid.as_hex(), raw)?.and_then(|bytes| pid.decode(&bytes)))
}

/// PIDs a vehicle reports as supported, from the `0100`/`0120`/`0140`
/// bitmap replies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedPids {
    /// Bit `n` set means PID `n` is supported
    bits: [u64; 4],
}

impl SupportedPids {
    /// Base PIDs of the bitmap queries, in query order
    pub const BASES: [u8; 3] = [0x00, 0x20, 0x40];

    /// Merge one 4-byte bitmap for PIDs `base+1 ..= base+32`
    pub fn merge(&mut self, base: u8, bitmap: &[u8]) {
        for (i, byte) in bitmap.iter().take(4).enumerate() {
            for bit in 0..8 {
                if byte & (0x80 >> bit) != 0 {
                    let pid = usize::from(base) + i * 8 + bit + 1;
                    if pid < 256 {
                        self.bits[pid / 64] |= 1 << (pid % 64);
                    }
                }
            }
        }
    }

    /// Whether `pid` was reported as supported
    pub fn supports(&self, pid: u8) -> bool {
        let pid = usize::from(pid);
        self.bits[pid / 64] & (1 << (pid % 64)) != 0
    }

    /// Whether the next bitmap query (`base + 0x20`) is worth sending
    pub fn has_more_after(&self, base: u8) -> bool {
        self.supports(base.saturating_add(0x20))
    }

    /// True when nothing is marked as supported
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|word| *word == 0)
    }
}
