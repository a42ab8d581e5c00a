//! Live Data Samples

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic name of a live-data field, shared by both protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LiveField {
    /// Engine speed (rpm)
    Rpm,
    /// Vehicle speed (km/h)
    Speed,
    /// Engine coolant temperature (°C)
    CoolantTemp,
    /// Intake air temperature (°C)
    IntakeTemp,
    /// Engine load (%)
    EngineLoad,
    /// Throttle position (%)
    Throttle,
    /// Fuel rail pressure (kPa)
    FuelPressure,
    /// Mass air flow (g/s)
    Maf,
    /// Intake manifold absolute pressure (kPa)
    IntakePressure,
    /// Ignition timing advance (° before TDC)
    TimingAdvance,
    /// Fuel tank level (%)
    FuelLevel,
    /// Control module voltage (V)
    ControlModuleVoltage,
    /// Engine oil temperature (°C)
    OilTemp,
    /// Engine fuel rate (L/h)
    FuelRate,
    /// Run time since engine start (s)
    RunTime,
    /// Engine oil pressure (kPa)
    OilPressure,
    /// Diesel exhaust fluid tank level (%)
    DefLevel,
    /// Diesel particulate filter soot load (%)
    DpfSootLoad,
    /// Total engine hours (h)
    EngineHours,
    /// Total fuel used (L)
    TotalFuelUsed,
    /// Battery potential (V)
    BatteryVoltage,
    /// Ambient air temperature (°C)
    AmbientTemp,
}

impl LiveField {
    /// Engineering unit of the decoded value
    pub fn unit(&self) -> &'static str {
        match self {
            LiveField::Rpm => "rpm",
            LiveField::Speed => "km/h",
            LiveField::CoolantTemp
            | LiveField::IntakeTemp
            | LiveField::OilTemp
            | LiveField::AmbientTemp => "°C",
            LiveField::EngineLoad
            | LiveField::Throttle
            | LiveField::FuelLevel
            | LiveField::DefLevel
            | LiveField::DpfSootLoad => "%",
            LiveField::FuelPressure | LiveField::IntakePressure | LiveField::OilPressure => "kPa",
            LiveField::Maf => "g/s",
            LiveField::TimingAdvance => "°",
            LiveField::ControlModuleVoltage | LiveField::BatteryVoltage => "V",
            LiveField::FuelRate => "L/h",
            LiveField::RunTime => "s",
            LiveField::EngineHours => "h",
            LiveField::TotalFuelUsed => "L",
        }
    }
}

/// High-voltage battery readings from an EV/hybrid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvBatteryStatus {
    /// State of charge (%)
    pub state_of_charge: Option<f64>,
    /// State of health (%)
    pub state_of_health: Option<f64>,
    /// Pack voltage (V)
    pub voltage: Option<f64>,
    /// Pack current (A, negative while charging)
    pub current: Option<f64>,
    /// Pack temperature (°C)
    pub temperature: Option<f64>,
}

impl EvBatteryStatus {
    /// True when no reading was decoded
    pub fn is_empty(&self) -> bool {
        self.state_of_charge.is_none()
            && self.state_of_health.is_none()
            && self.voltage.is_none()
            && self.current.is_none()
            && self.temperature.is_none()
    }
}

/// One polling cycle of decoded live data.
///
/// A missing field means it was not decoded this cycle, never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveDataSample {
    /// Timestamp (Unix ms)
    pub timestamp_ms: u64,
    /// Decoded values in physical units
    pub values: BTreeMap<LiveField, f64>,
    /// EV battery readings, if the vehicle answered any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ev_battery: Option<EvBatteryStatus>,
}

impl LiveDataSample {
    /// Create an empty sample with the given timestamp
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            ..Default::default()
        }
    }

    /// Get a decoded field
    pub fn get(&self, field: LiveField) -> Option<f64> {
        self.values.get(&field).copied()
    }

    /// Record a decoded field
    pub fn set(&mut self, field: LiveField, value: f64) {
        self.values.insert(field, value);
    }

    /// Number of decoded fields
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when nothing was decoded
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
