//! Fault Records

use crate::Protocol;
use serde::{Deserialize, Serialize};

/// Operational severity of a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, no immediate action
    Info,
    /// Should be inspected
    Warning,
    /// Stop or service immediately
    Critical,
}

/// An OBD-II diagnostic trouble code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObdFault {
    /// Formatted code, e.g. "P0106"
    pub code: String,
    /// The two raw bytes the code was decoded from
    pub raw: [u8; 2],
    /// Severity (OBD-II carries none on the wire, stored codes are warnings)
    pub severity: Severity,
    /// Number of ECUs that reported this code
    pub occurrence_count: u8,
}

/// A J1939 DM1/DM2 diagnostic trouble code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct J1939Fault {
    /// Display code, e.g. "SPN 190 FMI 1"
    pub code: String,
    /// Suspect parameter number (19 bits)
    pub spn: u32,
    /// Failure mode identifier (5 bits)
    pub fmi: u8,
    /// Occurrence count (7 bits)
    pub occurrence_count: u8,
    /// Severity derived from the FMI
    pub severity: Severity,
    /// Parameter name from the SPN table, or "SPN {n}"
    pub source: String,
    /// Vehicle system the SPN belongs to
    pub system: String,
    /// Engineering unit of the parameter
    pub unit: String,
    /// Human description of the failure mode
    pub fmi_description: String,
}

/// A decoded fault, tagged by protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum FaultRecord {
    /// ISO 15031-6 trouble code
    Obd2(ObdFault),
    /// SAE J1939-73 trouble code
    J1939(J1939Fault),
}

impl FaultRecord {
    /// Protocol the record was decoded from
    pub fn protocol(&self) -> Protocol {
        match self {
            FaultRecord::Obd2(_) => Protocol::Obd2,
            FaultRecord::J1939(_) => Protocol::J1939,
        }
    }

    /// Display code
    pub fn code(&self) -> &str {
        match self {
            FaultRecord::Obd2(f) => &f.code,
            FaultRecord::J1939(f) => &f.code,
        }
    }

    /// Severity
    pub fn severity(&self) -> Severity {
        match self {
            FaultRecord::Obd2(f) => f.severity,
            FaultRecord::J1939(f) => f.severity,
        }
    }

    /// Occurrence count
    pub fn occurrence_count(&self) -> u8 {
        match self {
            FaultRecord::Obd2(f) => f.occurrence_count,
            FaultRecord::J1939(f) => f.occurrence_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_dispatch_by_variant() {
        let record = FaultRecord::Obd2(ObdFault {
            code: "P0106".to_string(),
            raw: [0x01, 0x06],
            severity: Severity::Warning,
            occurrence_count: 1,
        });
        assert_eq!(record.protocol(), Protocol::Obd2);
        assert_eq!(record.code(), "P0106");
        assert_eq!(record.severity(), Severity::Warning);
    }

    #[test]
    fn test_serializes_with_protocol_tag() {
        let record = FaultRecord::J1939(J1939Fault {
            code: "SPN 110 FMI 0".to_string(),
            spn: 110,
            fmi: 0,
            occurrence_count: 2,
            severity: Severity::Critical,
            source: "Engine Coolant Temperature".to_string(),
            system: "Cooling".to_string(),
            unit: "°C".to_string(),
            fmi_description: "Data valid but above normal operating range".to_string(),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["protocol"], "j1939");
        assert_eq!(json["spn"], 110);
        assert_eq!(json["severity"], "critical");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }
}
