//! Failure Mode Identifiers (SAE J1939-73)

use diag_core::Severity;

static FMI_DESCRIPTIONS: [&str; 32] = [
    "Data valid but above normal operational range - most severe level",
    "Data valid but below normal operational range - most severe level",
    "Data erratic, intermittent or incorrect",
    "Voltage above normal, or shorted to high source",
    "Voltage below normal, or shorted to low source",
    "Current below normal or open circuit",
    "Current above normal or grounded circuit",
    "Mechanical system not responding or out of adjustment",
    "Abnormal frequency or pulse width or period",
    "Abnormal update rate",
    "Abnormal rate of change",
    "Root cause not known",
    "Bad intelligent device or component",
    "Out of calibration",
    "Special instructions",
    "Data valid but above normal operating range - least severe level",
    "Data valid but above normal operating range - moderately severe level",
    "Data valid but below normal operating range - least severe level",
    "Data valid but below normal operating range - moderately severe level",
    "Received network data in error",
    "Data drifted high",
    "Data drifted low",
    "Reserved for SAE assignment",
    "Reserved for SAE assignment",
    "Reserved for SAE assignment",
    "Reserved for SAE assignment",
    "Reserved for SAE assignment",
    "Reserved for SAE assignment",
    "Reserved for SAE assignment",
    "Reserved for SAE assignment",
    "Reserved for SAE assignment",
    "Condition exists",
];

/// Human description of a failure mode
pub fn describe(fmi: u8) -> &'static str {
    FMI_DESCRIPTIONS
        .get(usize::from(fmi))
        .copied()
        .unwrap_or("Unknown failure mode")
}

/// Severity of a failure mode.
///
/// Out-of-range and mechanical failures are critical; the least and
/// moderately severe range violations (15-18) are informational.
pub fn severity(fmi: u8) -> Severity {
    match fmi {
        0 | 1 | 2 | 7 | 12 => Severity::Critical,
        15..=18 => Severity::Info,
        _ => Severity::Warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_classes() {
        for fmi in [0, 1, 2, 7, 12] {
            assert_eq!(severity(fmi), Severity::Critical);
        }
        for fmi in 15..=18 {
            assert_eq!(severity(fmi), Severity::Info);
        }
        for fmi in [3, 4, 5, 6, 8, 11, 14, 19, 31] {
            assert_eq!(severity(fmi), Severity::Warning);
        }
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(describe(4), "Voltage below normal, or shorted to low source");
        assert_eq!(describe(31), "Condition exists");
        assert_eq!(describe(40), "Unknown failure mode");
    }
}
