//! Diagnostic Trouble Code Decoding
//!
//! Mode 03 replies carry DTCs as byte pairs. The top two bits of the first
//! byte select the system letter, the remaining 14 bits are the four digits.

use crate::frame::{split_messages, FrameKind};
use diag_core::{DecodeError, FaultRecord, ObdFault, Severity};

/// Positive response SID for Mode 03
const STORED_DTC_RESPONSE: u8 = 0x43;

/// Negative response SID
const NEGATIVE_RESPONSE: u8 = 0x7F;

/// Decode one byte pair into a code such as "P0106".
///
/// Returns `None` for the all-zero padding pair.
pub fn decode_dtc_bytes(b1: u8, b2: u8) -> Option<String> {
    if b1 == 0 && b2 == 0 {
        return None;
    }

    let letter = match (b1 >> 6) & 0b11 {
        0 => 'P',
        1 => 'C',
        2 => 'B',
        _ => 'U',
    };
    let first = (b1 >> 4) & 0b11;
    let second = b1 & 0x0F;
    let third = b2 >> 4;
    let fourth = b2 & 0x0F;

    Some(format!("{letter}{first:X}{second:X}{third:X}{fourth:X}"))
}

/// Inverse of [`decode_dtc_bytes`]
pub fn encode_dtc(code: &str) -> Option<[u8; 2]> {
    let mut chars = code.chars();
    let system: u8 = match chars.next()?.to_ascii_uppercase() {
        'P' => 0,
        'C' => 1,
        'B' => 2,
        'U' => 3,
        _ => return None,
    };
    let digits = chars.as_str();
    if digits.len() != 4 {
        return None;
    }
    let value = u16::from_str_radix(digits, 16).ok()?;
    if value > 0x3FFF {
        return None;
    }
    let b1 = (system << 6) | (value >> 8) as u8;
    Some([b1, (value & 0xFF) as u8])
}

/// Decode a hex string of DTC byte pairs, four hex characters per code.
///
/// Whitespace is ignored; a trailing partial window is ignored; all-zero
/// pairs are skipped.
pub fn decode_dtcs(hex_text: &str) -> Result<Vec<ObdFault>, DecodeError> {
    let compact: String = hex_text.chars().filter(|c| !c.is_whitespace()).collect();
    let mut faults = Vec::new();

    for window in compact.as_bytes().chunks_exact(4) {
        let bytes = std::str::from_utf8(window)
            .ok()
            .and_then(|w| hex::decode(w).ok())
            .ok_or_else(|| DecodeError::new("DTC pair", hex_text))?;
        if let Some(code) = decode_dtc_bytes(bytes[0], bytes[1]) {
            faults.push(ObdFault {
                code,
                raw: [bytes[0], bytes[1]],
                severity: Severity::Warning,
                occurrence_count: 1,
            });
        }
    }
    Ok(faults)
}

/// Decode a full Mode 03 reply, merging codes reported by several ECUs.
///
/// The occurrence count of a merged code is the number of ECUs that
/// reported it.
pub fn parse_stored_faults(raw: &str) -> Result<Vec<FaultRecord>, DecodeError> {
    let messages = split_messages(raw)?;
    let mut faults: Vec<ObdFault> = Vec::new();
    let mut answered = false;

    for message in messages {
        match message.data.first() {
            Some(&STORED_DTC_RESPONSE) => answered = true,
            Some(&NEGATIVE_RESPONSE) => {
                answered = true;
                continue;
            }
            _ => continue,
        }
        let mut payload = &message.data[1..];
        // CAN replies carry a DTC count byte before the pairs; with headers
        // off its presence shows as an odd payload length.
        let has_count = match message.kind {
            FrameKind::Can => true,
            FrameKind::Legacy => false,
            FrameKind::Bare => payload.len() % 2 == 1,
        };
        if has_count && !payload.is_empty() {
            payload = &payload[1..];
        }

        for fault in decode_dtcs(&hex::encode_upper(payload))? {
            match faults.iter_mut().find(|f| f.code == fault.code) {
                Some(existing) => {
                    existing.occurrence_count = existing.occurrence_count.saturating_add(1)
                }
                None => faults.push(fault),
            }
        }
    }

    if !answered {
        return Err(DecodeError::new("Mode 03 reply", raw));
    }
    Ok(faults.into_iter().map(FaultRecord::Obd2).collect())
}

/// True when a Mode 04 reply carries the positive acknowledgement
pub fn is_clear_acknowledged(raw: &str) -> bool {
    split_messages(raw)
        .map(|messages| messages.iter().any(|m| m.data.first() == Some(&0x44)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_p0106() {
        let faults = decode_dtcs("0106").unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].code, "P0106");
        assert_eq!(faults[0].raw, [0x01, 0x06]);
    }

    #[test]
    fn test_system_letters() {
        assert_eq!(decode_dtc_bytes(0x41, 0x23).as_deref(), Some("C0123"));
        assert_eq!(decode_dtc_bytes(0x92, 0x34).as_deref(), Some("B1234"));
        assert_eq!(decode_dtc_bytes(0xC1, 0x00).as_deref(), Some("U0100"));
        assert_eq!(decode_dtc_bytes(0x3F, 0xFF).as_deref(), Some("P3FFF"));
    }

    #[test]
    fn test_hex_digits_render_uppercase() {
        assert_eq!(decode_dtc_bytes(0x0A, 0xBC).as_deref(), Some("P0ABC"));
    }

    #[test]
    fn test_padding_and_partial_window_skipped() {
        let faults = decode_dtcs("0300 0000 0000 01").unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].code, "P0300");
    }

    #[test]
    fn test_non_hex_is_decode_error() {
        let err = decode_dtcs("01ZZ").unwrap_err();
        assert_eq!(err.raw, "01ZZ");
    }

    #[test]
    fn test_parse_bare_reply() {
        let faults = parse_stored_faults("430106").unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].code(), "P0106");
    }

    #[test]
    fn test_parse_bare_reply_with_count_byte() {
        let faults = parse_stored_faults("4302010603000000").unwrap();
        let codes: Vec<_> = faults.iter().map(|f| f.code().to_string()).collect();
        assert_eq!(codes, vec!["P0106", "P0300"]);
    }

    #[test]
    fn test_parse_can_reply_merges_ecus() {
        let raw = "7E804430101060000\n7E90643020106C100";
        let faults = parse_stored_faults(raw).unwrap();
        let codes: Vec<_> = faults.iter().map(|f| f.code().to_string()).collect();
        assert_eq!(codes, vec!["P0106", "U0100"]);
        assert_eq!(faults[0].occurrence_count(), 2);
    }

    #[test]
    fn test_parse_no_codes() {
        assert!(parse_stored_faults("4300").unwrap().is_empty());
    }

    #[test]
    fn test_parse_wrong_service_is_decode_error() {
        assert!(parse_stored_faults("410C1F40").is_err());
    }

    #[test]
    fn test_clear_acknowledged() {
        assert!(is_clear_acknowledged("44"));
        assert!(is_clear_acknowledged("7E80144"));
        assert!(!is_clear_acknowledged("7F0422"));
    }

    proptest! {
        #[test]
        fn prop_zero_pairs_never_yield_codes(pairs in 1usize..8) {
            let hex_text = "0000".repeat(pairs);
            prop_assert!(decode_dtcs(&hex_text).unwrap().is_empty());
        }

        #[test]
        fn prop_encode_decode_round_trip(b1 in any::<u8>(), b2 in any::<u8>()) {
            prop_assume!(b1 != 0 || b2 != 0);
            let code = decode_dtc_bytes(b1, b2).unwrap();
            prop_assert_eq!(encode_dtc(&code), Some([b1, b2]));
        }
    }
}
