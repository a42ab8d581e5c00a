//! DM1 / DM2 Trouble Codes
//!
//! Payload layout: two lamp-status bytes, then 4-byte DTCs.
//! SPN is 19 bits: byte 1 (bits 0-7), byte 2 (bits 8-15) and the top three
//! bits of byte 3 (bits 16-18). The low five bits of byte 3 are the FMI,
//! the low seven bits of byte 4 the occurrence count.

use crate::frame::pgn_messages;
use crate::{fmi, spn};
use diag_core::{DecodeError, FaultRecord, J1939Fault};

/// SPN value reserved as "not available"
const SPN_NOT_AVAILABLE: u32 = 0x7FFFF;

/// Hex characters of lamp status preceding the DTC records
const LAMP_STATUS_CHARS: usize = 4;

/// Hex characters per DTC record
const DTC_CHARS: usize = 8;

/// One DTC as packed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmEntry {
    /// Suspect parameter number
    pub spn: u32,
    /// Failure mode identifier
    pub fmi: u8,
    /// Occurrence count
    pub occurrence_count: u8,
}

impl DmEntry {
    /// Expand into a fault record with SPN and FMI metadata
    pub fn to_fault(&self) -> J1939Fault {
        let descriptor = spn::lookup(self.spn);
        J1939Fault {
            code: format!("SPN {} FMI {}", self.spn, self.fmi),
            spn: self.spn,
            fmi: self.fmi,
            occurrence_count: self.occurrence_count,
            severity: fmi::severity(self.fmi),
            source: spn::label(self.spn),
            system: descriptor.map(|d| d.system).unwrap_or("Unknown").to_string(),
            unit: descriptor.map(|d| d.unit).unwrap_or("").to_string(),
            fmi_description: fmi::describe(self.fmi).to_string(),
        }
    }
}

/// Decode a DM1/DM2 payload given as hex text.
///
/// Non-hex characters are stripped, the lamp status is skipped, and the
/// empty (`SPN 0 FMI 0`) and not-available (`SPN 0x7FFFF`) records are
/// dropped. A trailing partial record is ignored.
pub fn decode_dm(hex_text: &str) -> Vec<DmEntry> {
    let compact: Vec<u8> = hex_text
        .bytes()
        .filter(u8::is_ascii_hexdigit)
        .collect();
    if compact.len() <= LAMP_STATUS_CHARS {
        return Vec::new();
    }

    compact[LAMP_STATUS_CHARS..]
        .chunks_exact(DTC_CHARS)
        .filter_map(|record| {
            let record = std::str::from_utf8(record).ok()?;
            let bytes = hex::decode(record).ok()?;
            let (b1, b2, b3, b4) = (
                u32::from(bytes[0]),
                u32::from(bytes[1]),
                u32::from(bytes[2]),
                bytes[3],
            );
            let spn = ((b3 & 0xE0) << 11) | (b2 << 8) | b1;
            let fmi = (b3 & 0x1F) as u8;
            let entry = DmEntry {
                spn,
                fmi,
                occurrence_count: b4 & 0x7F,
            };
            let empty = spn == 0 && fmi == 0;
            (!empty && spn != SPN_NOT_AVAILABLE).then_some(entry)
        })
        .collect()
}

/// Pack one DTC into its 4 wire bytes
pub fn encode_dtc(spn: u32, fmi: u8, occurrence_count: u8) -> [u8; 4] {
    [
        (spn & 0xFF) as u8,
        ((spn >> 8) & 0xFF) as u8,
        ((((spn >> 16) & 0x07) as u8) << 5) | (fmi & 0x1F),
        occurrence_count & 0x7F,
    ]
}

/// Decode a full DM1 or DM2 reply into fault records.
///
/// Each source address carries its own lamp status. A fault reported by
/// several sources is kept once with the highest occurrence count.
pub fn parse_dm_reply(pgn: u16, raw: &str) -> Result<Vec<FaultRecord>, DecodeError> {
    let mut entries: Vec<DmEntry> = Vec::new();

    for message in pgn_messages(pgn, raw)? {
        for entry in decode_dm(&hex::encode_upper(&message.data)) {
            match entries
                .iter_mut()
                .find(|e| e.spn == entry.spn && e.fmi == entry.fmi)
            {
                Some(existing) => {
                    existing.occurrence_count =
                        existing.occurrence_count.max(entry.occurrence_count)
                }
                None => entries.push(entry),
            }
        }
    }

    Ok(entries
        .iter()
        .map(|entry| FaultRecord::J1939(entry.to_fault()))
        .collect())
}
