//! J1939 Live Data
//!
//! Maps sample fields to the SPNs that fill them and groups them by the
//! PGN that must be requested.

use crate::frame::pgn_messages;
use crate::spn;
use diag_core::{DecodeError, LiveField};

/// Live-data fields and the SPN each is read from, in request order
pub static LIVE_SPNS: &[(LiveField, u32)] = &[
    (LiveField::Rpm, 190),
    (LiveField::CoolantTemp, 110),
    (LiveField::OilTemp, 175),
    (LiveField::Speed, 84),
    (LiveField::EngineLoad, 92),
    (LiveField::FuelLevel, 96),
    (LiveField::OilPressure, 100),
    (LiveField::BatteryVoltage, 168),
    (LiveField::FuelRate, 183),
    (LiveField::TotalFuelUsed, 250),
    (LiveField::AmbientTemp, 171),
    (LiveField::DefLevel, 1761),
    (LiveField::DpfSootLoad, 3719),
    (LiveField::EngineHours, 247),
];

/// PGNs to request for `fields`, without repeats
pub fn live_pgns(fields: &[LiveField]) -> Vec<u16> {
    let mut pgns = Vec::new();
    for (field, number) in LIVE_SPNS {
        if !fields.contains(field) {
            continue;
        }
        if let Some(pgn) = spn::lookup(*number).and_then(|d| d.pgn) {
            if !pgns.contains(&pgn) {
                pgns.push(pgn);
            }
        }
    }
    pgns
}

/// Decode every live field carried by one PGN payload
pub fn decode_pgn(pgn: u16, payload: &[u8]) -> Vec<(LiveField, f64)> {
    LIVE_SPNS
        .iter()
        .filter_map(|(field, number)| {
            let descriptor = spn::lookup(*number)?;
            if descriptor.pgn != Some(pgn) {
                return None;
            }
            let value = (descriptor.extract?)(payload)?;
            Some((*field, value))
        })
        .collect()
}

/// Decode a reply to a PGN request into live fields.
///
/// When several sources answer, the first one that yields a field wins.
pub fn parse_pgn_reply(pgn: u16, raw: &str) -> Result<Vec<(LiveField, f64)>, DecodeError> {
    let mut values: Vec<(LiveField, f64)> = Vec::new();
    for message in pgn_messages(pgn, raw)? {
        for (field, value) in decode_pgn(pgn, &message.data) {
            if !values.iter().any(|(f, _)| *f == field) {
                values.push((field, value));
            }
        }
    }
    Ok(values)
}
