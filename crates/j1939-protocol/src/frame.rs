//! PGN Reply Framing
//!
//! With headers on, the adapter prefixes each J1939 line with the 29-bit
//! identifier as 8 hex characters: priority, PGN (PF, PS) and source
//! address, e.g. `18FEEE00`.

use diag_core::DecodeError;

/// Payload of one PGN from one source address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgnMessage {
    /// Source address, if the line carried a header
    pub source: Option<u8>,
    /// Data bytes
    pub data: Vec<u8>,
}

/// Collect the payloads answering `pgn` from a reply.
///
/// A line whose header carries the requested PGN has the header stripped;
/// any other hex line is taken as bare payload. Consecutive lines from the
/// same source are concatenated. Non-hex lines are ignored.
pub fn pgn_messages(pgn: u16, raw: &str) -> Result<Vec<PgnMessage>, DecodeError> {
    let pgn_hex = format!("{:04X}", pgn);
    let mut messages: Vec<PgnMessage> = Vec::new();

    for line in raw.lines() {
        let line: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        let line = line.to_ascii_uppercase();
        if line.is_empty() || !line.chars().all(|c| c.is_ascii_hexdigit()) {
            continue;
        }

        let (source, body) = if line.len() > 8 && line[2..6] == pgn_hex {
            (u8::from_str_radix(&line[6..8], 16).ok(), &line[8..])
        } else {
            (None, line.as_str())
        };
        let bytes = hex::decode(body)
            .map_err(|_| DecodeError::new(format!("PGN {pgn_hex}"), raw))?;

        match messages.last_mut() {
            Some(last) if last.source == source => last.data.extend(bytes),
            _ => messages.push(PgnMessage { source, data: bytes }),
        }
    }

    if messages.is_empty() {
        return Err(DecodeError::new(format!("PGN {pgn_hex}"), raw));
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_stripped() {
        let messages = pgn_messages(0xFEEE, "18FEEE005AFFFFFFFFFFFFFF").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].source, Some(0x00));
        assert_eq!(messages[0].data[0], 0x5A);
        assert_eq!(messages[0].data.len(), 8);
    }

    #[test]
    fn test_bare_payload() {
        let messages = pgn_messages(0xFEEE, "5A FF FF FF FF FF FF FF").unwrap();
        assert_eq!(messages[0].source, None);
        assert_eq!(messages[0].data.len(), 8);
    }

    #[test]
    fn test_sources_are_kept_apart() {
        let raw = "18FECA000400BE000101FFFF\n18FECA03000064000201FFFF";
        let messages = pgn_messages(0xFECA, raw).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].source, Some(0x03));
    }

    #[test]
    fn test_status_lines_ignored() {
        let messages = pgn_messages(0xF004, "SEARCHING...\n18F00400FFFF401FFFFFFFFF").unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_no_payload_is_decode_error() {
        let err = pgn_messages(0xFEEE, "OK").unwrap_err();
        assert_eq!(err.what, "PGN FEEE");
    }

    #[test]
    fn test_odd_length_is_decode_error() {
        assert!(pgn_messages(0xFEEE, "5AF").is_err());
    }
}
