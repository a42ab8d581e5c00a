//! Reply Framing
//!
//! Turns the adapter's text reply into per-ECU byte messages: strips CAN
//! and legacy headers, and reassembles ISO-TP first/consecutive frames.

use diag_core::DecodeError;

/// How a reply line was framed on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// ISO 15765-4 CAN with an 11- or 29-bit header and a PCI byte
    Can,
    /// J1850 / ISO 9141 / KWP with a 3-byte header and trailing checksum
    Legacy,
    /// Headers off: bare service bytes
    Bare,
}

/// One reassembled message from one ECU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcuMessage {
    /// Header text identifying the sender, if headers were on
    pub ecu: Option<String>,
    /// Framing the message arrived with
    pub kind: FrameKind,
    /// Service bytes, starting with the response SID
    pub data: Vec<u8>,
}

/// Tester addresses that mark a 3-byte legacy header's target byte
const LEGACY_TARGETS: [u8; 3] = [0x6B, 0x6A, 0xF1];

/// ISO-TP reassembly in progress for one ECU
struct Segmented {
    ecu: Option<String>,
    kind: FrameKind,
    total: usize,
    data: Vec<u8>,
}

fn is_hex_line(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c.is_ascii_hexdigit())
}

fn decode(line: &str, raw: &str) -> Result<Vec<u8>, DecodeError> {
    hex::decode(line).map_err(|_| DecodeError::new("reply frame", raw))
}

/// Split a reply into per-ECU messages.
///
/// Non-hex lines (`SEARCHING...`, `BUS INIT: ...OK`) are ignored.
pub fn split_messages(raw: &str) -> Result<Vec<EcuMessage>, DecodeError> {
    let mut messages = Vec::new();
    let mut segmented: Vec<Segmented> = Vec::new();

    for line in raw.lines() {
        let line: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        let line = line.to_ascii_uppercase();

        // Headers-off multi-frame: "014", "0:490201314731", "1:..."
        if let Some((index, rest)) = line.split_once(':') {
            if index.len() == 1 && is_hex_line(index) && is_hex_line(rest) {
                let bytes = decode(rest, raw)?;
                match segmented.iter_mut().find(|s| s.ecu.is_none()) {
                    Some(pending) => pending.data.extend(bytes),
                    None => segmented.push(Segmented {
                        ecu: None,
                        kind: FrameKind::Bare,
                        total: 0,
                        data: bytes,
                    }),
                }
            }
            continue;
        }
        if !is_hex_line(&line) {
            continue;
        }
        if line.len() == 3 {
            // Byte-count line preceding a headers-off multi-frame reply
            continue;
        }

        let (ecu, kind, body) = split_header(&line);
        let bytes = decode(body, raw)?;

        match kind {
            FrameKind::Can => {
                let Some(&pci) = bytes.first() else { continue };
                match pci >> 4 {
                    0x0 => {
                        let len = usize::from(pci & 0x0F).min(bytes.len() - 1);
                        messages.push(EcuMessage {
                            ecu,
                            kind,
                            data: bytes[1..1 + len].to_vec(),
                        });
                    }
                    0x1 if bytes.len() >= 2 => {
                        let total = (usize::from(pci & 0x0F) << 8) | usize::from(bytes[1]);
                        segmented.retain(|s| s.ecu != ecu);
                        segmented.push(Segmented {
                            ecu,
                            kind,
                            total,
                            data: bytes[2..].to_vec(),
                        });
                    }
                    0x2 => {
                        if let Some(pending) = segmented.iter_mut().find(|s| s.ecu == ecu) {
                            pending.data.extend_from_slice(&bytes[1..]);
                        }
                    }
                    _ => {}
                }
            }
            FrameKind::Legacy => {
                // Drop the trailing checksum byte
                let end = bytes.len().saturating_sub(1);
                messages.push(EcuMessage {
                    ecu,
                    kind,
                    data: bytes[..end].to_vec(),
                });
            }
            FrameKind::Bare => messages.push(EcuMessage { ecu, kind, data: bytes }),
        }
    }

    for mut pending in segmented {
        if pending.total > 0 {
            pending.data.truncate(pending.total);
        }
        messages.push(EcuMessage {
            ecu: pending.ecu,
            kind: pending.kind,
            data: pending.data,
        });
    }
    Ok(messages)
}

/// Separate a header from the frame body
fn split_header(line: &str) -> (Option<String>, FrameKind, &str) {
    // 11-bit CAN: "7E8" + PCI + data, the only odd-length form
    if line.len() % 2 == 1 && line.len() >= 5 {
        return (Some(line[..3].to_string()), FrameKind::Can, &line[3..]);
    }
    // 29-bit CAN: "18DAF110" + PCI + data
    if line.len() >= 10 && line.starts_with("18DA") {
        return (Some(line[..8].to_string()), FrameKind::Can, &line[8..]);
    }
    // Legacy: priority, target, source, data..., checksum
    if line.len() >= 10 {
        let priority = u8::from_str_radix(&line[..2], 16).unwrap_or(0);
        let target = u8::from_str_radix(&line[2..4], 16).unwrap_or(0);
        if matches!(priority, 0x48 | 0x68 | 0x80..=0x87) && LEGACY_TARGETS.contains(&target) {
            return (Some(line[..6].to_string()), FrameKind::Legacy, &line[6..]);
        }
    }
    (None, FrameKind::Bare, line)
}
