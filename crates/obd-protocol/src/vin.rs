//! Vehicle Identification Number (Mode 09 PID 02)

use crate::frame::split_messages;
use diag_core::DecodeError;

/// Length of a VIN
const VIN_LEN: usize = 17;

/// Decode a Mode 09 PID 02 reply.
///
/// CAN ECUs answer with one reassembled message (`49 02 01` + 17 chars);
/// legacy ECUs answer with numbered lines of four bytes each.
pub fn parse_vin(raw: &str) -> Result<Option<String>, DecodeError> {
    let mut parts: Vec<(u8, Vec<u8>)> = split_messages(raw)?
        .into_iter()
        .filter_map(|message| match message.data.as_slice() {
            [0x49, 0x02, seq, rest @ ..] => Some((*seq, rest.to_vec())),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return Ok(None);
    }
    parts.sort_by_key(|(seq, _)| *seq);

    let chars: Vec<u8> = parts
        .into_iter()
        .flat_map(|(_, bytes)| bytes)
        .filter(|b| b.is_ascii_alphanumeric())
        .collect();
    if chars.len() < VIN_LEN {
        return Err(DecodeError::new("VIN", raw));
    }
    let vin = &chars[chars.len() - VIN_LEN..];
    Ok(Some(String::from_utf8_lossy(vin).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_multi_frame_vin() {
        let raw = "7E81014490201314731\n7E8214A433534343452\n7E82237323532333637";
        assert_eq!(parse_vin(raw).unwrap().as_deref(), Some("1G1JC5444R7252367"));
    }

    #[test]
    fn test_headers_off_vin() {
        let raw = "014\n0:490201314731\n1:4A433534343452\n2:37323532333637";
        assert_eq!(parse_vin(raw).unwrap().as_deref(), Some("1G1JC5444R7252367"));
    }

    #[test]
    fn test_legacy_numbered_lines() {
        let raw = "49020100000031\n49020247314A43\n49020335343434\n49020452373235\n49020532333637";
        assert_eq!(parse_vin(raw).unwrap().as_deref(), Some("1G1JC5444R7252367"));
    }

    #[test]
    fn test_truncated_vin_is_decode_error() {
        assert!(parse_vin("490201314731").is_err());
    }

    #[test]
    fn test_no_vin_reply() {
        assert_eq!(parse_vin("NO DATA").unwrap(), None);
    }
}
