//! EV Battery Queries
//!
//! Best-effort high-voltage battery readings. State of charge uses the
//! standard hybrid pack PID; the rest are extended DIDs (Mode 22) that only
//! some battery management gateways answer.

use crate::frame::split_messages;
use diag_core::EvBatteryStatus;

/// Battery reading a query fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvMetric {
    /// State of charge (%)
    StateOfCharge,
    /// State of health (%)
    StateOfHealth,
    /// Pack voltage (V)
    Voltage,
    /// Pack current (A)
    Current,
    /// Pack temperature (°C)
    Temperature,
}

/// One battery query and its decoding rule
#[derive(Debug, Clone, Copy)]
pub struct EvQuery {
    /// Request text
    pub command: &'static str,
    /// Positive response bytes that precede the data
    pub echo: &'static [u8],
    /// Data bytes the rule needs
    pub bytes: usize,
    /// Reading this query fills
    pub metric: EvMetric,
    decode: fn(&[u8]) -> f64,
}

impl EvQuery {
    /// Decode a reply; any framing or length problem yields `None`
    pub fn decode_reply(&self, raw: &str) -> Option<f64> {
        let messages = split_messages(raw).ok()?;
        messages.iter().find_map(|message| {
            let payload = message.data.strip_prefix(self.echo)?;
            (payload.len() >= self.bytes).then(|| (self.decode)(payload))
        })
    }
}

/// Queries attempted after standard live data, in order
pub static EV_QUERIES: &[EvQuery] = &[
    EvQuery {
        command: "015B",
        echo: &[0x41, 0x5B],
        bytes: 1,
        metric: EvMetric::StateOfCharge,
        decode: |b| b[0] as f64 * 100.0 / 255.0,
    },
    EvQuery {
        command: "220101",
        echo: &[0x62, 0x01, 0x01],
        bytes: 1,
        metric: EvMetric::StateOfHealth,
        decode: |b| b[0] as f64 / 2.0,
    },
    EvQuery {
        command: "220102",
        echo: &[0x62, 0x01, 0x02],
        bytes: 2,
        metric: EvMetric::Voltage,
        decode: |b| u16::from_be_bytes([b[0], b[1]]) as f64 / 10.0,
    },
    EvQuery {
        command: "220103",
        echo: &[0x62, 0x01, 0x03],
        bytes: 2,
        metric: EvMetric::Current,
        decode: |b| i16::from_be_bytes([b[0], b[1]]) as f64 / 10.0,
    },
    EvQuery {
        command: "220104",
        echo: &[0x62, 0x01, 0x04],
        bytes: 1,
        metric: EvMetric::Temperature,
        decode: |b| b[0] as f64 - 40.0,
    },
];

/// Store a decoded reading in the composite status
pub fn apply(status: &mut EvBatteryStatus, metric: EvMetric, value: f64) {
    let slot = match metric {
        EvMetric::StateOfCharge => &mut status.state_of_charge,
        EvMetric::StateOfHealth => &mut status.state_of_health,
        EvMetric::Voltage => &mut status.voltage,
        EvMetric::Current => &mut status.current,
        EvMetric::Temperature => &mut status.temperature,
    };
    *slot = Some(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(metric: EvMetric) -> &'static EvQuery {
        EV_QUERIES.iter().find(|q| q.metric == metric).unwrap()
    }

    #[test]
    fn test_state_of_charge() {
        let value = query(EvMetric::StateOfCharge).decode_reply("415BCC").unwrap();
        assert!((value - 80.0).abs() < 0.01);
    }

    #[test]
    fn test_signed_current() {
        // 0xFF9C = -100 => -10.0 A (charging)
        let value = query(EvMetric::Current).decode_reply("620103FF9C").unwrap();
        assert!((value + 10.0).abs() < 0.01);
    }

    #[test]
    fn test_unsupported_replies_are_absent() {
        let soh = query(EvMetric::StateOfHealth);
        assert_eq!(soh.decode_reply("NO DATA"), None);
        assert_eq!(soh.decode_reply("7F2231"), None);
        assert_eq!(query(EvMetric::Voltage).decode_reply("62010201"), None);
    }

    #[test]
    fn test_apply_fills_slot() {
        let mut status = EvBatteryStatus::default();
        apply(&mut status, EvMetric::Voltage, 356.4);
        assert_eq!(status.voltage, Some(356.4));
        assert!(!status.is_empty());
    }
}
