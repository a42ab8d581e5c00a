//! Session Configuration

use adapter_link::ChannelConfig;
use diag_core::LiveField;
use j1939_protocol::LIVE_SPNS;
use obd_protocol::Pid;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts, retry budget and live-data selection for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// `ATZ` reset timeout (default: 1000ms)
    pub reset_timeout_ms: u64,
    /// Timeout of the other init commands and `ATRV` (default: 300ms)
    pub init_timeout_ms: u64,
    /// OBD-II request timeout (default: 300ms)
    pub obd_timeout_ms: u64,
    /// J1939 request timeout (default: 500ms)
    pub j1939_timeout_ms: u64,
    /// Silence that completes a reply with no prompt (default: 150ms)
    pub quiet_period_ms: u64,
    /// Reply terminator (default: '>')
    pub terminator: char,
    /// Extra attempts for a transient reply or a timeout (default: 1)
    pub transient_retries: u8,
    /// Query EV battery readings after OBD-II live data (default: true)
    pub probe_ev_battery: bool,
    /// Mode 01 PIDs polled for OBD-II live data
    pub live_pids: Vec<Pid>,
    /// Fields read for J1939 live data
    pub live_fields: Vec<LiveField>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reset_timeout_ms: 1000,
            init_timeout_ms: 300,
            obd_timeout_ms: 300,
            j1939_timeout_ms: 500,
            quiet_period_ms: 150,
            terminator: '>',
            transient_retries: 1,
            probe_ev_battery: true,
            live_pids: Pid::ALL.to_vec(),
            live_fields: LIVE_SPNS.iter().map(|(field, _)| *field).collect(),
        }
    }
}

impl SessionConfig {
    /// Command channel settings derived from this config
    pub fn channel_config(&self) -> ChannelConfig {
        let terminator = if self.terminator.is_ascii() {
            self.terminator as u8
        } else {
            b'>'
        };
        ChannelConfig {
            terminator,
            quiet_period: Duration::from_millis(self.quiet_period_ms),
        }
    }

    pub(crate) fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub(crate) fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.obd_timeout_ms, 300);
        assert_eq!(config.j1939_timeout_ms, 500);
        assert_eq!(config.transient_retries, 1);
        assert_eq!(config.live_pids.len(), 16);
        assert_eq!(config.channel_config().terminator, b'>');
        assert_eq!(config.channel_config().quiet_period, Duration::from_millis(150));
    }

    #[test]
    fn test_partial_override() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"obd_timeout_ms": 800, "live_pids": ["Rpm", "Speed"]}"#)
                .unwrap();
        assert_eq!(config.obd_timeout_ms, 800);
        assert_eq!(config.live_pids, vec![Pid::Rpm, Pid::Speed]);
        assert_eq!(config.j1939_timeout_ms, 500);
    }

    #[test]
    fn test_non_ascii_terminator_falls_back() {
        let config = SessionConfig {
            terminator: 'é',
            ..SessionConfig::default()
        };
        assert_eq!(config.channel_config().terminator, b'>');
    }
}
