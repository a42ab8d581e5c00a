//! CLI Configuration
//!
//! Loaded from an optional TOML file, then `DIAG_` environment variables
//! (`DIAG_PROFILE=j1939`, `DIAG_SESSION__OBD_TIMEOUT_MS=800`).

use adapter_link::DEFAULT_BAUD_RATE;
use diag_session::{Profile, SessionConfig};
use serde::Deserialize;

/// How the adapter is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// WiFi adapter, TCP socket
    Tcp,
    /// Bluetooth SPP or USB serial port
    Serial,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when RUST_LOG is unset (default: "info")
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Adapter link settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Transport kind (default: tcp)
    pub kind: TransportKind,
    /// Adapter socket address (default: 192.168.0.10:35000)
    pub address: String,
    /// TCP connect timeout (default: 5000ms)
    pub connect_timeout_ms: u64,
    /// Serial device path (default: /dev/rfcomm0)
    pub serial_path: String,
    /// Serial baud rate (default: 38400)
    pub baud_rate: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Tcp,
            address: "192.168.0.10:35000".to_string(),
            connect_timeout_ms: 5000,
            serial_path: "/dev/rfcomm0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Complete CLI configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Vehicle protocol profile (default: obd2)
    pub profile: Profile,
    /// Adapter link
    pub link: LinkConfig,
    /// Logging
    pub log: LogConfig,
    /// Session timeouts and live-data selection
    pub session: SessionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: Profile::Obd2,
            link: LinkConfig::default(),
            log: LogConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path` (if given) and the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder
            .add_source(
                config::Environment::with_prefix("DIAG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
