//! Vehicle Diagnostics CLI
//!
//! Connects to an ELM327-compatible adapter, runs one diagnostic request
//! and prints the decoded result as JSON on stdout. Logs go to stderr.
//!
//! ```bash
//! vdiag --address 192.168.0.10:35000 faults
//! vdiag --transport serial --serial-path /dev/rfcomm0 --profile j1939 live --count 5
//! ```

mod settings;

use adapter_link::{SerialTransport, TcpTransport, Transport};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use diag_session::{DiagnosticEngine, Profile, SessionHandle};
use serde::Serialize;
use settings::{AppConfig, LinkConfig, LogConfig, TransportKind};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "vdiag")]
#[command(about = "Read trouble codes and live data through an ELM327 adapter")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Vehicle protocol profile
    #[arg(short, long, value_parser = parse_profile)]
    profile: Option<Profile>,

    /// Transport kind
    #[arg(short, long, value_enum)]
    transport: Option<TransportKind>,

    /// Adapter socket address (TCP)
    #[arg(short, long)]
    address: Option<String>,

    /// Serial device path
    #[arg(long)]
    serial_path: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud_rate: Option<u32>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Adapter identification and supply voltage
    Info,
    /// Active trouble codes
    Faults,
    /// Previously active trouble codes (J1939)
    PreviousFaults,
    /// Clear trouble codes
    Clear,
    /// Live data samples
    Live {
        /// Number of samples
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
        /// Delay between samples in milliseconds
        #[arg(short, long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Vehicle identification number (OBD-II)
    Vin,
    /// EV battery readings (OBD-II)
    Battery,
}

fn parse_profile(value: &str) -> Result<Profile, String> {
    match value.to_ascii_lowercase().as_str() {
        "obd2" | "obd" => Ok(Profile::Obd2),
        "j1939" => Ok(Profile::J1939),
        other => Err(format!("unknown profile {other:?} (expected obd2 or j1939)")),
    }
}

impl Args {
    /// Command-line flags win over file and environment
    fn apply(&self, config: &mut AppConfig) {
        if let Some(profile) = self.profile {
            config.profile = profile;
        }
        if let Some(kind) = self.transport {
            config.link.kind = kind;
        }
        if let Some(address) = &self.address {
            config.link.address = address.clone();
        }
        if let Some(path) = &self.serial_path {
            config.link.serial_path = path.clone();
        }
        if let Some(baud_rate) = self.baud_rate {
            config.link.baud_rate = baud_rate;
        }
        if self.json_logs {
            config.log.json = true;
        }
    }
}

/// Initialize logging
fn init_logging(log: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if log.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn build_transport(link: &LinkConfig) -> Box<dyn Transport> {
    match link.kind {
        TransportKind::Tcp => Box::new(
            TcpTransport::new(&link.address)
                .with_connect_timeout(Duration::from_millis(link.connect_timeout_ms)),
        ),
        TransportKind::Serial => Box::new(SerialTransport::new(&link.serial_path, link.baud_rate)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(engine: &DiagnosticEngine, session: &SessionHandle, command: Command) -> Result<()> {
    match command {
        Command::Info => {
            let adapter = session.session().adapter_id().await;
            let voltage = session.session().read_adapter_voltage().await?;
            print_json(&serde_json::json!({
                "adapter": adapter,
                "profile": session.profile(),
                "voltage": voltage,
            }))
        }
        Command::Faults => print_json(&engine.read_fault_codes(session).await?),
        Command::PreviousFaults => print_json(&engine.read_previous_fault_codes(session).await?),
        Command::Clear => {
            engine.clear_fault_codes(session).await?;
            print_json(&serde_json::json!({ "cleared": true }))
        }
        Command::Live { count, interval_ms } => {
            for i in 0..count {
                if i > 0 {
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
                print_json(&engine.read_live_data(session).await?)?;
            }
            Ok(())
        }
        Command::Vin => print_json(&engine.read_vin(session).await?),
        Command::Battery => print_json(&engine.read_ev_battery(session).await?),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;
    args.apply(&mut config);
    init_logging(&config.log)?;

    info!("=== Vehicle Diagnostics v{} ===", env!("CARGO_PKG_VERSION"));

    let link = config.link.clone();
    let engine = DiagnosticEngine::with_config(
        move |_profile: Profile| -> Box<dyn Transport> { build_transport(&link) },
        config.session.clone(),
    );
    let session = engine
        .connect(config.profile)
        .await
        .context("connecting to adapter")?;

    let result = run(&engine, &session, args.command).await;
    if let Err(err) = &result {
        warn!("Request failed: {:#}", err);
    }
    engine.disconnect(&session).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_names() {
        assert_eq!(parse_profile("J1939"), Ok(Profile::J1939));
        assert_eq!(parse_profile("obd"), Ok(Profile::Obd2));
        assert!(parse_profile("kwp").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "vdiag",
            "--profile",
            "j1939",
            "--transport",
            "serial",
            "--serial-path",
            "/dev/ttyUSB1",
            "live",
            "-n",
            "3",
        ]);
        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(config.profile, Profile::J1939);
        assert_eq!(config.link.kind, TransportKind::Serial);
        assert_eq!(config.link.serial_path, "/dev/ttyUSB1");
        assert!(matches!(args.command, Command::Live { count: 3, .. }));
    }
}
