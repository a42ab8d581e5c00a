//! Adapter Session
//!
//! Connection lifecycle of one ELM327-compatible adapter and the
//! diagnostic operations available once it is initialized.

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::policy::{classify, is_rejected, ReplyClass, RetryPolicy, Verdict};
use adapter_link::{CommandChannel, LinkError, Transport};
use diag_core::{unix_millis, DecodeError, EvBatteryStatus, FaultRecord, LiveDataSample, Protocol};
use obd_protocol::{ElmProtocol, SupportedPids, EV_QUERIES};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Adapter reset command; answers with the adapter identification
const RESET: &str = "ATZ";

/// Configuration sent after the reset, before the protocol selector:
/// echo off, linefeeds off, spaces off, headers on
const SETUP_COMMANDS: [&str; 4] = ["ATE0", "ATL0", "ATS0", "ATH1"];

/// Adapter supply voltage query
const READ_VOLTAGE: &str = "ATRV";

/// Vehicle protocol family a session speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Light vehicles, automatic OBD-II protocol detection
    Obd2,
    /// Heavy duty, SAE J1939 over CAN
    J1939,
}

impl Profile {
    /// Wire protocol of fault records from this profile
    pub fn protocol(&self) -> Protocol {
        match self {
            Profile::Obd2 => Protocol::Obd2,
            Profile::J1939 => Protocol::J1939,
        }
    }

    /// Protocol the adapter is told to speak
    pub fn elm_protocol(&self) -> ElmProtocol {
        match self {
            Profile::Obd2 => ElmProtocol::Auto,
            Profile::J1939 => ElmProtocol::SaeJ1939,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.protocol())
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No transport
    Disconnected,
    /// Opening the transport
    Connecting,
    /// Running the adapter init sequence
    Initializing,
    /// Accepting diagnostic requests
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
        };
        f.write_str(name)
    }
}

fn init_failed(step: &str, reason: impl Into<String>) -> SessionError {
    SessionError::ConnectionFailed {
        step: step.to_string(),
        reason: reason.into(),
    }
}

/// One adapter connection and its command channel
pub struct AdapterSession {
    profile: Profile,
    config: SessionConfig,
    policy: RetryPolicy,
    channel: CommandChannel,
    state: watch::Sender<SessionState>,
    adapter_id: Mutex<Option<String>>,
    /// Supported-PID bitmap, queried once per connection
    supported: Mutex<Option<SupportedPids>>,
    /// Whether the vehicle answered any battery query, once probed
    ev_capable: Mutex<Option<bool>>,
}

/// Final reply to a request once retries are spent
enum Answer {
    /// Reply carrying data for the codec
    Data(String),
    /// Transient reply; text of the last attempt
    Nothing(String),
}

impl AdapterSession {
    /// Create a disconnected session
    pub fn new(profile: Profile, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            profile,
            policy: RetryPolicy {
                transient_retries: config.transient_retries,
            },
            channel: CommandChannel::new(config.channel_config()),
            config,
            state,
            adapter_id: Mutex::new(None),
            supported: Mutex::new(None),
            ev_capable: Mutex::new(None),
        }
    }

    /// Protocol profile of this session
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Identification the adapter printed on reset, e.g. "ELM327 v1.5"
    pub async fn adapter_id(&self) -> Option<String> {
        self.adapter_id.lock().await.clone()
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Session state {} -> {}", previous, next);
        }
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Ready => Ok(()),
            other => Err(SessionError::NotReady(other)),
        }
    }

    fn command_timeout(&self) -> Duration {
        let ms = match self.profile {
            Profile::Obd2 => self.config.obd_timeout_ms,
            Profile::J1939 => self.config.j1939_timeout_ms,
        };
        Duration::from_millis(ms)
    }

    /// Open `transport` and initialize the adapter.
    ///
    /// Any failure releases the transport and leaves the session
    /// disconnected.
    pub async fn connect(&self, transport: Box<dyn Transport>) -> Result<(), SessionError> {
        if self.state() != SessionState::Disconnected {
            self.disconnect().await;
        }
        self.forget_vehicle().await;
        let target = transport.describe();
        info!("Connecting to {} ({})", target, self.profile);

        self.set_state(SessionState::Connecting);
        if let Err(err) = self.channel.open(transport).await {
            warn!("Failed to open {}: {}", target, err);
            self.set_state(SessionState::Disconnected);
            return Err(init_failed("open", err.to_string()));
        }
        if self.state() != SessionState::Connecting {
            return Err(self.connect_cancelled(&target).await);
        }

        self.set_state(SessionState::Initializing);
        match self.initialize().await {
            Ok(_) if self.state() != SessionState::Initializing => {
                Err(self.connect_cancelled(&target).await)
            }
            Ok(adapter_id) => {
                info!("Adapter {:?} ready on {}", adapter_id, target);
                *self.adapter_id.lock().await = Some(adapter_id);
                self.set_state(SessionState::Ready);
                Ok(())
            }
            Err(err) => {
                warn!("Adapter init failed: {}", err);
                self.set_state(SessionState::Disconnected);
                self.channel.close().await;
                Err(err)
            }
        }
    }

    /// A disconnect raced this connect; release whatever it opened
    async fn connect_cancelled(&self, target: &str) -> SessionError {
        info!("Connect to {} cancelled by disconnect", target);
        self.set_state(SessionState::Disconnected);
        self.channel.close().await;
        SessionError::Transport(LinkError::Aborted)
    }

    /// Run the init sequence, returning the adapter identification
    async fn initialize(&self) -> Result<String, SessionError> {
        let reply = self
            .channel
            .execute(RESET, self.config.reset_timeout())
            .await
            .map_err(|err| init_failed(RESET, err.to_string()))?;
        if classify(&reply) != ReplyClass::Data {
            return Err(init_failed(RESET, format!("unexpected reply {:?}", reply)));
        }
        // With echo still on, the first line repeats the command
        let adapter_id = reply.lines().last().unwrap_or_default().to_string();

        let selector = self.profile.elm_protocol().to_elm_command();
        for command in SETUP_COMMANDS.into_iter().chain([selector]) {
            let reply = self
                .channel
                .execute(command, self.config.init_timeout())
                .await
                .map_err(|err| init_failed(command, err.to_string()))?;
            if !reply.lines().any(|line| line.eq_ignore_ascii_case("OK")) {
                return Err(init_failed(command, format!("unexpected reply {:?}", reply)));
            }
        }
        Ok(adapter_id)
    }

    /// Abort any pending command and release the transport. Always
    /// succeeds, also when already disconnected.
    pub async fn disconnect(&self) {
        let was = self.state();
        self.set_state(SessionState::Disconnected);
        self.channel.close().await;
        self.forget_vehicle().await;
        if was != SessionState::Disconnected {
            info!("Session disconnected ({})", self.profile);
        }
    }

    /// Drop what was learned about the connected vehicle
    async fn forget_vehicle(&self) {
        *self.supported.lock().await = None;
        *self.ev_capable.lock().await = None;
    }

    async fn link_lost(&self, err: &LinkError) {
        if self.state() == SessionState::Ready {
            warn!("Adapter link lost: {}", err);
            self.set_state(SessionState::Disconnected);
            self.channel.close().await;
        }
    }

    /// Send `command` under the retry policy.
    ///
    /// `Ok(None)` means the adapter had nothing to report.
    async fn request(&self, command: &str) -> Result<Option<String>, SessionError> {
        self.request_with(command, self.command_timeout()).await
    }

    async fn request_with(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<Option<String>, SessionError> {
        match self.exchange(command, timeout).await? {
            Answer::Data(reply) => Ok(Some(reply)),
            Answer::Nothing(_) => Ok(None),
        }
    }

    async fn exchange(&self, command: &str, timeout: Duration) -> Result<Answer, SessionError> {
        self.ensure_ready()?;
        let mut attempt = 0u8;
        loop {
            let outcome = self.channel.execute(command, timeout).await;
            if let Err(err) = &outcome {
                if err.is_fatal() {
                    self.link_lost(err).await;
                }
            }
            match self.policy.judge(command, attempt, outcome) {
                Verdict::Reply(reply) => return Ok(Answer::Data(reply)),
                Verdict::Empty(reply) => return Ok(Answer::Nothing(reply)),
                Verdict::Retry => attempt = attempt.saturating_add(1),
                Verdict::Fail(err) => return Err(err),
            }
        }
    }

    /// Read active trouble codes (OBD-II Mode 03, J1939 DM1)
    pub async fn read_faults(&self) -> Result<Vec<FaultRecord>, SessionError> {
        let faults = match self.profile {
            Profile::Obd2 => {
                match self.request(&obd_protocol::build_read_stored_faults()).await? {
                    Some(raw) => obd_protocol::parse_stored_faults(&raw)?,
                    None => Vec::new(),
                }
            }
            Profile::J1939 => {
                self.read_dm(j1939_protocol::pgn::DM1, &j1939_protocol::build_read_active_faults())
                    .await?
            }
        };
        info!("Read {} active fault codes", faults.len());
        Ok(faults)
    }

    /// Read previously active trouble codes (J1939 DM2)
    pub async fn read_previous_faults(&self) -> Result<Vec<FaultRecord>, SessionError> {
        match self.profile {
            Profile::Obd2 => Err(SessionError::Unsupported(
                "Reading previously active fault codes".to_string(),
            )),
            Profile::J1939 => {
                let request = j1939_protocol::build_read_previous_faults();
                let faults = self.read_dm(j1939_protocol::pgn::DM2, &request).await?;
                info!("Read {} previously active fault codes", faults.len());
                Ok(faults)
            }
        }
    }

    async fn read_dm(&self, pgn: u16, request: &str) -> Result<Vec<FaultRecord>, SessionError> {
        match self.request(request).await? {
            Some(raw) => Ok(j1939_protocol::parse_dm_reply(pgn, &raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Clear trouble codes (OBD-II Mode 04, J1939 DM11 then DM3)
    pub async fn clear_faults(&self) -> Result<(), SessionError> {
        match self.profile {
            Profile::Obd2 => match self.request(&obd_protocol::build_clear_faults()).await? {
                Some(raw) if obd_protocol::is_clear_acknowledged(&raw) => {}
                Some(raw) => return Err(SessionError::NotAcknowledged(raw)),
                None => return Err(SessionError::NotAcknowledged("NO DATA".to_string())),
            },
            Profile::J1939 => {
                // DM11/DM3 are commonly answered by silence, but not by `?`
                for command in j1939_protocol::build_clear_faults() {
                    match self.exchange(&command, self.command_timeout()).await? {
                        Answer::Nothing(reply) if is_rejected(&reply) => {
                            warn!("{} rejected by the adapter", command);
                            return Err(SessionError::NotAcknowledged(reply));
                        }
                        Answer::Nothing(_) => debug!("{} produced no reply", command),
                        Answer::Data(_) => {}
                    }
                }
            }
        }
        info!("Fault codes cleared ({})", self.profile);
        Ok(())
    }

    /// Read one live-data sample.
    ///
    /// Fields the vehicle does not report are absent from the sample.
    pub async fn read_live_data(&self) -> Result<LiveDataSample, SessionError> {
        self.ensure_ready()?;
        let mut sample = LiveDataSample::new(unix_millis());
        match self.profile {
            Profile::Obd2 => {
                self.read_obd_live(&mut sample).await?;
                if self.config.probe_ev_battery && *self.ev_capable.lock().await != Some(false) {
                    sample.ev_battery = self.probe_ev_battery().await;
                }
            }
            Profile::J1939 => self.read_j1939_live(&mut sample).await?,
        }
        debug!("Live data sample with {} fields", sample.len());
        Ok(sample)
    }

    async fn read_obd_live(&self, sample: &mut LiveDataSample) -> Result<(), SessionError> {
        let supported = self.supported_pids().await?;
        for pid in &self.config.live_pids {
            if !supported.is_empty() && !supported.supports(pid.as_hex()) {
                continue;
            }
            if let Some(raw) = self.request(&pid.command()).await? {
                if let Some(value) = obd_protocol::parse_pid_reply(*pid, &raw)? {
                    sample.set(pid.field(), value);
                }
            }
        }
        Ok(())
    }

    /// Supported-PID bitmap; empty when the vehicle would not say, in which
    /// case every configured PID is polled
    async fn supported_pids(&self) -> Result<SupportedPids, SessionError> {
        if let Some(cached) = self.supported.lock().await.clone() {
            return Ok(cached);
        }

        let mut supported = SupportedPids::default();
        for base in SupportedPids::BASES {
            if base > 0 && !supported.has_more_after(base - 0x20) {
                break;
            }
            let Some(raw) = self.request(&obd_protocol::build_supported_pids(base)).await? else {
                break;
            };
            match obd_protocol::pid_payload(base, &raw) {
                Ok(Some(bitmap)) => supported.merge(base, &bitmap),
                Ok(None) => break,
                Err(err) => {
                    debug!("Ignoring supported-PID reply: {}", err);
                    break;
                }
            }
        }
        if supported.is_empty() {
            debug!("Supported PIDs unknown, polling all configured PIDs");
        }

        *self.supported.lock().await = Some(supported.clone());
        Ok(supported)
    }

    async fn read_j1939_live(&self, sample: &mut LiveDataSample) -> Result<(), SessionError> {
        let fields = &self.config.live_fields;
        for pgn in j1939_protocol::live_pgns(fields) {
            let Some(raw) = self.request(&j1939_protocol::build_request(pgn)).await? else {
                debug!("No {} broadcast", j1939_protocol::pgn::name(pgn));
                continue;
            };
            for (field, value) in j1939_protocol::parse_pgn_reply(pgn, &raw)? {
                if fields.contains(&field) {
                    sample.set(field, value);
                }
            }
        }
        Ok(())
    }

    /// Best-effort battery queries; never fails
    async fn probe_ev_battery(&self) -> Option<EvBatteryStatus> {
        let mut status = EvBatteryStatus::default();
        for query in EV_QUERIES {
            match self.request(query.command).await {
                Ok(Some(raw)) => match query.decode_reply(&raw) {
                    Some(value) => obd_protocol::apply_ev_reading(&mut status, query.metric, value),
                    None => debug!("Unusable {} reply {:?}", query.command, raw),
                },
                Ok(None) => debug!("{} not answered", query.command),
                Err(err) => debug!("{} failed: {}", query.command, err),
            }
        }
        let capable = !status.is_empty();
        let mut known = self.ev_capable.lock().await;
        if known.is_none() {
            if !capable {
                debug!("No battery readings, skipping the battery probe until reconnect");
            }
            *known = Some(capable);
        }
        capable.then_some(status)
    }

    /// Read EV battery readings (OBD-II only).
    ///
    /// `Ok(None)` for vehicles that answer none of the battery queries.
    pub async fn read_ev_battery(&self) -> Result<Option<EvBatteryStatus>, SessionError> {
        self.ensure_ready()?;
        match self.profile {
            Profile::Obd2 => Ok(self.probe_ev_battery().await),
            Profile::J1939 => Err(SessionError::Unsupported("Reading EV battery status".to_string())),
        }
    }

    /// Read the VIN (OBD-II Mode 09 PID 02)
    pub async fn read_vin(&self) -> Result<Option<String>, SessionError> {
        match self.profile {
            Profile::Obd2 => match self.request(&obd_protocol::build_read_vin()).await? {
                Some(raw) => Ok(obd_protocol::parse_vin(&raw)?),
                None => Ok(None),
            },
            Profile::J1939 => Err(SessionError::Unsupported("Reading the VIN".to_string())),
        }
    }

    /// Read the adapter's supply voltage in volts
    pub async fn read_adapter_voltage(&self) -> Result<Option<f64>, SessionError> {
        let Some(reply) = self.request_with(READ_VOLTAGE, self.config.init_timeout()).await? else {
            return Ok(None);
        };
        let text = reply.trim();
        text.trim_end_matches(['V', 'v'])
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| SessionError::from(DecodeError::new("adapter voltage", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapter_link::{MockReply, MockTransport};

    #[tokio::test]
    async fn test_init_sequence_obd2() {
        let mock = MockTransport::elm327();
        let handle = mock.handle();
        let session = AdapterSession::new(Profile::Obd2, SessionConfig::default());

        session.connect(Box::new(mock)).await.unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(
            handle.commands(),
            vec!["ATZ", "ATE0", "ATL0", "ATS0", "ATH1", "ATSP0"]
        );
        assert_eq!(session.adapter_id().await.as_deref(), Some("ELM327 v1.5"));
    }

    #[tokio::test]
    async fn test_init_sequence_j1939() {
        let mock = MockTransport::elm327();
        let handle = mock.handle();
        let session = AdapterSession::new(Profile::J1939, SessionConfig::default());

        session.connect(Box::new(mock)).await.unwrap();
        assert_eq!(handle.commands().last().map(String::as_str), Some("ATSPA"));
    }

    #[tokio::test]
    async fn test_reset_with_echo() {
        let mock = MockTransport::elm327();
        let handle = mock.handle();
        handle.set_reply("ATZ", MockReply::text("ATZ\r\r\rELM327 v2.1"));
        let session = AdapterSession::new(Profile::Obd2, SessionConfig::default());

        session.connect(Box::new(mock)).await.unwrap();
        assert_eq!(session.adapter_id().await.as_deref(), Some("ELM327 v2.1"));
    }

    #[tokio::test]
    async fn test_setup_step_failure() {
        let mock = MockTransport::elm327();
        let handle = mock.handle();
        handle.set_reply("ATL0", MockReply::text("?"));
        let session = AdapterSession::new(Profile::Obd2, SessionConfig::default());

        let err = session.connect(Box::new(mock)).await.unwrap_err();
        match err {
            SessionError::ConnectionFailed { step, .. } => assert_eq!(step, "ATL0"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(handle.count("ATS0"), 0);
    }

    #[tokio::test]
    async fn test_reset_error_reply() {
        let mock = MockTransport::elm327();
        mock.handle().set_reply("ATZ", MockReply::text("?"));
        let session = AdapterSession::new(Profile::Obd2, SessionConfig::default());

        let err = session.connect(Box::new(mock)).await.unwrap_err();
        assert!(matches!(err, SessionError::ConnectionFailed { ref step, .. } if step == "ATZ"));
    }

    #[tokio::test]
    async fn test_open_failure() {
        let mock = MockTransport::elm327();
        mock.handle().refuse_open(true);
        let session = AdapterSession::new(Profile::Obd2, SessionConfig::default());

        let err = session.connect(Box::new(mock)).await.unwrap_err();
        assert!(matches!(err, SessionError::ConnectionFailed { ref step, .. } if step == "open"));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_operations_require_ready() {
        let session = AdapterSession::new(Profile::Obd2, SessionConfig::default());
        assert_eq!(
            session.read_faults().await.unwrap_err(),
            SessionError::NotReady(SessionState::Disconnected)
        );
        assert!(matches!(
            session.read_live_data().await,
            Err(SessionError::NotReady(_))
        ));
        assert!(matches!(
            session.clear_faults().await,
            Err(SessionError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_state_transitions_observable() {
        let mock = MockTransport::elm327();
        let session = AdapterSession::new(Profile::Obd2, SessionConfig::default());
        let mut states = session.subscribe();
        assert_eq!(*states.borrow(), SessionState::Disconnected);

        session.connect(Box::new(mock)).await.unwrap();
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), SessionState::Ready);

        session.disconnect().await;
        assert_eq!(*states.borrow_and_update(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let session = AdapterSession::new(Profile::J1939, SessionConfig::default());
        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_adapter_voltage() {
        let mock = MockTransport::elm327();
        let session = AdapterSession::new(Profile::Obd2, SessionConfig::default());
        session.connect(Box::new(mock)).await.unwrap();

        assert_eq!(session.read_adapter_voltage().await.unwrap(), Some(12.6));
    }

    #[tokio::test]
    async fn test_obd2_has_no_previous_faults() {
        let mock = MockTransport::elm327();
        let session = AdapterSession::new(Profile::Obd2, SessionConfig::default());
        session.connect(Box::new(mock)).await.unwrap();

        assert!(matches!(
            session.read_previous_faults().await,
            Err(SessionError::Unsupported(_))
        ));
    }
}
