//! Diagnostic Engine
//!
//! Entry point for callers: opens sessions through a transport factory and
//! routes diagnostic requests to them.

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::session::{AdapterSession, Profile, SessionState};
use adapter_link::Transport;
use diag_core::{EvBatteryStatus, FaultRecord, LiveDataSample};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Supplies a fresh, unopened transport for each new session
pub trait TransportFactory: Send + Sync {
    /// Create the transport for a session speaking `profile`
    fn create(&self, profile: Profile) -> Box<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn(Profile) -> Box<dyn Transport> + Send + Sync,
{
    fn create(&self, profile: Profile) -> Box<dyn Transport> {
        self(profile)
    }
}

/// Caller's reference to a connected session
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<AdapterSession>,
}

impl SessionHandle {
    /// Protocol profile of the session
    pub fn profile(&self) -> Profile {
        self.session.profile()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.session.subscribe()
    }

    /// The underlying session, for the operations the engine does not route
    pub fn session(&self) -> &AdapterSession {
        &self.session
    }
}

/// Vehicle diagnostic engine
pub struct DiagnosticEngine {
    factory: Arc<dyn TransportFactory>,
    config: SessionConfig,
}

impl DiagnosticEngine {
    /// Create an engine with default session settings
    pub fn new(factory: impl TransportFactory + 'static) -> Self {
        Self::with_config(factory, SessionConfig::default())
    }

    /// Create an engine with explicit session settings
    pub fn with_config(factory: impl TransportFactory + 'static, config: SessionConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            config,
        }
    }

    /// Session settings applied to new sessions
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a transport and initialize the adapter for `profile`
    pub async fn connect(&self, profile: Profile) -> Result<SessionHandle, SessionError> {
        let session = Arc::new(AdapterSession::new(profile, self.config.clone()));
        session.connect(self.factory.create(profile)).await?;
        info!("Session established ({})", profile);
        Ok(SessionHandle { session })
    }

    /// Read active trouble codes
    pub async fn read_fault_codes(
        &self,
        handle: &SessionHandle,
    ) -> Result<Vec<FaultRecord>, SessionError> {
        handle.session.read_faults().await
    }

    /// Read previously active trouble codes (J1939 only)
    pub async fn read_previous_fault_codes(
        &self,
        handle: &SessionHandle,
    ) -> Result<Vec<FaultRecord>, SessionError> {
        handle.session.read_previous_faults().await
    }

    /// Clear trouble codes
    pub async fn clear_fault_codes(&self, handle: &SessionHandle) -> Result<(), SessionError> {
        handle.session.clear_faults().await
    }

    /// Read one live-data sample
    pub async fn read_live_data(&self, handle: &SessionHandle) -> Result<LiveDataSample, SessionError> {
        handle.session.read_live_data().await
    }

    /// Read EV battery readings (OBD-II only)
    pub async fn read_ev_battery(
        &self,
        handle: &SessionHandle,
    ) -> Result<Option<EvBatteryStatus>, SessionError> {
        handle.session.read_ev_battery().await
    }

    /// Read the VIN (OBD-II only)
    pub async fn read_vin(&self, handle: &SessionHandle) -> Result<Option<String>, SessionError> {
        handle.session.read_vin().await
    }

    /// Close the session, aborting any pending command
    pub async fn disconnect(&self, handle: &SessionHandle) {
        handle.session.disconnect().await;
    }
}
