//! Diagnostic Session Layer
//!
//! Drives an ELM327-compatible adapter through connection, initialization
//! and OBD-II or J1939 diagnostic requests. Adapter replies are classified
//! before decoding: transient "nothing to report" answers are retried
//! once and then reported as empty results; bus errors fail the request.

mod config;
mod engine;
mod error;
mod policy;
mod session;

pub use config::SessionConfig;
pub use engine::{DiagnosticEngine, SessionHandle, TransportFactory};
pub use error::SessionError;
pub use policy::{classify, is_rejected, ReplyClass, RetryPolicy, Verdict};
pub use session::{AdapterSession, Profile, SessionState};
