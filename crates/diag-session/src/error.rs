//! Session Error Types

use crate::session::SessionState;
use adapter_link::LinkError;
use diag_core::DecodeError;
use thiserror::Error;

/// Errors surfaced by a diagnostic session
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// The transport could not be opened or an init command failed
    #[error("Connection failed at {step}: {reason}")]
    ConnectionFailed {
        /// Init step that failed ("open" or the AT command)
        step: String,
        /// What went wrong
        reason: String,
    },

    /// Another command is in flight on this session
    #[error("Session busy: another command is in flight")]
    ChannelBusy,

    /// The adapter did not answer in time, even after a retry
    #[error("Timeout waiting for adapter response after {0}ms")]
    Timeout(u64),

    /// The transport failed or the command was aborted
    #[error("Transport error: {0}")]
    Transport(LinkError),

    /// Operation requires a ready session
    #[error("Session not ready (state: {0})")]
    NotReady(SessionState),

    /// Reply could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The adapter reported a bus-level error
    #[error("Adapter error: {0}")]
    Adapter(String),

    /// A clear request was not positively acknowledged
    #[error("Clear not acknowledged: {0:?}")]
    NotAcknowledged(String),

    /// Operation not available for this session's protocol
    #[error("{0} is not supported on this protocol")]
    Unsupported(String),
}

impl From<LinkError> for SessionError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::ChannelBusy => SessionError::ChannelBusy,
            LinkError::Timeout(ms) => SessionError::Timeout(ms),
            other => SessionError::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_error_mapping() {
        assert_eq!(SessionError::from(LinkError::ChannelBusy), SessionError::ChannelBusy);
        assert_eq!(SessionError::from(LinkError::Timeout(300)), SessionError::Timeout(300));
        assert_eq!(
            SessionError::from(LinkError::Aborted),
            SessionError::Transport(LinkError::Aborted)
        );
    }

    #[test]
    fn test_messages() {
        let err = SessionError::ConnectionFailed {
            step: "ATE0".to_string(),
            reason: "unexpected reply \"?\"".to_string(),
        };
        assert_eq!(err.to_string(), "Connection failed at ATE0: unexpected reply \"?\"");
        assert_eq!(
            SessionError::NotReady(SessionState::Disconnected).to_string(),
            "Session not ready (state: disconnected)"
        );
    }
}
