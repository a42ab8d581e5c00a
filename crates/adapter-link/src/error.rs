//! Link Error Types

use thiserror::Error;

/// Errors raised by a transport or the command channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Underlying I/O error (socket, serial port)
    #[error("Transport I/O error: {0}")]
    Io(String),

    /// No terminator or quiet period before the command timeout
    #[error("Timeout waiting for adapter response after {0}ms")]
    Timeout(u64),

    /// A command is already in flight on this channel
    #[error("Command channel busy: another command is in flight")]
    ChannelBusy,

    /// The transport closed while a command was pending
    #[error("Transport closed by peer")]
    TransportClosed,

    /// The pending command was cancelled by a disconnect
    #[error("Command aborted by disconnect")]
    Aborted,

    /// No transport is open on the channel
    #[error("Transport not open")]
    NotOpen,
}

impl LinkError {
    /// True for failures that invalidate the transport itself
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::Io(_) | LinkError::TransportClosed | LinkError::NotOpen)
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io(err.to_string())
    }
}

impl From<tokio_serial::Error> for LinkError {
    fn from(err: tokio_serial::Error) -> Self {
        LinkError::Io(err.to_string())
    }
}
