//! Transport Capability
//!
//! The engine only ever talks to a [`Transport`]; whether bytes travel over
//! a Bluetooth serial profile or a WiFi socket is the binding's concern.

use crate::error::LinkError;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Stream of inbound byte chunks. A closed stream means the link dropped.
pub type Inbound = mpsc::Receiver<Vec<u8>>;

/// Depth of the inbound chunk queue
pub(crate) const INBOUND_CAPACITY: usize = 64;

/// Bidirectional byte channel to a diagnostic adapter
#[async_trait]
pub trait Transport: Send {
    /// Establish the connection and return the inbound chunk stream
    async fn open(&mut self) -> Result<Inbound, LinkError>;

    /// Write raw bytes to the adapter
    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Release the connection. Calling it twice is harmless.
    async fn close(&mut self);

    /// Human-readable endpoint description for logs
    fn describe(&self) -> String;
}

/// Pump an async reader into an inbound chunk queue until EOF or error
pub(crate) fn spawn_reader<R>(mut reader: R, label: String) -> (Inbound, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
    let handle = tokio::spawn(async move {
        let mut buf = [0u8; 256];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    debug!("{}: end of stream", label);
                    break;
                }
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{}: read error: {}", label, e);
                    break;
                }
            }
        }
    });
    (rx, handle)
}
