//! Serial Transport
//!
//! Bluetooth SPP adapters (bound to an rfcomm device) and USB ELM327 cables
//! both appear as a serial port.

use crate::error::LinkError;
use crate::transport::{spawn_reader, Inbound, Transport};
use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

/// Default baud rate for ELM327 serial links
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Transport over a serial port
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    writer: Option<WriteHalf<SerialStream>>,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    /// Create a transport for a serial device (e.g. "/dev/rfcomm0" or "COM3")
    pub fn new(path: &str, baud_rate: u32) -> Self {
        Self {
            path: path.to_string(),
            baud_rate,
            writer: None,
            reader: None,
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> Result<Inbound, LinkError> {
        info!("Opening serial adapter {} at {} baud", self.path, self.baud_rate);
        let stream = tokio_serial::new(&self.path, self.baud_rate).open_native_async()?;

        let (read_half, write_half) = tokio::io::split(stream);
        let (inbound, reader) = spawn_reader(read_half, self.describe());
        self.writer = Some(write_half);
        self.reader = Some(reader);
        Ok(inbound)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let writer = self.writer.as_mut().ok_or(LinkError::NotOpen)?;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if self.writer.take().is_some() {
            info!("Closed serial adapter {}", self.path);
        }
    }

    fn describe(&self) -> String {
        format!("serial://{}@{}", self.path, self.baud_rate)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
