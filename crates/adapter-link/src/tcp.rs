//! TCP Transport
//!
//! WiFi ELM327 adapters expose the command interface on a plain TCP socket
//! (typically 192.168.0.10:35000).

use crate::error::LinkError;
use crate::transport::{spawn_reader, Inbound, Transport};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::info;

/// Default connect timeout for WiFi adapters
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Transport over a TCP socket
pub struct TcpTransport {
    addr: String,
    connect_timeout: Duration,
    writer: Option<OwnedWriteHalf>,
    reader: Option<JoinHandle<()>>,
}

impl TcpTransport {
    /// Create a transport for `addr` ("host:port"); nothing is opened yet
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            writer: None,
            reader: None,
        }
    }

    /// Override the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self) -> Result<Inbound, LinkError> {
        info!("Connecting to adapter at {}", self.addr);
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| LinkError::Timeout(self.connect_timeout.as_millis() as u64))??;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
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
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
            info!("Closed adapter socket {}", self.addr);
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_round_trip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"ATI\r");
            socket.write_all(b"ELM327 v1.5\r\r>").await.unwrap();
        });

        let mut transport = TcpTransport::new(&addr);
        let mut inbound = transport.open().await.unwrap();
        transport.write(b"ATI\r").await.unwrap();

        let mut received = Vec::new();
        while !received.ends_with(b">") {
            received.extend(inbound.recv().await.unwrap());
        }
        assert_eq!(received, b"ELM327 v1.5\r\r>");

        transport.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_write_before_open_fails() {
        let mut transport = TcpTransport::new("127.0.0.1:1");
        assert_eq!(transport.write(b"ATZ\r").await, Err(LinkError::NotOpen));
    }
}
