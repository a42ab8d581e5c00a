//! Adapter Link
//!
//! Byte transports for ELM327-compatible diagnostic adapters (WiFi socket,
//! Bluetooth/USB serial, scripted mock) and the command channel that keeps
//! exactly one command in flight on them.

mod channel;
mod error;
mod mock;
mod serial;
mod tcp;
mod transport;

pub use channel::{ChannelConfig, CommandChannel, ResponseBuffer};
pub use error::LinkError;
pub use mock::{MockHandle, MockReply, MockTransport};
pub use serial::{SerialTransport, DEFAULT_BAUD_RATE};
pub use tcp::TcpTransport;
pub use transport::{Inbound, Transport};
