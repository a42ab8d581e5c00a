//! Mock Transport
//!
//! Scripted ELM327 stand-in for tests and demos: replies are keyed by the
//! command text, may be delayed, split into chunks, or withheld entirely.

use crate::error::LinkError;
use crate::transport::{Inbound, Transport, INBOUND_CAPACITY};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Reply to an unknown command
const UNKNOWN_COMMAND_REPLY: &str = "?";

/// One scripted adapter reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockReply {
    bytes: Vec<u8>,
    chunk_size: Option<usize>,
    delay: Duration,
}

impl MockReply {
    /// Reply text followed by the ELM327 line ending and `>` prompt
    pub fn text(text: &str) -> Self {
        Self::raw(format!("{}\r\r>", text).as_bytes())
    }

    /// Exact bytes, no prompt appended
    pub fn raw(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            chunk_size: None,
            delay: Duration::ZERO,
        }
    }

    /// No reply at all (the command will time out)
    pub fn silent() -> Self {
        Self::raw(&[])
    }

    /// Deliver the reply after `delay`
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Deliver the reply in chunks of `size` bytes
    pub fn chunked(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    fn chunks(&self) -> Vec<Vec<u8>> {
        match self.chunk_size {
            Some(size) => self.bytes.chunks(size).map(<[u8]>::to_vec).collect(),
            None if self.bytes.is_empty() => Vec::new(),
            None => vec![self.bytes.clone()],
        }
    }
}

#[derive(Default)]
struct MockScript {
    replies: HashMap<String, VecDeque<MockReply>>,
    written: Vec<String>,
    inbound: Option<mpsc::Sender<Vec<u8>>>,
    open_count: usize,
    refuse_open: bool,
    open_delay: Duration,
}

impl MockScript {
    /// Queued replies are consumed in order; the last one keeps answering.
    fn next_reply(&mut self, command: &str) -> MockReply {
        match self.replies.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(MockReply::silent),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| MockReply::text(UNKNOWN_COMMAND_REPLY)),
            None => MockReply::text(UNKNOWN_COMMAND_REPLY),
        }
    }
}

fn lock(script: &Mutex<MockScript>) -> MutexGuard<'_, MockScript> {
    script.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared handle onto a [`MockTransport`]'s script, usable after the
/// transport has been moved into a channel
#[derive(Clone)]
pub struct MockHandle {
    script: Arc<Mutex<MockScript>>,
}

impl MockHandle {
    /// Queue a reply for `command`
    pub fn reply(&self, command: &str, reply: MockReply) {
        lock(&self.script)
            .replies
            .entry(command.to_uppercase())
            .or_default()
            .push_back(reply);
    }

    /// Replace every queued reply for `command`
    pub fn set_reply(&self, command: &str, reply: MockReply) {
        let mut script = lock(&self.script);
        let queue = script.replies.entry(command.to_uppercase()).or_default();
        queue.clear();
        queue.push_back(reply);
    }

    /// Raw frames written so far, including the trailing carriage return
    pub fn written(&self) -> Vec<String> {
        lock(&self.script).written.clone()
    }

    /// Commands written so far, without framing
    pub fn commands(&self) -> Vec<String> {
        lock(&self.script)
            .written
            .iter()
            .map(|frame| frame.trim_end_matches('\r').to_string())
            .collect()
    }

    /// How many times `command` has been written
    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| c.as_str() == command).count()
    }

    /// Number of times the transport has been opened
    pub fn open_count(&self) -> usize {
        lock(&self.script).open_count
    }

    /// Make subsequent `open` calls fail
    pub fn refuse_open(&self, refuse: bool) {
        lock(&self.script).refuse_open = refuse;
    }

    /// Make subsequent `open` calls take `delay` before completing
    pub fn delay_open(&self, delay: Duration) {
        lock(&self.script).open_delay = delay;
    }

    /// Push bytes that were not requested by any command
    pub fn inject(&self, bytes: &[u8]) -> bool {
        match lock(&self.script).inbound.as_ref() {
            Some(tx) => tx.try_send(bytes.to_vec()).is_ok(),
            None => false,
        }
    }

    /// Simulate the adapter dropping the link
    pub fn drop_link(&self) {
        lock(&self.script).inbound = None;
    }
}

/// Scripted in-memory transport
pub struct MockTransport {
    script: Arc<Mutex<MockScript>>,
    open: bool,
}

impl MockTransport {
    /// Empty script: every command answers `?`
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(MockScript::default())),
            open: false,
        }
    }

    /// Script preloaded with a well-behaved ELM327's configuration replies
    pub fn elm327() -> Self {
        let transport = Self::new();
        let handle = transport.handle();
        handle.reply("ATZ", MockReply::text("\rELM327 v1.5"));
        for command in ["ATE0", "ATL0", "ATS0", "ATH0", "ATH1", "ATSP0", "ATSPA"] {
            handle.reply(command, MockReply::text("OK"));
        }
        handle.reply("ATRV", MockReply::text("12.6V"));
        transport
    }

    /// Handle for scripting and inspection
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            script: Arc::clone(&self.script),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&mut self) -> Result<Inbound, LinkError> {
        let delay = lock(&self.script).open_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut script = lock(&self.script);
        if script.refuse_open {
            return Err(LinkError::Io("mock adapter refused connection".to_string()));
        }
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        script.inbound = Some(tx);
        script.open_count += 1;
        self.open = true;
        Ok(rx)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if !self.open {
            return Err(LinkError::NotOpen);
        }
        let frame = String::from_utf8_lossy(bytes).into_owned();
        let command = frame.trim().to_uppercase();

        let (reply, tx) = {
            let mut script = lock(&self.script);
            script.written.push(frame);
            let reply = script.next_reply(&command);
            (reply, script.inbound.clone())
        };
        let tx = tx.ok_or(LinkError::TransportClosed)?;
        debug!("mock: {} -> {:?}", command, String::from_utf8_lossy(&reply.bytes));

        let chunks = reply.chunks();
        let delay = reply.delay;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            for chunk in chunks {
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
        });
        Ok(())
    }

    async fn close(&mut self) {
        self.open = false;
        lock(&self.script).inbound = None;
    }

    fn describe(&self) -> String {
        "mock://elm327".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_reply_is_delivered() {
        let mut transport = MockTransport::elm327();
        let mut inbound = transport.open().await.unwrap();
        transport.write(b"ATE0\r").await.unwrap();
        assert_eq!(inbound.recv().await.unwrap(), b"OK\r\r>");
        assert_eq!(transport.handle().written(), vec!["ATE0\r".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_command_answers_question_mark() {
        let mut transport = MockTransport::new();
        let mut inbound = transport.open().await.unwrap();
        transport.write(b"0902\r").await.unwrap();
        assert_eq!(inbound.recv().await.unwrap(), b"?\r\r>");
    }

    #[tokio::test]
    async fn test_reply_queue_keeps_last_reply() {
        let mut transport = MockTransport::new();
        let handle = transport.handle();
        handle.reply("03", MockReply::text("430106"));
        handle.reply("03", MockReply::text("4300"));
        let mut inbound = transport.open().await.unwrap();

        for expected in [&b"430106\r\r>"[..], b"4300\r\r>", b"4300\r\r>"] {
            transport.write(b"03\r").await.unwrap();
            assert_eq!(inbound.recv().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_chunked_reply() {
        let mut transport = MockTransport::new();
        transport
            .handle()
            .reply("010C", MockReply::text("410C1F40").chunked(4));
        let mut inbound = transport.open().await.unwrap();
        transport.write(b"010C\r").await.unwrap();
        assert_eq!(inbound.recv().await.unwrap(), b"410C");
        assert_eq!(inbound.recv().await.unwrap(), b"1F40");
    }

    #[tokio::test]
    async fn test_refused_open() {
        let mut transport = MockTransport::new();
        transport.handle().refuse_open(true);
        assert!(transport.open().await.is_err());
        assert_eq!(transport.write(b"ATZ\r").await, Err(LinkError::NotOpen));
    }
}
