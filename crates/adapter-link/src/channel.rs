//! Command Channel
//!
//! Serializes commands onto a [`Transport`], one in flight at a time, and
//! accumulates the adapter's reply until the `>` prompt, a quiet period, or
//! the command timeout.

use crate::error::LinkError;
use crate::transport::{Inbound, Transport};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::futures::Notified;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// ELM327 prompt character
const DEFAULT_TERMINATOR: u8 = b'>';

/// Silence after the last received byte that completes a reply lacking a
/// prompt. Empirical; tune against real adapters.
const DEFAULT_QUIET_PERIOD_MS: u64 = 150;

/// Channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Byte that marks the end of a reply
    pub terminator: u8,
    /// Silence that completes a reply with no terminator
    pub quiet_period: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            terminator: DEFAULT_TERMINATOR,
            quiet_period: Duration::from_millis(DEFAULT_QUIET_PERIOD_MS),
        }
    }
}

/// Reply bytes accumulated for the current command
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    bytes: Vec<u8>,
}

impl ResponseBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received chunk
    pub fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Discard everything accumulated
    pub fn reset(&mut self) {
        self.bytes.clear();
    }

    /// Number of accumulated bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when nothing has been received
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True once the terminator has been received
    pub fn is_terminated(&self, terminator: u8) -> bool {
        self.bytes.contains(&terminator)
    }

    /// Reply text with the terminator removed, one trimmed line per
    /// non-empty line of the reply
    pub fn text(&self, terminator: u8) -> String {
        let raw: String = String::from_utf8_lossy(&self.bytes)
            .chars()
            .filter(|&c| c != terminator as char && c != '\0')
            .collect();
        raw.split(['\r', '\n'])
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The single command allowed in flight
struct PendingCommand<'a> {
    text: &'a str,
    issued_at: Instant,
    timeout: Duration,
    sequence: u64,
}

impl PendingCommand<'_> {
    fn deadline(&self) -> Instant {
        self.issued_at + self.timeout
    }
}

struct Link {
    transport: Box<dyn Transport>,
    inbound: Inbound,
}

impl Link {
    /// Drop chunks that arrived after the previous command resolved
    fn drain_stale(&mut self) -> usize {
        let mut stale = 0;
        while let Ok(chunk) = self.inbound.try_recv() {
            stale += chunk.len();
        }
        stale
    }
}

#[derive(Default)]
struct ChannelState {
    link: Option<Link>,
    buffer: ResponseBuffer,
}

/// Clears the busy flag when a command resolves, however it resolves
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-in-flight command channel over one transport
pub struct CommandChannel {
    config: ChannelConfig,
    state: Mutex<ChannelState>,
    busy: AtomicBool,
    open: AtomicBool,
    /// Bumped on every command and every abort; a pending command whose
    /// token no longer matches is dead.
    sequence: AtomicU64,
    abort: Notify,
}

impl CommandChannel {
    /// Create a closed channel
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ChannelState::default()),
            busy: AtomicBool::new(false),
            open: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            abort: Notify::new(),
        }
    }

    /// Channel configuration
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Open `transport` and take ownership of it, replacing any previous one
    pub async fn open(&self, mut transport: Box<dyn Transport>) -> Result<(), LinkError> {
        self.close().await;
        let inbound = transport.open().await?;
        info!("Command channel opened on {}", transport.describe());

        let mut state = self.state.lock().await;
        state.buffer.reset();
        state.link = Some(Link { transport, inbound });
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Whether a transport is open
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Whether a command is in flight
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Cancel the pending command, if any. It resolves with
    /// [`LinkError::Aborted`] and its reply is discarded.
    pub fn abort_pending(&self) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        self.abort.notify_waiters();
    }

    /// Abort any pending command and release the transport
    pub async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.abort_pending();

        let link = {
            let mut state = self.state.lock().await;
            state.buffer.reset();
            state.link.take()
        };
        if let Some(mut link) = link {
            link.transport.close().await;
            info!("Command channel closed on {}", link.transport.describe());
        }
    }

    /// Send `command` and wait for its reply.
    ///
    /// Fails fast with [`LinkError::ChannelBusy`] while another command is
    /// in flight. Never retries.
    pub async fn execute(&self, command: &str, timeout: Duration) -> Result<String, LinkError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Rejecting {:?}: another command is in flight", command);
            return Err(LinkError::ChannelBusy);
        }
        let _busy = BusyGuard(&self.busy);

        // Claim a sequence before listening, so an abort aimed at the
        // previous command cannot wake this one
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let aborted = self.abort.notified();
        tokio::pin!(aborted);
        if !self.is_open() {
            return Err(LinkError::NotOpen);
        }

        let mut guard = self.state.lock().await;
        let ChannelState { link, buffer } = &mut *guard;
        let link = link.as_mut().ok_or(LinkError::NotOpen)?;

        let stale = link.drain_stale();
        if stale > 0 {
            debug!("Discarded {} stale bytes before {:?}", stale, command);
        }
        buffer.reset();

        let pending = PendingCommand {
            text: command,
            issued_at: Instant::now(),
            timeout,
            sequence,
        };

        let mut frame = Vec::with_capacity(command.len() + 1);
        frame.extend_from_slice(command.as_bytes());
        frame.push(b'\r');
        debug!("-> {}", command);
        link.transport.write(&frame).await?;

        let result = self.collect(link, buffer, &pending, aborted.as_mut()).await;
        buffer.reset();
        result
    }

    async fn collect(
        &self,
        link: &mut Link,
        buffer: &mut ResponseBuffer,
        pending: &PendingCommand<'_>,
        mut aborted: Pin<&mut Notified<'_>>,
    ) -> Result<String, LinkError> {
        let deadline = pending.deadline();
        let mut last_rx: Option<Instant> = None;

        loop {
            if self.sequence.load(Ordering::SeqCst) != pending.sequence {
                return Err(LinkError::Aborted);
            }
            let wait_until = match last_rx {
                Some(at) => (at + self.config.quiet_period).min(deadline),
                None => deadline,
            };

            tokio::select! {
                biased;
                _ = aborted.as_mut() => {
                    debug!("{:?} aborted", pending.text);
                    return Err(LinkError::Aborted);
                }
                received = tokio::time::timeout_at(wait_until, link.inbound.recv()) => match received {
                    Ok(Some(chunk)) => {
                        if self.sequence.load(Ordering::SeqCst) != pending.sequence {
                            return Err(LinkError::Aborted);
                        }
                        buffer.extend(&chunk);
                        last_rx = Some(Instant::now());
                        if buffer.is_terminated(self.config.terminator) {
                            let text = buffer.text(self.config.terminator);
                            debug!("<- {:?} ({}ms)", text, pending.issued_at.elapsed().as_millis());
                            return Ok(text);
                        }
                    }
                    Ok(None) => {
                        warn!("Transport closed while waiting for {:?}", pending.text);
                        return Err(LinkError::TransportClosed);
                    }
                    Err(_) if last_rx.is_some() && Instant::now() < deadline => {
                        let text = buffer.text(self.config.terminator);
                        debug!("<- {:?} (quiet period, no prompt)", text);
                        return Ok(text);
                    }
                    Err(_) => {
                        warn!(
                            "{:?} timed out after {}ms with {} bytes buffered",
                            pending.text,
                            pending.timeout.as_millis(),
                            buffer.len()
                        );
                        return Err(LinkError::Timeout(pending.timeout.as_millis() as u64));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockReply, MockTransport};
    use std::sync::Arc;

    const TIMEOUT: Duration = Duration::from_millis(300);

    async fn open_channel(transport: MockTransport, config: ChannelConfig) -> CommandChannel {
        let channel = CommandChannel::new(config);
        channel.open(Box::new(transport)).await.unwrap();
        channel
    }

    #[test]
    fn test_buffer_text_strips_prompt_and_blank_lines() {
        let mut buffer = ResponseBuffer::new();
        buffer.extend(b"SEARCHING...\r7E8064101\r\r>");
        assert_eq!(buffer.text(b'>'), "SEARCHING...\n7E8064101");
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_returns_trimmed_reply() {
        let transport = MockTransport::elm327();
        let handle = transport.handle();
        let channel = open_channel(transport, ChannelConfig::default()).await;

        assert_eq!(channel.execute("ATE0", TIMEOUT).await.unwrap(), "OK");
        assert_eq!(handle.written(), vec!["ATE0\r".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunked_reply_accumulates() {
        let transport = MockTransport::new();
        transport
            .handle()
            .reply("010C", MockReply::text("410C1F40").chunked(3));
        let channel = open_channel(transport, ChannelConfig::default()).await;

        assert_eq!(channel.execute("010C", TIMEOUT).await.unwrap(), "410C1F40");
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_execute_is_rejected_while_busy() {
        let transport = MockTransport::new();
        transport.handle().reply(
            "010C",
            MockReply::text("410C1F40").delayed(Duration::from_millis(100)),
        );
        let channel = Arc::new(open_channel(transport, ChannelConfig::default()).await);

        let first = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.execute("010C", TIMEOUT).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(channel.is_busy());

        assert_eq!(
            channel.execute("010D", TIMEOUT).await,
            Err(LinkError::ChannelBusy)
        );
        assert_eq!(first.await.unwrap().unwrap(), "410C1F40");
        assert!(!channel.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_configured_budget_then_clean_buffer() {
        let transport = MockTransport::elm327();
        transport.handle().reply("010C", MockReply::raw(b"410C"));
        let config = ChannelConfig {
            quiet_period: Duration::from_secs(5),
            ..Default::default()
        };
        let channel = open_channel(transport, config).await;

        let started = Instant::now();
        assert_eq!(
            channel.execute("010C", TIMEOUT).await,
            Err(LinkError::Timeout(300))
        );
        assert_eq!(started.elapsed(), TIMEOUT);

        assert_eq!(channel.execute("ATE0", TIMEOUT).await.unwrap(), "OK");
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_adapter_times_out() {
        let transport = MockTransport::new();
        transport.handle().reply("ATZ", MockReply::silent());
        let channel = open_channel(transport, ChannelConfig::default()).await;

        let started = Instant::now();
        let result = channel.execute("ATZ", Duration::from_secs(1)).await;
        assert_eq!(result, Err(LinkError::Timeout(1000)));
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_period_completes_reply_without_prompt() {
        let transport = MockTransport::new();
        transport.handle().reply("010D", MockReply::raw(b"410D28\r"));
        let channel = open_channel(transport, ChannelConfig::default()).await;

        let started = Instant::now();
        let reply = channel.execute("010D", Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply, "410D28");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_bytes_are_discarded() {
        let transport = MockTransport::elm327();
        let handle = transport.handle();
        let channel = open_channel(transport, ChannelConfig::default()).await;

        assert!(handle.inject(b"410C0FA0\r\r>"));
        assert_eq!(channel.execute("ATE0", TIMEOUT).await.unwrap(), "OK");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_aborts_pending_and_late_reply_is_never_delivered() {
        let transport = MockTransport::elm327();
        let handle = transport.handle();
        handle.reply(
            "010C",
            MockReply::text("410C1F40").delayed(Duration::from_millis(200)),
        );
        let channel = Arc::new(open_channel(transport, ChannelConfig::default()).await);

        let pending = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.execute("010C", Duration::from_secs(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        channel.close().await;
        assert_eq!(pending.await.unwrap(), Err(LinkError::Aborted));

        // Reopen and let the late reply fire before the next command.
        let reopened = MockTransport::elm327();
        reopened.handle().reply("ATI", MockReply::text("ELM327 v1.5"));
        channel.open(Box::new(reopened)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(channel.execute("ATI", TIMEOUT).await.unwrap(), "ELM327 v1.5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_abort_does_not_cancel_next_command() {
        let transport = MockTransport::elm327();
        let channel = open_channel(transport, ChannelConfig::default()).await;

        channel.abort_pending();
        assert_eq!(channel.execute("ATE0", TIMEOUT).await.unwrap(), "OK");
        channel.abort_pending();
        channel.abort_pending();
        assert_eq!(channel.execute("ATL0", TIMEOUT).await.unwrap(), "OK");
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_on_closed_channel() {
        let channel = CommandChannel::new(ChannelConfig::default());
        assert_eq!(
            channel.execute("ATZ", TIMEOUT).await,
            Err(LinkError::NotOpen)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_link_reports_transport_closed() {
        let transport = MockTransport::new();
        let handle = transport.handle();
        handle.reply("03", MockReply::silent());
        let channel = open_channel(transport, ChannelConfig::default()).await;

        handle.drop_link();
        assert_eq!(
            channel.execute("03", TIMEOUT).await,
            Err(LinkError::TransportClosed)
        );
    }
}
