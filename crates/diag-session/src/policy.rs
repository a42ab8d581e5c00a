//! Reply Classification and Retry Policy
//!
//! ELM327 adapters report "nothing to say" and bus failures as text in
//! place of data. Transient replies and timeouts get a bounded number of
//! retries; bus errors and everything else fail immediately.

use crate::error::SessionError;
use adapter_link::LinkError;
use tracing::warn;

/// What an adapter reply amounts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// Reply carries data for the codec
    Data,
    /// No data this time (`NO DATA`, `?`, `STOPPED`, empty, bare `SEARCHING...`)
    Transient,
    /// The adapter could not talk to the bus
    BusError,
}

const TRANSIENT_REPLIES: [&str; 3] = ["NO DATA", "?", "STOPPED"];

const BUS_ERRORS: [&str; 4] = ["UNABLE TO CONNECT", "CAN ERROR", "BUS ERROR", "BUFFER FULL"];

fn is_bus_error(line: &str) -> bool {
    BUS_ERRORS.contains(&line) || (line.starts_with("BUS INIT") && line.ends_with("ERROR"))
}

/// Status lines the adapter prints ahead of the data
fn is_progress(line: &str) -> bool {
    line == "SEARCHING..." || (line.starts_with("BUS INIT") && line.ends_with("OK"))
}

/// Classify a reply returned by the command channel
pub fn classify(reply: &str) -> ReplyClass {
    let lines: Vec<String> = reply
        .lines()
        .map(|line| line.trim().to_ascii_uppercase())
        .filter(|line| !line.is_empty())
        .collect();

    if lines.iter().any(|line| is_bus_error(line)) {
        return ReplyClass::BusError;
    }
    let transient = lines
        .iter()
        .filter(|line| !is_progress(line))
        .all(|line| TRANSIENT_REPLIES.contains(&line.as_str()));
    if transient {
        ReplyClass::Transient
    } else {
        ReplyClass::Data
    }
}

/// Whether the adapter answered `?`, i.e. did not understand the command
pub fn is_rejected(reply: &str) -> bool {
    reply.lines().any(|line| line.trim() == "?")
}

/// Outcome of one attempt as judged by the policy
#[derive(Debug, PartialEq)]
pub enum Verdict {
    /// Hand the reply to the codec
    Reply(String),
    /// Send the command again
    Retry,
    /// Nothing to decode; carries the last transient reply
    Empty(String),
    /// Give up with this error
    Fail(SessionError),
}

/// Bounded retry of transient replies and timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first
    pub transient_retries: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            transient_retries: 1,
        }
    }
}

impl RetryPolicy {
    /// Judge attempt number `attempt` (0-based) of `command`
    pub fn judge(&self, command: &str, attempt: u8, outcome: Result<String, LinkError>) -> Verdict {
        let retries_left = attempt < self.transient_retries;
        match outcome {
            Ok(reply) => match classify(&reply) {
                ReplyClass::Data => Verdict::Reply(reply),
                ReplyClass::BusError => {
                    warn!("{} failed on the bus: {:?}", command, reply);
                    Verdict::Fail(SessionError::Adapter(reply))
                }
                ReplyClass::Transient if retries_left => {
                    warn!("{} answered {:?}, retrying", command, reply);
                    Verdict::Retry
                }
                ReplyClass::Transient => Verdict::Empty(reply),
            },
            Err(LinkError::Timeout(ms)) if retries_left => {
                warn!("{} timed out after {}ms, retrying", command, ms);
                Verdict::Retry
            }
            Err(err) => Verdict::Fail(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_transient() {
        for reply in ["NO DATA", "?", "", "STOPPED", "SEARCHING...", "SEARCHING...\nNO DATA"] {
            assert_eq!(classify(reply), ReplyClass::Transient, "{reply:?}");
        }
    }

    #[test]
    fn test_classify_bus_errors() {
        for reply in [
            "UNABLE TO CONNECT",
            "SEARCHING...\nUNABLE TO CONNECT",
            "CAN ERROR",
            "BUS ERROR",
            "BUS INIT: ...ERROR",
            "BUFFER FULL",
        ] {
            assert_eq!(classify(reply), ReplyClass::BusError, "{reply:?}");
        }
    }

    #[test]
    fn test_classify_data() {
        assert_eq!(classify("410C1F40"), ReplyClass::Data);
        assert_eq!(classify("SEARCHING...\n410C1F40"), ReplyClass::Data);
        assert_eq!(classify("BUS INIT: ...OK\n4100BE3FA813"), ReplyClass::Data);
        assert_eq!(classify("12.6V"), ReplyClass::Data);
    }

    #[test]
    fn test_rejected_reply() {
        assert!(is_rejected("?"));
        assert!(is_rejected("SEARCHING...\n?"));
        assert!(!is_rejected("NO DATA"));
        assert!(!is_rejected(""));
    }

    #[test]
    fn test_transient_retried_once_then_empty() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.judge("03", 0, Ok("NO DATA".into())), Verdict::Retry);
        assert_eq!(policy.judge("03", 1, Ok("NO DATA".into())), Verdict::Empty("NO DATA".into()));
    }

    #[test]
    fn test_timeout_retried_once_then_fails() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.judge("03", 0, Err(LinkError::Timeout(300))), Verdict::Retry);
        assert_eq!(
            policy.judge("03", 1, Err(LinkError::Timeout(300))),
            Verdict::Fail(SessionError::Timeout(300))
        );
    }

    #[test]
    fn test_bus_error_not_retried() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.judge("03", 0, Ok("CAN ERROR".into())),
            Verdict::Fail(SessionError::Adapter("CAN ERROR".into()))
        );
    }

    #[test]
    fn test_link_failures_not_retried() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.judge("03", 0, Err(LinkError::TransportClosed)),
            Verdict::Fail(SessionError::Transport(LinkError::TransportClosed))
        );
        assert_eq!(
            policy.judge("03", 0, Err(LinkError::ChannelBusy)),
            Verdict::Fail(SessionError::ChannelBusy)
        );
    }

    #[test]
    fn test_zero_retries() {
        let policy = RetryPolicy {
            transient_retries: 0,
        };
        assert_eq!(policy.judge("03", 0, Ok("?".into())), Verdict::Empty("?".into()));
    }
}
