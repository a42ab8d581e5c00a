//! Decode Error

use thiserror::Error;

/// A reply did not match the byte layout expected for the request.
///
/// Carries the raw adapter text so a protocol mismatch can be diagnosed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode {what} from response {raw:?}")]
pub struct DecodeError {
    /// What was being decoded (e.g. "PID 0C", "DM1")
    pub what: String,
    /// The raw response text
    pub raw: String,
}

impl DecodeError {
    /// Create a decode error for `what` with the offending raw text
    pub fn new(what: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            raw: raw.into(),
        }
    }
}
