// src/io/error.rs
//
// Typed errors for the reader link.
//
// Every failure is caught at the boundary of the operation that produced it
// and surfaced as an event; nothing crosses the public API as a panic or an
// unhandled error. The Display output is the status text the survey UI has
// always shown, so callers that only render strings keep working unchanged.

use std::fmt;

/// Error raised by the reader connection.
///
/// Use `.map_err(String::from)` where a plain status string is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderError {
    /// Local Bluetooth serial stack missing, or the reader's bound channel
    /// is not present on this host.
    AdapterUnavailable,
    /// Channel establishment failed (peer unreachable, busy, permissions).
    Connect(String),
    /// Failure inside the receive loop (peer dropped, I/O error).
    Read(String),
    /// `start()` was called on a reader that is not idle.
    AlreadyStarted,
}

impl ReaderError {
    /// Adapter/channel precondition failed before dialing.
    pub fn adapter() -> Self {
        ReaderError::AdapterUnavailable
    }

    /// Channel establishment error.
    pub fn connect(message: impl Into<String>) -> Self {
        ReaderError::Connect(message.into())
    }

    /// Receive-loop error.
    pub fn read(message: impl Into<String>) -> Self {
        ReaderError::Read(message.into())
    }
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderError::AdapterUnavailable => write!(f, "Bluetooth not available"),
            ReaderError::Connect(msg) => write!(f, "Connection failed: {}", msg),
            ReaderError::Read(msg) => write!(f, "Scanning error: {}", msg),
            ReaderError::AlreadyStarted => write!(f, "Reader is already running"),
        }
    }
}

impl std::error::Error for ReaderError {}

impl From<ReaderError> for String {
    fn from(err: ReaderError) -> Self {
        err.to_string()
    }
}
