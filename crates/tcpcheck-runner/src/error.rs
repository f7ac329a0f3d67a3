//! Probe error types

use std::io;

/// The probe budget ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection timed out")]
pub struct DeadlineExceeded;

/// Failures inside a single probe stage
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("connection timed out")]
    DeadlineExceeded,
    #[error("Cannot resolve {0}: {1}")]
    Resolve(String, String),
    #[error("No usable address for {0}")]
    NoAddress(String),
    #[error("Short write: {written} of {expected} bytes sent")]
    PartialWrite { written: usize, expected: usize },
    #[error("TLS handshake failed: {0}")]
    Tls(String),
    #[error("TLS support not available")]
    TlsUnavailable,
    #[error("{0}")]
    Io(String),
}

impl ProbeError {
    /// Classify an I/O error from a call bounded by the remaining budget
    ///
    /// Every blocking call is given exactly the remaining budget as its
    /// timeout, so a timed-out call means the budget is gone.
    #[must_use]
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::DeadlineExceeded,
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<DeadlineExceeded> for ProbeError {
    fn from(_: DeadlineExceeded) -> Self {
        Self::DeadlineExceeded
    }
}

impl From<io::Error> for ProbeError {
    fn from(err: io::Error) -> Self {
        Self::from_io(&err)
    }
}
