//! Partial outcomes produced by each probe stage

use serde::{Deserialize, Serialize};

/// Result of establishing the transport
///
/// `C` is the live connection while the probe runs; once the connection has
/// been handed to the exchanger the outcome is kept as `ConnectOutcome<()>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ConnectOutcome<C = ()> {
    Connected(C),
    /// Actively rejected by the target
    Refused,
    /// The probe budget ran out while connecting
    TimedOut,
    /// Resolution, socket or handshake failure
    Error(String),
}

impl<C> ConnectOutcome<C> {
    /// Split off the connection, keeping a handle-free record of the outcome
    pub fn take(self) -> (ConnectOutcome, Option<C>) {
        match self {
            Self::Connected(conn) => (ConnectOutcome::Connected(()), Some(conn)),
            Self::Refused => (ConnectOutcome::Refused, None),
            Self::TimedOut => (ConnectOutcome::TimedOut, None),
            Self::Error(detail) => (ConnectOutcome::Error(detail), None),
        }
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

/// Result of the send / receive exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// No connection, no exchange
    NotStarted,
    /// Exchange finished; the buffer may be empty only for connect-only probes
    Completed,
    /// The peer sent nothing before closing
    NoData,
    /// Read or write failed mid-session
    Error(String),
}
