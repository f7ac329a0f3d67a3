//! tcpcheck-runner: Network side of a single-probe health check
//!
//! Resolves and connects to the target, runs the scripted exchange under one
//! overall deadline, and hands the stage outcomes to
//! [`tcpcheck_core::compose`].

pub mod connector;
pub mod deadline;
pub mod error;
pub mod exchange;
pub mod prober;
pub mod transport;

pub use connector::{Connection, connect};
pub use deadline::{Deadline, run_with_deadline};
pub use error::{DeadlineExceeded, ProbeError};
pub use exchange::{Exchange, exchange};
pub use prober::{Prober, probe};
pub use transport::{PlainTransport, Transport};
#[cfg(feature = "tls")]
pub use transport::SecureTransport;
