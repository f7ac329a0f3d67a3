//! tcpcheck-core: Core types and verdict logic for single-probe health checks
//!
//! This crate holds everything about a probe that does not touch the network:
//! the configuration, the service profile table, the response buffer, the
//! response matcher, and the verdict composer.

pub mod config;
pub mod matcher;
pub mod profile;
pub mod response;
pub mod verdict;

pub use config::{AddressFamily, ConfigError, ProbeConfig, RefusalPolicy, TransportKind};
pub use matcher::{MatchOutcome, StatusCodes, match_response};
pub use profile::ServiceProfile;
pub use response::ResponseBuffer;
pub use verdict::{ConnectOutcome, SessionOutcome, State, Verdict, compose};
