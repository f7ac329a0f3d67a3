//! Health states for a single probe
//!
//! The state maps one-to-one onto the monitoring-plugin exit status convention.

use serde::{Deserialize, Serialize};

/// Final health classification of one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Service answered as expected within thresholds (exit 0)
    Healthy,
    /// Service is up but answered unexpectedly or slowly (exit 1)
    Degraded,
    /// Service unreachable, silent, or critically slow (exit 2)
    Failed,
    /// Probe could not finish, result is untrustworthy (exit 3)
    Indeterminate,
}

impl State {
    /// Process exit status for this state
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Failed => 2,
            Self::Indeterminate => 3,
        }
    }

    /// Plugin-style status word
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "OK",
            Self::Degraded => "WARNING",
            Self::Failed => "CRITICAL",
            Self::Indeterminate => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
