//! Verdict composition - the single place a probe result is decided

use std::time::Duration;

use serde::{Serialize, Serializer};

use super::{ConnectOutcome, SessionOutcome, State};
use crate::config::ProbeConfig;
use crate::matcher::MatchOutcome;

/// Detail reported when the probe budget runs out
pub const TIMED_OUT: &str = "connection timed out";

/// Detail reported when the peer closed without sending anything
pub const NO_DATA: &str = "no data received from host";

/// Detail reported when no expected string matched
pub const INVALID_RESPONSE: &str = "invalid response from host";

/// Final result of one probe
///
/// Built once by [`compose`] (or [`Verdict::indeterminate`]) and read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    state: State,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_millis")]
    elapsed: Duration,
    response: String,
    detail: String,
    refused: bool,
}

impl Verdict {
    /// Result for a probe abandoned because its budget ran out
    #[must_use]
    pub fn indeterminate(elapsed: Duration) -> Self {
        Self {
            state: State::Indeterminate,
            elapsed,
            response: String::new(),
            detail: TIMED_OUT.to_string(),
            refused: false,
        }
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Elapsed time in seconds, rounded to milliseconds
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        round_millis(self.elapsed)
    }

    /// Trimmed response text (empty for connect-only or failed probes)
    #[must_use]
    pub fn response(&self) -> &str {
        &self.response
    }

    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Whether the connection was actively refused
    #[must_use]
    pub const fn refused(&self) -> bool {
        self.refused
    }

    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.state.exit_code()
    }
}

fn round_millis(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_millis(*elapsed))
}

/// Combine the stage outcomes into the final verdict.
///
/// First applicable rule wins:
///
/// 1. budget ran out while connecting → Indeterminate
/// 2. connect error → Failed
/// 3. refused → the configured refusal state
/// 4. session error, or nothing received → Failed
/// 5. response mismatch or status code → Degraded / Failed
/// 6. critical, then warning, response time threshold
/// 7. Healthy
#[must_use]
pub fn compose(
    connect: &ConnectOutcome,
    session: &SessionOutcome,
    matched: &MatchOutcome,
    response: &str,
    elapsed: Duration,
    config: &ProbeConfig,
) -> Verdict {
    let response = response.trim().to_string();
    let verdict = |state: State, detail: String| Verdict {
        state,
        elapsed,
        response: response.clone(),
        detail,
        refused: false,
    };

    match connect {
        ConnectOutcome::TimedOut => return Verdict::indeterminate(elapsed),
        ConnectOutcome::Error(detail) => return verdict(State::Failed, detail.clone()),
        ConnectOutcome::Refused => {
            return Verdict {
                state: config.refusal.state(),
                elapsed,
                response: String::new(),
                detail: "connection refused".to_string(),
                refused: true,
            };
        }
        ConnectOutcome::Connected(()) => {}
    }

    match session {
        SessionOutcome::Error(detail) => return verdict(State::Failed, detail.clone()),
        SessionOutcome::NoData => return verdict(State::Failed, NO_DATA.to_string()),
        SessionOutcome::NotStarted | SessionOutcome::Completed => {}
    }

    match matched {
        MatchOutcome::Mismatch => return verdict(State::Degraded, INVALID_RESPONSE.to_string()),
        MatchOutcome::CriticalCode { code } => {
            return verdict(State::Failed, format!("critical status code {code} in response"));
        }
        MatchOutcome::WarningCode { code } => {
            return verdict(State::Degraded, format!("warning status code {code} in response"));
        }
        MatchOutcome::NotEvaluated | MatchOutcome::Matched { .. } => {}
    }

    if let Some(limit) = config.critical_time.filter(|limit| elapsed > *limit) {
        return verdict(
            State::Failed,
            format!(
                "response time {:.3}s exceeded critical threshold {:.3}s",
                elapsed.as_secs_f64(),
                limit.as_secs_f64()
            ),
        );
    }
    if let Some(limit) = config.warning_time.filter(|limit| elapsed > *limit) {
        return verdict(
            State::Degraded,
            format!(
                "response time {:.3}s exceeded warning threshold {:.3}s",
                elapsed.as_secs_f64(),
                limit.as_secs_f64()
            ),
        );
    }

    let detail = match matched {
        MatchOutcome::Matched {
            pattern: Some(pattern),
        } => format!("matched {pattern:?}"),
        _ if response.is_empty() => "connected".to_string(),
        _ => "response received".to_string(),
    };
    verdict(State::Healthy, detail)
}
