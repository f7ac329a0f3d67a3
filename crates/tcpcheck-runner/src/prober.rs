//! One probe, start to finish

use std::time::Instant;

use tracing::{debug, info};

use tcpcheck_core::{
    ConfigError, MatchOutcome, ProbeConfig, ResponseBuffer, SessionOutcome,
    StatusCodes, Verdict, compose, match_response,
};

use crate::connector::connect;
use crate::deadline::{Deadline, run_with_deadline};
use crate::error::DeadlineExceeded;
use crate::exchange::{Exchange, exchange};

/// Runs a validated [`ProbeConfig`] against its target
#[derive(Debug, Clone)]
pub struct Prober {
    config: ProbeConfig,
}

impl Prober {
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found by [`ProbeConfig::validate`].
    pub fn new(config: ProbeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Connect, exchange, match and compose a verdict within the timeout
    ///
    /// Never fails: every network problem is folded into the verdict.
    #[must_use]
    pub fn run(&self) -> Verdict {
        let config = &self.config;
        info!(
            host = %config.host,
            port = config.port,
            transport = %config.transport,
            timeout_secs = config.timeout.as_secs_f64(),
            "probing"
        );

        let verdict = run_with_deadline(&Deadline::start(config.timeout), |d| self.probe(d));

        info!(
            state = %verdict.state(),
            elapsed_secs = verdict.elapsed_secs(),
            detail = verdict.detail(),
            "probe finished"
        );
        verdict
    }

    fn probe(&self, deadline: &Deadline) -> Result<Verdict, DeadlineExceeded> {
        let config = &self.config;
        let started = Instant::now();

        let (connected, conn) = connect(config, deadline).take();
        debug!(outcome = ?connected, "connect stage done");

        let Exchange { buffer, outcome } = match conn {
            Some(conn) => exchange(conn, config, deadline)?,
            None => Exchange {
                buffer: ResponseBuffer::new(config.max_bytes),
                outcome: SessionOutcome::NotStarted,
            },
        };
        let elapsed = started.elapsed();

        let response = buffer.text();
        let matched = if outcome == SessionOutcome::Completed {
            match_response(
                &response,
                &config.expect,
                StatusCodes {
                    warning: &config.warning_codes,
                    critical: &config.critical_codes,
                },
            )
        } else {
            MatchOutcome::NotEvaluated
        };
        debug!(session = ?outcome, matched = ?matched, bytes = buffer.len(), "exchange stage done");

        Ok(compose(&connected, &outcome, &matched, &response, elapsed, config))
    }
}

/// Shorthand for `Prober::new(config)?.run()`
///
/// # Errors
///
/// Returns a [`ConfigError`] if the configuration is invalid; no connection is
/// attempted in that case.
pub fn probe(config: ProbeConfig) -> Result<Verdict, ConfigError> {
    Ok(Prober::new(config)?.run())
}
