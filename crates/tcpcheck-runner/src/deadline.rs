//! Probe budget enforcement
//!
//! One [`Deadline`] covers the whole probe. Instead of an alarm signal, the
//! remaining budget is handed to every blocking call (name lookup, connect
//! timeout, socket read/write timeouts, the post-send delay), so any call in
//! flight when the budget runs out returns promptly and the connection is
//! dropped on the way out.

use std::time::{Duration, Instant};

use tracing::warn;

use tcpcheck_core::Verdict;

use crate::error::DeadlineExceeded;

/// Overall time budget for one probe
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start the countdown now
    #[must_use]
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    #[must_use]
    pub fn budget(&self) -> Duration {
        self.budget
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Remaining budget, suitable as a socket timeout (never zero)
    ///
    /// # Errors
    ///
    /// Returns [`DeadlineExceeded`] once the budget is spent.
    pub fn budget_left(&self) -> Result<Duration, DeadlineExceeded> {
        let remaining = self.remaining();
        if remaining.is_zero() {
            Err(DeadlineExceeded)
        } else {
            Ok(remaining)
        }
    }

    /// Sleep for `pause`, or until the budget runs out
    ///
    /// # Errors
    ///
    /// Returns [`DeadlineExceeded`] if the budget ends before `pause` does.
    pub fn sleep(&self, pause: Duration) -> Result<(), DeadlineExceeded> {
        let remaining = self.budget_left()?;
        if pause >= remaining {
            std::thread::sleep(remaining);
            return Err(DeadlineExceeded);
        }
        std::thread::sleep(pause);
        Ok(())
    }
}

/// Run `work` inside the deadline envelope
///
/// A probe that reports [`DeadlineExceeded`], or that finishes only after the
/// budget is spent, yields an indeterminate verdict regardless of how far it
/// got.
pub fn run_with_deadline<F>(deadline: &Deadline, work: F) -> Verdict
where
    F: FnOnce(&Deadline) -> Result<Verdict, DeadlineExceeded>,
{
    match work(deadline) {
        Ok(verdict) if !deadline.is_expired() => verdict,
        Ok(_) | Err(DeadlineExceeded) => {
            warn!(
                budget_secs = deadline.budget().as_secs_f64(),
                "probe abandoned: budget exhausted"
            );
            Verdict::indeterminate(deadline.elapsed())
        }
    }
}
