//! Verdict module - stage outcomes, health states, and composition

mod compose;
mod outcome;
mod state;

pub use compose::{INVALID_RESPONSE, NO_DATA, TIMED_OUT, Verdict, compose};
pub use outcome::{ConnectOutcome, SessionOutcome};
pub use state::State;
