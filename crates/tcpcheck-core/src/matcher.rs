//! Response matching
//!
//! Two independent checks run against the trimmed response text:
//!
//! 1. expected substrings: any one of them is enough
//! 2. status codes: a line that starts with a listed critical or warning code
//!    overrides the substring result (critical beats warning)

use serde::{Deserialize, Serialize};

/// Caller-supplied status code classification
///
/// A code counts only when it begins a line of the response; leading
/// whitespace on the line is ignored, so `"550"` matches `"  550 denied"` but
/// not `"250 ok 550"`. When both lists match, the critical code wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusCodes<'a> {
    pub warning: &'a [String],
    pub critical: &'a [String],
}

/// Result of matching one response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchOutcome {
    /// Nothing was read, so nothing was matched
    NotEvaluated,
    /// Accepted; `pattern` is the first expected string found, if any were configured
    Matched { pattern: Option<String> },
    /// None of the expected strings appeared
    Mismatch,
    /// A warning code was recognized
    WarningCode { code: String },
    /// A critical code was recognized
    CriticalCode { code: String },
}

impl MatchOutcome {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

/// Match `text` against the expected patterns and status codes
#[must_use]
pub fn match_response(text: &str, patterns: &[String], codes: StatusCodes<'_>) -> MatchOutcome {
    let trimmed = text.trim();

    if let Some(code) = find_code(trimmed, codes.critical) {
        return MatchOutcome::CriticalCode { code };
    }
    if let Some(code) = find_code(trimmed, codes.warning) {
        return MatchOutcome::WarningCode { code };
    }

    if patterns.is_empty() {
        return MatchOutcome::Matched { pattern: None };
    }

    patterns
        .iter()
        .find(|p| trimmed.contains(p.as_str()))
        .map_or(MatchOutcome::Mismatch, |p| MatchOutcome::Matched {
            pattern: Some(p.clone()),
        })
}

/// First listed code that begins some line of the response
fn find_code(text: &str, codes: &[String]) -> Option<String> {
    codes
        .iter()
        .filter(|c| !c.is_empty())
        .find(|code| {
            text.lines()
                .any(|line| line.trim_start().starts_with(code.as_str()))
        })
        .cloned()
}
