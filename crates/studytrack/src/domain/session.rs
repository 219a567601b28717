//! Study-session lifecycle states.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Lifecycle state for one study session. A user has at most one `Active`
/// session at a time, enforced by the service-layer pre-check.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            _ => Err(format!("Unknown session status: {s}")),
        }
    }
}

/// Bounds for a session's productivity self-score.
pub const MIN_PRODUCTIVITY_SCORE: i64 = 1;
pub const MAX_PRODUCTIVITY_SCORE: i64 = 10;

/// Returns whether a productivity score is within the accepted 1..=10 range.
pub fn productivity_score_valid(score: i64) -> bool {
    (MIN_PRODUCTIVITY_SCORE..=MAX_PRODUCTIVITY_SCORE).contains(&score)
}

/// Converts an elapsed start/end pair into whole minutes, rounded to the
/// nearest minute, never negative.
pub fn elapsed_minutes(started_at: i64, ended_at: i64) -> i64 {
    let elapsed_seconds = (ended_at - started_at).max(0);
    (elapsed_seconds + 30) / 60
}
