//! Goal status and derived progress values.
//!
//! Progress percentage and days remaining are always derived from the stored
//! target, current value and deadline; they are never persisted.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use time::Date;

use super::stats::round1;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    InProgress,
    Completed,
    Expired,
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalStatus::InProgress => write!(f, "in_progress"),
            GoalStatus::Completed => write!(f, "completed"),
            GoalStatus::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for GoalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(GoalStatus::InProgress),
            "completed" => Ok(GoalStatus::Completed),
            "expired" => Ok(GoalStatus::Expired),
            _ => Err(format!("Unknown goal status: {s}")),
        }
    }
}

/// Percentage of the target reached, clamped to 0..=100 and rounded to one
/// decimal place. A non-positive target reports 0.
pub fn progress_percentage(current_value: f64, target_value: f64) -> f64 {
    if target_value <= 0.0 {
        return 0.0;
    }

    round1((current_value / target_value * 100.0).clamp(0.0, 100.0))
}

/// Signed whole days from `today` until the deadline; negative once the
/// deadline has passed.
pub fn days_remaining(deadline: Date, today: Date) -> i64 {
    i64::from(deadline.to_julian_day()) - i64::from(today.to_julian_day())
}
