//! Achievement catalog conditions and their evaluation.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Condition kinds an achievement can be gated on. Catalog rows carry these
/// as strings; unknown strings never evaluate as met.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// Completed session count reaches the threshold.
    TotalSessions,
    /// Summed studied minutes reach the threshold.
    TotalMinutes,
    /// Current streak reaches the threshold (days).
    ConsecutiveDays,
    /// Number of days with at least 60 studied minutes reaches the threshold
    /// (the threshold is a day count, not minutes).
    DailyGoal,
    /// Largest per-subject minute total reaches the threshold (hours).
    SubjectMastery,
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionKind::TotalSessions => write!(f, "total_sessions"),
            ConditionKind::TotalMinutes => write!(f, "total_minutes"),
            ConditionKind::ConsecutiveDays => write!(f, "consecutive_days"),
            ConditionKind::DailyGoal => write!(f, "daily_goal"),
            ConditionKind::SubjectMastery => write!(f, "subject_mastery"),
        }
    }
}

impl FromStr for ConditionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "total_sessions" => Ok(ConditionKind::TotalSessions),
            "total_minutes" => Ok(ConditionKind::TotalMinutes),
            "consecutive_days" => Ok(ConditionKind::ConsecutiveDays),
            "daily_goal" => Ok(ConditionKind::DailyGoal),
            "subject_mastery" => Ok(ConditionKind::SubjectMastery),
            _ => Err(format!("Unknown condition kind: {s}")),
        }
    }
}

/// Aggregates an achievement condition is evaluated against. One snapshot is
/// computed per evaluation pass and shared by every catalog entry.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UserAggregates {
    pub total_sessions: i64,
    pub total_minutes: i64,
    pub consecutive_days: i64,
    /// Days whose summed duration reached the 60-minute daily goal.
    pub daily_goal_days: i64,
    /// Largest cumulative minute total across the user's subjects.
    pub max_subject_minutes: i64,
}

/// Minutes a day must accumulate to count toward `daily_goal` conditions.
pub const DAILY_GOAL_MINUTES: i64 = 60;

/// Evaluates whether a condition is satisfied by the given aggregates.
/// `condition_type` strings that do not name a known kind are never met.
pub fn condition_met(condition_type: &str, condition_value: i64, stats: &UserAggregates) -> bool {
    let Ok(kind) = ConditionKind::from_str(condition_type) else {
        return false;
    };

    match kind {
        ConditionKind::TotalSessions => stats.total_sessions >= condition_value,
        ConditionKind::TotalMinutes => stats.total_minutes >= condition_value,
        ConditionKind::ConsecutiveDays => stats.consecutive_days >= condition_value,
        ConditionKind::DailyGoal => stats.daily_goal_days >= condition_value,
        // The threshold is in hours; compare in minutes to avoid float math.
        ConditionKind::SubjectMastery => stats.max_subject_minutes >= condition_value * 60,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregates() -> UserAggregates {
        UserAggregates {
            total_sessions: 12,
            total_minutes: 700,
            consecutive_days: 5,
            daily_goal_days: 4,
            max_subject_minutes: 150,
        }
    }

    #[test]
    fn test_condition_kind_round_trips_through_strings() {
        for kind in [
            ConditionKind::TotalSessions,
            ConditionKind::TotalMinutes,
            ConditionKind::ConsecutiveDays,
            ConditionKind::DailyGoal,
            ConditionKind::SubjectMastery,
        ] {
            let parsed: ConditionKind = kind
                .to_string()
                .parse()
                .expect("failed to parse condition kind");
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_total_sessions_and_minutes_compare_against_threshold() {
        let stats = aggregates();

        assert!(condition_met("total_sessions", 12, &stats));
        assert!(!condition_met("total_sessions", 13, &stats));
        assert!(condition_met("total_minutes", 700, &stats));
        assert!(!condition_met("total_minutes", 701, &stats));
    }

    #[test]
    fn test_consecutive_days_uses_streak() {
        let stats = aggregates();

        assert!(condition_met("consecutive_days", 5, &stats));
        assert!(!condition_met("consecutive_days", 7, &stats));
    }

    #[test]
    fn test_daily_goal_threshold_is_a_day_count() {
        let stats = aggregates();

        assert!(condition_met("daily_goal", 4, &stats));
        assert!(!condition_met("daily_goal", 5, &stats));
    }

    #[test]
    fn test_subject_mastery_threshold_is_in_hours() {
        let stats = aggregates();

        // 150 minutes is 2.5 hours.
        assert!(condition_met("subject_mastery", 2, &stats));
        assert!(!condition_met("subject_mastery", 3, &stats));
    }

    #[test]
    fn test_unknown_condition_type_is_never_met() {
        assert!(!condition_met("single_session", 0, &aggregates()));
        assert!(!condition_met("", 0, &aggregates()));
    }
}
