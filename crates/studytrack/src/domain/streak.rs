//! Consecutive-study-day streak derivation.

use time::Date;

/// How many distinct study dates the store fetches for a streak walk. A
/// streak longer than this reports as exactly this value; documented
/// limitation, not a bug.
pub const STREAK_WINDOW_DAYS: i64 = 30;

/// Counts the unbroken run of study days ending today.
///
/// `study_dates` must hold distinct calendar dates in descending order. The
/// walk starts at `today`, so a user who studied yesterday but not today has
/// a streak of 0 — yesterday only counts once today's chain reaches it.
pub fn consecutive_study_days(study_dates: &[Date], today: Date) -> i64 {
    let mut consecutive = 0;
    let mut expected = today;

    for &study_date in study_dates {
        if study_date != expected {
            break;
        }
        consecutive += 1;
        let Some(previous) = expected.previous_day() else {
            break;
        };
        expected = previous;
    }

    consecutive
}
