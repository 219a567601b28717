//! Level thresholds derived from cumulative points.
//!
//! Thresholds are triangular: moving from level 1 to 2 costs 2000 points,
//! from 2 to 3 another 3000, and so on. Reaching level `L` therefore requires
//! `sum(k * 1000 for k in 2..=L)` cumulative points.

use serde::Serialize;

/// Points multiplier per level step.
const POINTS_PER_LEVEL_STEP: i64 = 1000;

/// Bonus points credited per new level on a level-up.
pub const LEVEL_UP_BONUS_PER_LEVEL: i64 = 100;

/// Named tiers for the first ten levels.
const LEVEL_NAMES: [&str; 10] = [
    "Beginner",
    "Student",
    "Pupil",
    "Undergraduate",
    "Specialist",
    "Expert",
    "Master",
    "Adept",
    "Genius",
    "Grandmaster",
];

/// A detected level transition.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LevelUp {
    pub old_level: i64,
    pub new_level: i64,
    pub level_name: String,
    pub bonus_points: i64,
}

/// Maps cumulative points to a level. Monotonic in `total_points`, with
/// `level_for_points(0) == 1`.
pub fn level_for_points(total_points: i64) -> i64 {
    if total_points < POINTS_PER_LEVEL_STEP {
        return 1;
    }

    let mut level = 1;
    let mut required_points = 0;
    while total_points >= required_points {
        level += 1;
        required_points += level * POINTS_PER_LEVEL_STEP;
    }

    level - 1
}

/// Returns the cumulative points needed to reach `level`.
pub fn level_threshold(level: i64) -> i64 {
    (2..=level).map(|step| step * POINTS_PER_LEVEL_STEP).sum()
}

/// Returns the display name for a level; levels past the named tiers fall
/// back to a generated label.
pub fn level_name(level: i64) -> String {
    usize::try_from(level)
        .ok()
        .and_then(|index| index.checked_sub(1))
        .and_then(|index| LEVEL_NAMES.get(index))
        .map_or_else(|| format!("Level {level}"), |name| (*name).to_string())
}

/// Builds the level-up record for a stored-vs-computed level comparison, or
/// `None` when no upgrade happened. The bonus is `new_level * 100`; crediting
/// it never re-triggers a second check within the same call.
pub fn detect_level_up(stored_level: i64, total_points: i64) -> Option<LevelUp> {
    let new_level = level_for_points(total_points);
    if new_level <= stored_level {
        return None;
    }

    Some(LevelUp {
        old_level: stored_level,
        new_level,
        level_name: level_name(new_level),
        bonus_points: new_level * LEVEL_UP_BONUS_PER_LEVEL,
    })
}
