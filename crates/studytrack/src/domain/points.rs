//! Points awarded for a completed study session.

use serde::Serialize;

/// Base points are 1 per studied minute, capped per session.
pub const MAX_BASE_POINTS: i64 = 120;

/// Flat streak bonuses by consecutive-day tier. Tiers are exclusive: only the
/// highest matching tier applies.
const STREAK_TIERS: [(i64, i64); 4] = [(30, 50), (14, 30), (7, 20), (3, 10)];

/// How one session's points decompose. Only `total` is persisted to the
/// ledger; the breakdown exists for the response payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct PointsBreakdown {
    pub base: i64,
    pub productivity_bonus: i64,
    pub streak_bonus: i64,
    pub total: i64,
}

/// Computes the points for a completed session.
///
/// An unscored session earns no productivity bonus. `consecutive_days` is the
/// streak length at evaluation time, which already includes today once the
/// completed session is persisted.
pub fn session_points(
    duration_minutes: i64,
    productivity_score: Option<i64>,
    consecutive_days: i64,
) -> PointsBreakdown {
    let base = duration_minutes.clamp(0, MAX_BASE_POINTS);
    let productivity_bonus = productivity_bonus(productivity_score, base);
    let streak_bonus = streak_bonus(consecutive_days);

    PointsBreakdown {
        base,
        productivity_bonus,
        streak_bonus,
        total: base + productivity_bonus + streak_bonus,
    }
}

fn productivity_bonus(score: Option<i64>, base: i64) -> i64 {
    match score {
        Some(score) if score >= 8 => base / 2,
        Some(score) if score >= 6 => base / 4,
        _ => 0,
    }
}

fn streak_bonus(consecutive_days: i64) -> i64 {
    STREAK_TIERS
        .iter()
        .find(|(days, _)| consecutive_days >= *days)
        .map_or(0, |(_, bonus)| *bonus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_points_is_deterministic() {
        // Arrange & Act
        let breakdown = session_points(90, Some(9), 10);

        // Assert
        assert_eq!(breakdown.base, 90);
        assert_eq!(breakdown.productivity_bonus, 45);
        assert_eq!(breakdown.streak_bonus, 20);
        assert_eq!(breakdown.total, 155);
        assert_eq!(breakdown, session_points(90, Some(9), 10));
    }

    #[test]
    fn test_base_points_cap_at_120() {
        assert_eq!(session_points(300, None, 0).base, 120);
        assert_eq!(session_points(120, None, 0).base, 120);
        assert_eq!(session_points(119, None, 0).base, 119);
    }

    #[test]
    fn test_negative_duration_earns_nothing() {
        let breakdown = session_points(-5, Some(10), 0);

        assert_eq!(breakdown.base, 0);
        assert_eq!(breakdown.productivity_bonus, 0);
        assert_eq!(breakdown.total, 0);
    }

    #[test]
    fn test_productivity_bonus_tiers() {
        assert_eq!(session_points(100, Some(8), 0).productivity_bonus, 50);
        assert_eq!(session_points(100, Some(7), 0).productivity_bonus, 25);
        assert_eq!(session_points(100, Some(6), 0).productivity_bonus, 25);
        assert_eq!(session_points(100, Some(5), 0).productivity_bonus, 0);
        assert_eq!(session_points(100, None, 0).productivity_bonus, 0);
    }

    #[test]
    fn test_productivity_bonus_floors_odd_bases() {
        // 25% of 90 is 22.5 and floors to 22.
        assert_eq!(session_points(90, Some(6), 0).productivity_bonus, 22);
        // 50% of 91 is 45.5 and floors to 45.
        assert_eq!(session_points(91, Some(9), 0).productivity_bonus, 45);
    }

    #[test]
    fn test_streak_bonus_uses_highest_matching_tier_only() {
        assert_eq!(session_points(10, None, 0).streak_bonus, 0);
        assert_eq!(session_points(10, None, 2).streak_bonus, 0);
        assert_eq!(session_points(10, None, 3).streak_bonus, 10);
        assert_eq!(session_points(10, None, 7).streak_bonus, 20);
        assert_eq!(session_points(10, None, 14).streak_bonus, 30);
        assert_eq!(session_points(10, None, 30).streak_bonus, 50);
        assert_eq!(session_points(10, None, 365).streak_bonus, 50);
    }
}
