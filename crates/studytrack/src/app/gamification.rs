//! Scoring workflows: session rewards, achievements, levels, streaks, and
//! daily challenges.

use std::sync::Arc;

use serde::Serialize;
use time::Date;

use crate::app::AppServices;
use crate::db::{AchievementGrant, Database, SessionRow};
use crate::domain::achievement::{DAILY_GOAL_MINUTES, UserAggregates, condition_met};
use crate::domain::dates::{format_date, parse_date, today_utc};
use crate::domain::level::{LevelUp, detect_level_up, level_name, level_threshold};
use crate::domain::points::{PointsBreakdown, session_points};
use crate::domain::stats::round1;
use crate::domain::streak::{STREAK_WINDOW_DAYS, consecutive_study_days};
use crate::{Error, Result};

/// Points awarded for the "complete one session today" challenge.
const CHALLENGE_SESSION_POINTS: i64 = 50;

/// Points awarded for the "study 60 minutes today" challenge.
const CHALLENGE_MINUTES_POINTS: i64 = 100;

/// Points awarded for the "average productivity of 7" challenge.
const CHALLENGE_PRODUCTIVITY_POINTS: i64 = 75;

/// Points awarded for the "7-day streak" challenge.
const CHALLENGE_STREAK_POINTS: i64 = 200;

/// Everything a single session completion earned, returned to the caller in
/// one payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionRewards {
    pub points: PointsBreakdown,
    pub streak_days: i64,
    pub unlocked_achievements: Vec<EarnedAchievement>,
    pub level_up: Option<LevelUp>,
}

/// One achievement granted during an evaluation pass.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct EarnedAchievement {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub points: i64,
}

/// A user's position within the level ladder.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserProgress {
    pub achievements_unlocked: i64,
    pub level: i64,
    pub level_name: String,
    pub points_for_next_level: i64,
    pub points_into_level: i64,
    pub progress_percentage: f64,
    pub rank: Option<i64>,
    pub streak_days: i64,
    pub total_hours: f64,
    pub total_minutes: i64,
    pub total_points: i64,
    pub total_sessions: i64,
}

/// One of the rotating daily challenges with its current progress.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyChallenge {
    pub id: &'static str,
    pub title: &'static str,
    pub target: f64,
    pub progress: f64,
    pub points: i64,
    pub completed: bool,
}

/// Implements the reward pipeline on top of the database layer.
pub struct GamificationManager {
    services: Arc<AppServices>,
}

impl GamificationManager {
    /// Creates a manager over the shared services.
    pub fn new(services: Arc<AppServices>) -> Self {
        Self { services }
    }

    fn db(&self) -> &Database {
        self.services.db()
    }

    /// Returns the length of the user's current study streak as of today.
    ///
    /// # Errors
    /// Returns an error if session dates cannot be read.
    pub async fn streak_now(&self, user_id: i64) -> Result<i64> {
        self.streak_on(user_id, today_utc()).await
    }

    /// Returns the streak length as of an explicit day.
    ///
    /// # Errors
    /// Returns an error if session dates cannot be read or parsed.
    pub async fn streak_on(&self, user_id: i64, today: Date) -> Result<i64> {
        let dates = self.study_dates(user_id).await?;

        Ok(consecutive_study_days(&dates, today))
    }

    /// Evaluates every reward a completed session earns and commits them in
    /// one transaction: the session points, any newly satisfied achievements,
    /// and a level-up bonus when the new totals cross a threshold.
    ///
    /// The session must already be persisted as completed so that streaks and
    /// achievement aggregates see it.
    ///
    /// # Errors
    /// Returns an error if the user is missing or any query fails. No reward
    /// is applied on failure.
    pub async fn process_session_completion(
        &self,
        session: &SessionRow,
        today: Date,
    ) -> Result<SessionRewards> {
        let user = self
            .db()
            .get_user(session.user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;

        let streak_days = self.streak_on(session.user_id, today).await?;
        let points = session_points(session.duration_minutes, session.productivity_score, streak_days);

        let (aggregates, ledger_total_before) =
            self.aggregates(session.user_id, streak_days).await?;
        let unlocked = self.pending_achievements(session.user_id, &aggregates).await?;
        let achievement_points: i64 = unlocked.iter().map(|earned| earned.points).sum();

        let total_after = ledger_total_before + points.total + achievement_points;
        let level_up = detect_level_up(user.level, total_after);

        let grants: Vec<AchievementGrant> = unlocked
            .iter()
            .map(|earned| AchievementGrant {
                achievement_id: earned.id,
                points: earned.points,
            })
            .collect();

        self.db()
            .commit_session_rewards(
                session.user_id,
                session.id,
                points.total,
                &grants,
                level_up.as_ref(),
            )
            .await?;

        tracing::info!(
            user_id = session.user_id,
            session_id = session.id,
            points = points.total,
            streak_days,
            achievements = unlocked.len(),
            leveled_up = level_up.is_some(),
            "committed session rewards"
        );

        Ok(SessionRewards {
            points,
            streak_days,
            unlocked_achievements: unlocked,
            level_up,
        })
    }

    /// Grants every active achievement whose condition the user now satisfies
    /// and does not already hold. Running this twice grants nothing new.
    ///
    /// # Errors
    /// Returns an error if aggregates cannot be read or a grant fails.
    pub async fn evaluate_achievements(
        &self,
        user_id: i64,
        today: Date,
    ) -> Result<Vec<EarnedAchievement>> {
        let streak_days = self.streak_on(user_id, today).await?;
        let (aggregates, _) = self.aggregates(user_id, streak_days).await?;
        let unlocked = self.pending_achievements(user_id, &aggregates).await?;

        for earned in &unlocked {
            self.db()
                .grant_achievement(user_id, earned.id, earned.points)
                .await?;
            tracing::info!(user_id, achievement = %earned.name, "granted achievement");
        }

        Ok(unlocked)
    }

    /// Promotes the user when their ledger total has outgrown the stored
    /// level, crediting the level-up bonus.
    ///
    /// A single call performs at most one promotion, directly to the level
    /// the total maps to.
    ///
    /// # Errors
    /// Returns an error if the user is missing or the promotion fails.
    pub async fn check_level_up(&self, user_id: i64) -> Result<Option<LevelUp>> {
        let user = self
            .db()
            .get_user(user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;
        let total_points = self.db().sum_user_points(user_id).await?;

        let Some(level_up) = detect_level_up(user.level, total_points) else {
            return Ok(None);
        };

        self.db().record_level_up(user_id, &level_up).await?;
        tracing::info!(
            user_id,
            old_level = level_up.old_level,
            new_level = level_up.new_level,
            "user leveled up"
        );

        Ok(Some(level_up))
    }

    /// Reports where the user stands within their current level.
    ///
    /// # Errors
    /// Returns an error if the user is missing or the ledger cannot be read.
    pub async fn user_progress(&self, user_id: i64, today: Date) -> Result<UserProgress> {
        let user = self
            .db()
            .get_user(user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;
        let stats = self.db().user_stats(user_id).await?;
        let rank = self.db().user_rank(user_id).await?.map(|row| row.rank);
        let streak_days = self.streak_on(user_id, today).await?;

        let current_threshold = level_threshold(user.level);
        let next_threshold = level_threshold(user.level + 1);
        let points_into_level = (stats.total_points - current_threshold).max(0);
        let points_for_next_level = next_threshold - current_threshold;

        #[allow(clippy::cast_precision_loss)]
        let progress_percentage = round1(
            (points_into_level as f64 / points_for_next_level as f64 * 100.0).clamp(0.0, 100.0),
        );
        #[allow(clippy::cast_precision_loss)]
        let total_hours = round1(stats.total_minutes as f64 / 60.0);

        Ok(UserProgress {
            achievements_unlocked: stats.total_achievements,
            level: user.level,
            level_name: level_name(user.level),
            points_for_next_level,
            points_into_level,
            progress_percentage,
            rank,
            streak_days,
            total_hours,
            total_minutes: stats.total_minutes,
            total_points: stats.total_points,
            total_sessions: stats.total_sessions,
        })
    }

    /// Builds the user's daily challenge board for an explicit day.
    ///
    /// # Errors
    /// Returns an error if today's aggregates cannot be read.
    #[allow(clippy::cast_precision_loss)]
    pub async fn daily_challenges(&self, user_id: i64, today: Date) -> Result<Vec<DailyChallenge>> {
        let daily = self
            .db()
            .daily_aggregate(user_id, &format_date(today))
            .await?;
        let streak_days = self.streak_on(user_id, today).await?;
        let productivity = daily.avg_productivity.unwrap_or(0.0);

        Ok(vec![
            challenge(
                "daily_session",
                "Complete a study session",
                1.0,
                daily.session_count as f64,
                CHALLENGE_SESSION_POINTS,
            ),
            challenge(
                "daily_minutes",
                "Study for 60 minutes",
                60.0,
                daily.total_minutes as f64,
                CHALLENGE_MINUTES_POINTS,
            ),
            // Completion checks the unrounded average; the board shows 1 dp.
            DailyChallenge {
                id: "productivity_goal",
                title: "Average a productivity of 7 or higher",
                target: 7.0,
                progress: round1(productivity),
                points: CHALLENGE_PRODUCTIVITY_POINTS,
                completed: productivity >= 7.0,
            },
            challenge(
                "study_streak",
                "Keep a 7-day study streak",
                7.0,
                streak_days as f64,
                CHALLENGE_STREAK_POINTS,
            ),
        ])
    }

    /// Loads the distinct study days feeding streak detection.
    async fn study_dates(&self, user_id: i64) -> Result<Vec<Date>> {
        self.db()
            .session_dates(user_id, STREAK_WINDOW_DAYS)
            .await?
            .iter()
            .map(|raw| parse_date(raw))
            .collect()
    }

    /// Snapshots the aggregates achievement conditions are evaluated against,
    /// together with the current ledger total.
    async fn aggregates(
        &self,
        user_id: i64,
        consecutive_days: i64,
    ) -> Result<(UserAggregates, i64)> {
        let stats = self.db().user_stats(user_id).await?;
        let daily_goal_days = self
            .db()
            .daily_goal_day_count(user_id, DAILY_GOAL_MINUTES)
            .await?;
        let max_subject_minutes = self.db().max_subject_minutes(user_id).await?;

        Ok((
            UserAggregates {
                total_sessions: stats.total_sessions,
                total_minutes: stats.total_minutes,
                consecutive_days,
                daily_goal_days,
                max_subject_minutes,
            },
            stats.total_points,
        ))
    }

    /// Returns the active achievements the user satisfies but does not hold.
    async fn pending_achievements(
        &self,
        user_id: i64,
        aggregates: &UserAggregates,
    ) -> Result<Vec<EarnedAchievement>> {
        let mut unlocked = Vec::new();
        for achievement in self.db().active_achievements().await? {
            if !condition_met(
                &achievement.condition_type,
                achievement.condition_value,
                aggregates,
            ) {
                continue;
            }
            if self.db().has_achievement(user_id, achievement.id).await? {
                continue;
            }
            unlocked.push(EarnedAchievement {
                id: achievement.id,
                name: achievement.name,
                description: achievement.description,
                points: achievement.points,
            });
        }

        Ok(unlocked)
    }
}

fn challenge(
    id: &'static str,
    title: &'static str,
    target: f64,
    progress: f64,
    points: i64,
) -> DailyChallenge {
    DailyChallenge {
        id,
        title,
        target,
        progress,
        points,
        completed: progress >= target,
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::domain::dates::add_days;

    async fn seed_user_with_subject(services: &Arc<AppServices>) -> (i64, i64) {
        let user_id = services
            .db()
            .insert_user("mira")
            .await
            .expect("failed to insert user");
        let subject_id = services
            .db()
            .insert_subject(user_id, "Algebra", "#1e66f5", 5, 1)
            .await
            .expect("failed to insert subject");

        (user_id, subject_id)
    }

    async fn seed_completed_session(
        services: &Arc<AppServices>,
        user_id: i64,
        subject_id: i64,
        date: Date,
        duration_minutes: i64,
        productivity_score: Option<i64>,
    ) -> SessionRow {
        let session_id = services
            .db()
            .insert_session(user_id, subject_id, &format_date(date), 1_700_000_000, "")
            .await
            .expect("failed to insert session");
        services
            .db()
            .complete_session(
                session_id,
                1_700_000_000 + duration_minutes * 60,
                duration_minutes,
                0,
                productivity_score,
                "",
            )
            .await
            .expect("failed to complete session");

        services
            .db()
            .get_session(session_id)
            .await
            .expect("failed to load session")
            .expect("session missing")
    }

    #[tokio::test]
    async fn test_session_completion_awards_points_with_streak_bonus() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = GamificationManager::new(Arc::clone(&services));
        let (user_id, subject_id) = seed_user_with_subject(&services).await;
        let today = date!(2026 - 03 - 10);
        for offset in 1..3 {
            seed_completed_session(
                &services,
                user_id,
                subject_id,
                add_days(today, -offset),
                30,
                None,
            )
            .await;
        }
        let session =
            seed_completed_session(&services, user_id, subject_id, today, 90, Some(9)).await;

        // Act
        let rewards = manager
            .process_session_completion(&session, today)
            .await
            .expect("failed to process completion");

        // Assert
        assert_eq!(rewards.streak_days, 3);
        assert_eq!(rewards.points.base, 90);
        assert_eq!(rewards.points.productivity_bonus, 45);
        assert_eq!(rewards.points.streak_bonus, 10);
        assert_eq!(rewards.points.total, 145);
        assert!(rewards.unlocked_achievements.is_empty());
        assert!(rewards.level_up.is_none());
        assert_eq!(
            services
                .db()
                .sum_user_points(user_id)
                .await
                .expect("failed to sum points"),
            145
        );
    }

    #[tokio::test]
    async fn test_session_completion_grants_achievement_and_counts_its_bonus() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = GamificationManager::new(Arc::clone(&services));
        let (user_id, subject_id) = seed_user_with_subject(&services).await;
        services
            .db()
            .insert_achievement("First Steps", "Complete a session", "total_sessions", 1, 50)
            .await
            .expect("failed to insert achievement");
        let today = date!(2026 - 03 - 10);
        let session =
            seed_completed_session(&services, user_id, subject_id, today, 60, None).await;

        // Act
        let rewards = manager
            .process_session_completion(&session, today)
            .await
            .expect("failed to process completion");

        // Assert
        assert_eq!(rewards.unlocked_achievements.len(), 1);
        assert_eq!(rewards.unlocked_achievements[0].name, "First Steps");
        // 60 session points plus the 50-point achievement bonus.
        assert_eq!(
            services
                .db()
                .sum_user_points(user_id)
                .await
                .expect("failed to sum points"),
            110
        );
    }

    #[tokio::test]
    async fn test_evaluate_achievements_is_idempotent() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = GamificationManager::new(Arc::clone(&services));
        let (user_id, subject_id) = seed_user_with_subject(&services).await;
        services
            .db()
            .insert_achievement("Marathon", "Study 100 minutes", "total_minutes", 100, 75)
            .await
            .expect("failed to insert achievement");
        let today = date!(2026 - 03 - 10);
        seed_completed_session(&services, user_id, subject_id, today, 120, None).await;

        // Act
        let first = manager
            .evaluate_achievements(user_id, today)
            .await
            .expect("failed to evaluate achievements");
        let second = manager
            .evaluate_achievements(user_id, today)
            .await
            .expect("failed to evaluate achievements");

        // Assert
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(
            services
                .db()
                .sum_user_points(user_id)
                .await
                .expect("failed to sum points"),
            75
        );
    }

    #[tokio::test]
    async fn test_check_level_up_promotes_once_to_the_mapped_level() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = GamificationManager::new(Arc::clone(&services));
        let (user_id, _) = seed_user_with_subject(&services).await;
        services
            .db()
            .append_point_entry(user_id, 5_000, "study_session", None)
            .await
            .expect("failed to append entry");

        // Act
        let level_up = manager
            .check_level_up(user_id)
            .await
            .expect("failed to check level");

        // Assert
        let level_up = level_up.expect("level up missing");
        assert_eq!(level_up.old_level, 1);
        assert_eq!(level_up.new_level, 3);
        assert_eq!(level_up.level_name, "Pupil");
        assert_eq!(level_up.bonus_points, 300);
        let user = services
            .db()
            .get_user(user_id)
            .await
            .expect("failed to load user")
            .expect("user missing");
        assert_eq!(user.level, 3);
        // The bonus alone does not reach the next threshold.
        assert!(
            manager
                .check_level_up(user_id)
                .await
                .expect("failed to check level")
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_user_progress_reports_position_within_level() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = GamificationManager::new(Arc::clone(&services));
        let (user_id, subject_id) = seed_user_with_subject(&services).await;
        services
            .db()
            .append_point_entry(user_id, 500, "study_session", None)
            .await
            .expect("failed to append entry");
        seed_completed_session(
            &services,
            user_id,
            subject_id,
            date!(2026 - 03 - 09),
            90,
            Some(8),
        )
        .await;

        // Act
        let progress = manager
            .user_progress(user_id, date!(2026 - 03 - 10))
            .await
            .expect("failed to load progress");

        // Assert
        assert_eq!(progress.level, 1);
        assert_eq!(progress.level_name, "Beginner");
        assert_eq!(progress.total_points, 500);
        assert_eq!(progress.points_into_level, 500);
        assert_eq!(progress.points_for_next_level, 2_000);
        assert!((progress.progress_percentage - 25.0).abs() < f64::EPSILON);
        assert_eq!(progress.achievements_unlocked, 0);
        assert_eq!(progress.streak_days, 0);
        assert_eq!(progress.rank, Some(1));
        assert_eq!(progress.total_sessions, 1);
        assert_eq!(progress.total_minutes, 90);
        assert!((progress.total_hours - 1.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_daily_challenges_track_todays_activity() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = GamificationManager::new(Arc::clone(&services));
        let (user_id, subject_id) = seed_user_with_subject(&services).await;
        let today = date!(2026 - 03 - 10);
        seed_completed_session(&services, user_id, subject_id, today, 45, Some(8)).await;

        // Act
        let challenges = manager
            .daily_challenges(user_id, today)
            .await
            .expect("failed to load challenges");

        // Assert
        assert_eq!(challenges.len(), 4);
        let by_id = |id: &str| {
            challenges
                .iter()
                .find(|challenge| challenge.id == id)
                .expect("challenge missing")
        };
        assert!(by_id("daily_session").completed);
        let minutes = by_id("daily_minutes");
        assert!((minutes.progress - 45.0).abs() < f64::EPSILON);
        assert!(!minutes.completed);
        assert!(by_id("productivity_goal").completed);
        let streak = by_id("study_streak");
        assert!((streak.progress - 1.0).abs() < f64::EPSILON);
        assert!(!streak.completed);
    }

    #[tokio::test]
    async fn test_productivity_challenge_compares_the_unrounded_average() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = GamificationManager::new(Arc::clone(&services));
        let (user_id, subject_id) = seed_user_with_subject(&services).await;
        let today = date!(2026 - 03 - 10);
        seed_completed_session(&services, user_id, subject_id, today, 30, Some(6)).await;
        seed_completed_session(&services, user_id, subject_id, today, 30, Some(7)).await;

        // Act
        let challenges = manager
            .daily_challenges(user_id, today)
            .await
            .expect("failed to load challenges");

        // Assert
        let productivity = challenges
            .iter()
            .find(|challenge| challenge.id == "productivity_goal")
            .expect("challenge missing");
        assert!((productivity.progress - 6.5).abs() < f64::EPSILON);
        assert!(!productivity.completed);
    }
}
