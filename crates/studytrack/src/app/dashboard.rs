//! Dashboard assembly: one payload combining today's activity, rollups,
//! progress, goals, and recent history.

use std::sync::Arc;

use serde::Serialize;
use time::Date;

use crate::app::gamification::{DailyChallenge, GamificationManager, UserProgress};
use crate::app::goals::{GoalManager, GoalView};
use crate::app::sessions::SessionView;
use crate::app::stats::{
    DEFAULT_TREND_DAYS, DailyStats, MonthlyOverview, ProductivityTrend, StatsManager,
    WeeklyOverview,
};
use crate::app::AppServices;
use crate::db::Database;
use crate::domain::dates::{format_date, today_utc, week_start};
use crate::domain::goal::{GoalStatus, progress_percentage};
use crate::{Error, Result};

/// Sessions shown in the dashboard history strip.
const RECENT_SESSION_COUNT: i64 = 5;

/// Achievements shown in the dashboard trophy strip.
const RECENT_ACHIEVEMENT_COUNT: usize = 3;

/// One subject with its progress toward the weekly target.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubjectProgress {
    pub id: i64,
    pub name: String,
    pub color: String,
    pub target_minutes: i64,
    pub studied_minutes: i64,
    pub progress_percentage: f64,
}

/// One earned achievement shown on the dashboard.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct AchievementSummary {
    pub achievement_id: i64,
    pub name: String,
    pub description: String,
    pub points: i64,
    pub earned_at: i64,
}

/// The full dashboard payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Dashboard {
    pub today: DailyStats,
    pub weekly: WeeklyOverview,
    pub monthly: MonthlyOverview,
    pub progress: UserProgress,
    pub streak_days: i64,
    pub challenges: Vec<DailyChallenge>,
    pub recent_sessions: Vec<SessionView>,
    pub active_goals: Vec<GoalView>,
    pub subject_progress: Vec<SubjectProgress>,
    pub recent_achievements: Vec<AchievementSummary>,
    pub trend: ProductivityTrend,
}

/// Assembles the dashboard from the other managers.
pub struct DashboardManager {
    services: Arc<AppServices>,
}

impl DashboardManager {
    /// Creates a manager over the shared services.
    pub fn new(services: Arc<AppServices>) -> Self {
        Self { services }
    }

    fn db(&self) -> &Database {
        self.services.db()
    }

    /// Builds the dashboard as of today.
    ///
    /// # Errors
    /// Returns an error if the user is missing or any query fails.
    pub async fn dashboard_now(&self, user_id: i64) -> Result<Dashboard> {
        self.dashboard_on(user_id, today_utc()).await
    }

    /// Builds the dashboard as of an explicit day.
    ///
    /// # Errors
    /// Returns an error if the user is missing or any query fails.
    pub async fn dashboard_on(&self, user_id: i64, today: Date) -> Result<Dashboard> {
        self.db()
            .get_user(user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;

        let stats = StatsManager::new(Arc::clone(&self.services));
        let gamification = GamificationManager::new(Arc::clone(&self.services));
        let goals = GoalManager::new(Arc::clone(&self.services));

        let daily = stats.daily_stats(user_id, today).await?;
        let weekly = stats.weekly_overview(user_id, today).await?;
        let monthly = stats
            .monthly_overview(user_id, today.year(), today.month())
            .await?;
        let progress = gamification.user_progress(user_id, today).await?;
        let streak_days = progress.streak_days;
        let challenges = gamification.daily_challenges(user_id, today).await?;
        let trend = stats
            .productivity_trend(user_id, DEFAULT_TREND_DAYS, today)
            .await?;

        let recent_sessions = self
            .db()
            .list_sessions(user_id, RECENT_SESSION_COUNT, 0)
            .await?
            .into_iter()
            .map(SessionView::from)
            .collect();
        let active_goals = goals
            .list_goals_on(user_id, Some(GoalStatus::InProgress), today)
            .await?;
        let subject_progress = self.subject_progress(user_id, today).await?;
        let recent_achievements = self
            .db()
            .user_achievements(user_id)
            .await?
            .into_iter()
            .take(RECENT_ACHIEVEMENT_COUNT)
            .map(|row| AchievementSummary {
                achievement_id: row.achievement_id,
                name: row.name,
                description: row.description,
                points: row.points,
                earned_at: row.earned_at,
            })
            .collect();

        Ok(Dashboard {
            today: daily,
            weekly,
            monthly,
            progress,
            streak_days,
            challenges,
            recent_sessions,
            active_goals,
            subject_progress,
            recent_achievements,
            trend,
        })
    }

    /// Loads each subject's progress against its weekly hour target.
    #[allow(clippy::cast_precision_loss)]
    async fn subject_progress(&self, user_id: i64, today: Date) -> Result<Vec<SubjectProgress>> {
        let start = week_start(today);
        let rows = self
            .db()
            .subject_weekly_progress(user_id, &format_date(start))
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let target_minutes = row.target_hours_per_week * 60;
                SubjectProgress {
                    id: row.id,
                    name: row.name.clone(),
                    color: row.color.clone(),
                    target_minutes,
                    studied_minutes: row.studied_minutes,
                    progress_percentage: progress_percentage(
                        row.studied_minutes as f64,
                        target_minutes as f64,
                    ),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::app::sessions::{EndSessionInput, SessionManager};

    #[tokio::test]
    async fn test_dashboard_combines_all_sections() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let sessions = SessionManager::new(Arc::clone(&services));
        let goals = GoalManager::new(Arc::clone(&services));
        let manager = DashboardManager::new(Arc::clone(&services));
        let user_id = services
            .db()
            .insert_user("mira")
            .await
            .expect("failed to insert user");
        let subject_id = services
            .db()
            .insert_subject(user_id, "Algebra", "#1e66f5", 2, 1)
            .await
            .expect("failed to insert subject");
        services
            .db()
            .insert_achievement("First Steps", "Complete a session", "total_sessions", 1, 50)
            .await
            .expect("failed to insert achievement");
        let today = date!(2026 - 03 - 10);
        let started = sessions
            .start_session_at(user_id, subject_id, "", 1_700_000_000, today)
            .await
            .expect("failed to start session");
        sessions
            .end_session_at(
                user_id,
                started.id,
                &EndSessionInput {
                    productivity_score: Some(8),
                    ..EndSessionInput::default()
                },
                1_700_000_000 + 60 * 60,
                today,
            )
            .await
            .expect("failed to end session");
        goals
            .create_goal_on(
                user_id,
                &crate::app::goals::NewGoal {
                    subject_id: Some(subject_id),
                    title: "Read 300 pages".to_string(),
                    target_value: 300.0,
                    unit: "pages".to_string(),
                    deadline: "2026-03-20".to_string(),
                    priority: 2,
                },
                today,
            )
            .await
            .expect("failed to create goal");

        // Act
        let dashboard = manager
            .dashboard_on(user_id, today)
            .await
            .expect("failed to build dashboard");

        // Assert
        assert_eq!(dashboard.today.sessions_count, 1);
        assert_eq!(dashboard.today.total_minutes, 60);
        assert_eq!(dashboard.weekly.total_minutes, 60);
        assert_eq!(dashboard.monthly.active_days, 1);
        assert_eq!(dashboard.streak_days, 1);
        // 60 base + 30 productivity bonus + 50 achievement bonus.
        assert_eq!(dashboard.progress.total_points, 140);
        assert_eq!(dashboard.recent_sessions.len(), 1);
        assert_eq!(dashboard.active_goals.len(), 1);
        assert_eq!(dashboard.recent_achievements.len(), 1);
        assert_eq!(dashboard.recent_achievements[0].name, "First Steps");
        assert_eq!(dashboard.subject_progress.len(), 1);
        assert_eq!(dashboard.subject_progress[0].target_minutes, 120);
        assert!((dashboard.subject_progress[0].progress_percentage - 50.0).abs() < f64::EPSILON);
        assert_eq!(dashboard.challenges.len(), 4);
    }

    #[tokio::test]
    async fn test_dashboard_for_missing_user_is_not_found() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = DashboardManager::new(Arc::clone(&services));

        // Act
        let result = manager.dashboard_on(42, date!(2026 - 03 - 10)).await;

        // Assert
        assert!(matches!(result, Err(Error::NotFound("user"))));
    }
}
