//! Goal lifecycle: creation, progress updates with auto-completion, and
//! deadline expiry.

use std::sync::Arc;

use serde::Serialize;
use time::Date;

use crate::app::{AppServices, unix_now};
use crate::db::{Database, GoalRow};
use crate::domain::dates::{format_date, parse_date, today_utc};
use crate::domain::goal::{GoalStatus, days_remaining, progress_percentage};
use crate::{Error, Result};

/// Caller-supplied fields for a new goal.
#[derive(Clone, Debug)]
pub struct NewGoal {
    pub subject_id: Option<i64>,
    pub title: String,
    pub target_value: f64,
    pub unit: String,
    /// Deadline as a `YYYY-MM-DD` date.
    pub deadline: String,
    pub priority: i64,
}

/// One goal as returned to callers, with derived progress fields.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GoalView {
    pub id: i64,
    pub subject_id: Option<i64>,
    pub title: String,
    pub target_value: f64,
    pub current_value: f64,
    pub unit: String,
    pub deadline: String,
    pub priority: i64,
    pub status: String,
    pub completed_at: Option<i64>,
    /// Progress toward the target, clamped to 0..=100 percent.
    pub progress_percentage: f64,
    /// Days until the deadline; negative once it has passed.
    pub days_remaining: i64,
}

/// Implements the goal lifecycle on top of the database layer.
pub struct GoalManager {
    services: Arc<AppServices>,
}

impl GoalManager {
    /// Creates a manager over the shared services.
    pub fn new(services: Arc<AppServices>) -> Self {
        Self { services }
    }

    fn db(&self) -> &Database {
        self.services.db()
    }

    /// Creates a goal, validating against today's date.
    ///
    /// # Errors
    /// Returns an error if the input fails validation or the subject does not
    /// belong to the user.
    pub async fn create_goal_now(&self, user_id: i64, goal: &NewGoal) -> Result<GoalView> {
        self.create_goal_on(user_id, goal, today_utc()).await
    }

    /// Creates a goal, validating against an explicit day.
    ///
    /// # Errors
    /// Returns an error if the input fails validation or the subject does not
    /// belong to the user.
    pub async fn create_goal_on(
        &self,
        user_id: i64,
        goal: &NewGoal,
        today: Date,
    ) -> Result<GoalView> {
        if goal.title.trim().is_empty() {
            return Err(Error::Validation("goal title cannot be empty".to_string()));
        }
        if goal.target_value <= 0.0 {
            return Err(Error::Validation(
                "goal target must be greater than zero".to_string(),
            ));
        }
        let deadline = parse_date(&goal.deadline)?;
        if deadline < today {
            return Err(Error::Validation(
                "goal deadline cannot be in the past".to_string(),
            ));
        }
        if let Some(subject_id) = goal.subject_id {
            let subject = self
                .db()
                .get_subject(subject_id)
                .await?
                .ok_or(Error::NotFound("subject"))?;
            if subject.user_id != user_id {
                return Err(Error::NotFound("subject"));
            }
        }

        let goal_id = self
            .db()
            .insert_goal(
                user_id,
                goal.subject_id,
                goal.title.trim(),
                goal.target_value,
                &goal.unit,
                &format_date(deadline),
                goal.priority,
            )
            .await?;
        tracing::info!(user_id, goal_id, "goal created");

        self.view_by_id(goal_id, today).await
    }

    /// Loads a user's goals, optionally filtered by status, with derived
    /// progress fields as of today.
    ///
    /// # Errors
    /// Returns an error if the list query fails.
    pub async fn list_goals_now(
        &self,
        user_id: i64,
        status: Option<GoalStatus>,
    ) -> Result<Vec<GoalView>> {
        self.list_goals_on(user_id, status, today_utc()).await
    }

    /// Loads a user's goals with derived fields computed against an explicit
    /// day.
    ///
    /// # Errors
    /// Returns an error if the list query fails.
    pub async fn list_goals_on(
        &self,
        user_id: i64,
        status: Option<GoalStatus>,
        today: Date,
    ) -> Result<Vec<GoalView>> {
        let status = status.map(|status| status.to_string());
        let rows = self.db().goals_by_status(user_id, status.as_deref()).await?;

        rows.iter().map(|row| view(row, today)).collect()
    }

    /// Records new progress on a goal, marking it completed the moment the
    /// target is reached.
    ///
    /// # Errors
    /// Returns an error if the goal is missing, belongs to another user, is
    /// no longer in progress, or the value is negative.
    pub async fn update_progress_now(
        &self,
        user_id: i64,
        goal_id: i64,
        current_value: f64,
    ) -> Result<GoalView> {
        self.update_progress_at(user_id, goal_id, current_value, unix_now(), today_utc())
            .await
    }

    /// Records new progress at an explicit timestamp.
    ///
    /// # Errors
    /// Returns an error if the goal is missing, belongs to another user, is
    /// no longer in progress, or the value is negative.
    pub async fn update_progress_at(
        &self,
        user_id: i64,
        goal_id: i64,
        current_value: f64,
        now: i64,
        today: Date,
    ) -> Result<GoalView> {
        if current_value < 0.0 {
            return Err(Error::Validation(
                "goal progress cannot be negative".to_string(),
            ));
        }

        let goal = self.owned_goal(user_id, goal_id).await?;
        let status: GoalStatus = goal.status.parse().map_err(Error::InvalidState)?;
        if status != GoalStatus::InProgress {
            return Err(Error::InvalidState("goal is not in progress".to_string()));
        }

        let completed = current_value >= goal.target_value;
        let (new_status, completed_at) = if completed {
            (GoalStatus::Completed, Some(now))
        } else {
            (GoalStatus::InProgress, None)
        };
        self.db()
            .update_goal_progress(goal_id, current_value, &new_status.to_string(), completed_at)
            .await?;
        if completed {
            tracing::info!(user_id, goal_id, "goal completed");
        }

        self.view_by_id(goal_id, today).await
    }

    /// Expires every in-progress goal whose deadline has passed and returns
    /// the goals that were expired.
    ///
    /// # Errors
    /// Returns an error if a query fails.
    pub async fn expire_overdue_now(&self, user_id: i64) -> Result<Vec<GoalView>> {
        self.expire_overdue_on(user_id, today_utc()).await
    }

    /// Expires overdue goals as of an explicit day.
    ///
    /// # Errors
    /// Returns an error if a query fails.
    pub async fn expire_overdue_on(&self, user_id: i64, today: Date) -> Result<Vec<GoalView>> {
        let candidates = self
            .db()
            .expired_goal_candidates(user_id, &format_date(today))
            .await?;

        let mut expired = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            self.db()
                .set_goal_status(candidate.id, &GoalStatus::Expired.to_string())
                .await?;
            expired.push(self.view_by_id(candidate.id, today).await?);
        }
        if !expired.is_empty() {
            tracing::info!(user_id, expired = expired.len(), "expired overdue goals");
        }

        Ok(expired)
    }

    async fn view_by_id(&self, goal_id: i64, today: Date) -> Result<GoalView> {
        let row = self
            .db()
            .get_goal(goal_id)
            .await?
            .ok_or(Error::NotFound("goal"))?;

        view(&row, today)
    }

    /// Loads a goal and verifies it belongs to the user.
    async fn owned_goal(&self, user_id: i64, goal_id: i64) -> Result<GoalRow> {
        let goal = self
            .db()
            .get_goal(goal_id)
            .await?
            .ok_or(Error::NotFound("goal"))?;
        if goal.user_id != user_id {
            return Err(Error::NotFound("goal"));
        }

        Ok(goal)
    }
}

fn view(row: &GoalRow, today: Date) -> Result<GoalView> {
    let deadline = parse_date(&row.deadline)?;

    Ok(GoalView {
        id: row.id,
        subject_id: row.subject_id,
        title: row.title.clone(),
        target_value: row.target_value,
        current_value: row.current_value,
        unit: row.unit.clone(),
        deadline: row.deadline.clone(),
        priority: row.priority,
        status: row.status.clone(),
        completed_at: row.completed_at,
        progress_percentage: progress_percentage(row.current_value, row.target_value),
        days_remaining: days_remaining(deadline, today),
    })
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    fn new_goal(deadline: &str) -> NewGoal {
        NewGoal {
            subject_id: None,
            title: "Read 300 pages".to_string(),
            target_value: 300.0,
            unit: "pages".to_string(),
            deadline: deadline.to_string(),
            priority: 2,
        }
    }

    async fn seed_user(services: &Arc<AppServices>) -> i64 {
        services
            .db()
            .insert_user("mira")
            .await
            .expect("failed to insert user")
    }

    #[tokio::test]
    async fn test_create_goal_computes_derived_fields() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = GoalManager::new(Arc::clone(&services));
        let user_id = seed_user(&services).await;
        let today = date!(2026 - 03 - 10);

        // Act
        let goal = manager
            .create_goal_on(user_id, &new_goal("2026-03-20"), today)
            .await
            .expect("failed to create goal");

        // Assert
        assert_eq!(goal.status, "in_progress");
        assert!((goal.progress_percentage - 0.0).abs() < f64::EPSILON);
        assert_eq!(goal.days_remaining, 10);
    }

    #[tokio::test]
    async fn test_create_goal_rejects_bad_input() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = GoalManager::new(Arc::clone(&services));
        let user_id = seed_user(&services).await;
        let today = date!(2026 - 03 - 10);

        // Act / Assert
        let mut empty_title = new_goal("2026-03-20");
        empty_title.title = "  ".to_string();
        assert!(matches!(
            manager.create_goal_on(user_id, &empty_title, today).await,
            Err(Error::Validation(_))
        ));

        let mut bad_target = new_goal("2026-03-20");
        bad_target.target_value = 0.0;
        assert!(matches!(
            manager.create_goal_on(user_id, &bad_target, today).await,
            Err(Error::Validation(_))
        ));

        assert!(matches!(
            manager
                .create_goal_on(user_id, &new_goal("2026-03-01"), today)
                .await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_progress_completes_goal_at_target() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = GoalManager::new(Arc::clone(&services));
        let user_id = seed_user(&services).await;
        let today = date!(2026 - 03 - 10);
        let goal = manager
            .create_goal_on(user_id, &new_goal("2026-03-20"), today)
            .await
            .expect("failed to create goal");

        // Act
        let halfway = manager
            .update_progress_at(user_id, goal.id, 150.0, 1_700_000_000, today)
            .await
            .expect("failed to update goal");
        let done = manager
            .update_progress_at(user_id, goal.id, 300.0, 1_700_000_500, today)
            .await
            .expect("failed to update goal");

        // Assert
        assert_eq!(halfway.status, "in_progress");
        assert!((halfway.progress_percentage - 50.0).abs() < f64::EPSILON);
        assert_eq!(done.status, "completed");
        assert_eq!(done.completed_at, Some(1_700_000_500));
        assert!((done.progress_percentage - 100.0).abs() < f64::EPSILON);

        // A completed goal no longer accepts progress.
        assert!(matches!(
            manager
                .update_progress_at(user_id, goal.id, 310.0, 1_700_001_000, today)
                .await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_expire_overdue_touches_only_past_deadlines() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = GoalManager::new(Arc::clone(&services));
        let user_id = seed_user(&services).await;
        let created = date!(2026 - 03 - 01);
        let overdue = manager
            .create_goal_on(user_id, &new_goal("2026-03-05"), created)
            .await
            .expect("failed to create goal");
        manager
            .create_goal_on(user_id, &new_goal("2026-12-31"), created)
            .await
            .expect("failed to create goal");

        // Act
        let expired = manager
            .expire_overdue_on(user_id, date!(2026 - 03 - 10))
            .await
            .expect("failed to expire goals");

        // Assert
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, overdue.id);
        assert_eq!(expired[0].status, "expired");
        assert!(expired[0].days_remaining < 0);
        let in_progress = manager
            .list_goals_on(user_id, Some(GoalStatus::InProgress), date!(2026 - 03 - 10))
            .await
            .expect("failed to list goals");
        assert_eq!(in_progress.len(), 1);
    }
}
