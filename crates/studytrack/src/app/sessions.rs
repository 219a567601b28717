//! Study session lifecycle: start, finish with rewards, list, and delete.

use std::sync::Arc;

use serde::Serialize;
use time::Date;

use crate::app::gamification::{GamificationManager, SessionRewards};
use crate::app::{AppServices, unix_now};
use crate::db::{Database, SessionRow};
use crate::domain::dates::{format_date, today_utc};
use crate::domain::session::{
    MAX_PRODUCTIVITY_SCORE, MIN_PRODUCTIVITY_SCORE, SessionStatus, elapsed_minutes,
    productivity_score_valid,
};
use crate::{Error, Result};

/// Largest allowed page size when listing sessions.
pub const MAX_PAGE_SIZE: i64 = 100;

/// One session as returned to callers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SessionView {
    pub id: i64,
    pub subject_id: i64,
    pub subject_name: String,
    pub session_date: String,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub duration_minutes: i64,
    pub break_minutes: i64,
    pub productivity_score: Option<i64>,
    pub notes: String,
    pub status: String,
}

impl From<SessionRow> for SessionView {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            subject_id: row.subject_id,
            subject_name: row.subject_name,
            session_date: row.session_date,
            started_at: row.started_at,
            ended_at: row.ended_at,
            duration_minutes: row.duration_minutes,
            break_minutes: row.break_minutes,
            productivity_score: row.productivity_score,
            notes: row.notes,
            status: row.status,
        }
    }
}

/// Caller-supplied figures for finishing a session.
#[derive(Clone, Debug, Default)]
pub struct EndSessionInput {
    pub break_minutes: i64,
    pub productivity_score: Option<i64>,
    /// Replaces the notes captured at start time when set.
    pub notes: Option<String>,
}

/// A finished session together with everything it earned.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompletedSession {
    pub session: SessionView,
    pub rewards: SessionRewards,
}

/// One page of a user's session history, newest first.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SessionPage {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub sessions: Vec<SessionView>,
}

/// Implements the session lifecycle on top of the database layer.
pub struct SessionManager {
    services: Arc<AppServices>,
}

impl SessionManager {
    /// Creates a manager over the shared services.
    pub fn new(services: Arc<AppServices>) -> Self {
        Self { services }
    }

    fn db(&self) -> &Database {
        self.services.db()
    }

    /// Starts a session now.
    ///
    /// # Errors
    /// Returns an error if the subject is missing, belongs to another user,
    /// or a session is already running.
    pub async fn start_session_now(
        &self,
        user_id: i64,
        subject_id: i64,
        notes: &str,
    ) -> Result<SessionView> {
        self.start_session_at(user_id, subject_id, notes, unix_now(), today_utc())
            .await
    }

    /// Starts a session at an explicit timestamp and calendar day.
    ///
    /// # Errors
    /// Returns an error if the subject is missing, belongs to another user,
    /// or a session is already running.
    pub async fn start_session_at(
        &self,
        user_id: i64,
        subject_id: i64,
        notes: &str,
        started_at: i64,
        date: Date,
    ) -> Result<SessionView> {
        let subject = self
            .db()
            .get_subject(subject_id)
            .await?
            .ok_or(Error::NotFound("subject"))?;
        if subject.user_id != user_id {
            return Err(Error::NotFound("subject"));
        }

        if self.db().active_session(user_id).await?.is_some() {
            return Err(Error::InvalidState(
                "a study session is already running".to_string(),
            ));
        }

        let session_id = self
            .db()
            .insert_session(user_id, subject_id, &format_date(date), started_at, notes)
            .await?;
        tracing::info!(user_id, session_id, subject_id, "study session started");

        let session = self
            .db()
            .get_session(session_id)
            .await?
            .ok_or(Error::NotFound("session"))?;

        Ok(session.into())
    }

    /// Finishes a session now and commits its rewards.
    ///
    /// # Errors
    /// Returns an error if the session is missing, already finished, or the
    /// input fails validation.
    pub async fn end_session_now(
        &self,
        user_id: i64,
        session_id: i64,
        input: &EndSessionInput,
    ) -> Result<CompletedSession> {
        self.end_session_at(user_id, session_id, input, unix_now(), today_utc())
            .await
    }

    /// Finishes a session at an explicit timestamp.
    ///
    /// The duration is measured wall-clock between start and end, rounded to
    /// the nearest minute. Rewards are evaluated after the completed session
    /// is persisted so streaks and achievement aggregates include it.
    ///
    /// # Errors
    /// Returns an error if the session is missing, already finished, or the
    /// input fails validation.
    pub async fn end_session_at(
        &self,
        user_id: i64,
        session_id: i64,
        input: &EndSessionInput,
        ended_at: i64,
        today: Date,
    ) -> Result<CompletedSession> {
        let session = self.owned_session(user_id, session_id).await?;
        let status: SessionStatus = session.status.parse().map_err(Error::InvalidState)?;
        if status != SessionStatus::Active {
            return Err(Error::InvalidState(
                "session is already completed".to_string(),
            ));
        }

        if let Some(score) = input.productivity_score {
            if !productivity_score_valid(score) {
                return Err(Error::Validation(format!(
                    "productivity score must be between {MIN_PRODUCTIVITY_SCORE} and {MAX_PRODUCTIVITY_SCORE}, got {score}"
                )));
            }
        }
        if input.break_minutes < 0 {
            return Err(Error::Validation(
                "break minutes cannot be negative".to_string(),
            ));
        }

        let duration_minutes = elapsed_minutes(session.started_at, ended_at);
        let notes = input.notes.as_deref().unwrap_or(&session.notes);
        self.db()
            .complete_session(
                session_id,
                ended_at,
                duration_minutes,
                input.break_minutes,
                input.productivity_score,
                notes,
            )
            .await?;

        let session = self
            .db()
            .get_session(session_id)
            .await?
            .ok_or(Error::NotFound("session"))?;
        let rewards = GamificationManager::new(Arc::clone(&self.services))
            .process_session_completion(&session, today)
            .await?;

        Ok(CompletedSession {
            session: session.into(),
            rewards,
        })
    }

    /// Returns the user's currently running session, if any.
    ///
    /// # Errors
    /// Returns an error if the lookup fails.
    pub async fn active_session(&self, user_id: i64) -> Result<Option<SessionView>> {
        Ok(self
            .db()
            .active_session(user_id)
            .await?
            .map(SessionView::from))
    }

    /// Loads one page of the user's session history, newest first.
    ///
    /// # Errors
    /// Returns an error if the paging parameters are out of range or the
    /// list query fails.
    pub async fn list_sessions(
        &self,
        user_id: i64,
        page: i64,
        per_page: i64,
    ) -> Result<SessionPage> {
        if page < 1 {
            return Err(Error::Validation("page must be at least 1".to_string()));
        }
        if per_page < 1 || per_page > MAX_PAGE_SIZE {
            return Err(Error::Validation(format!(
                "per_page must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let offset = (page - 1) * per_page;
        let sessions = self.db().list_sessions(user_id, per_page, offset).await?;
        let total = self.db().count_sessions(user_id).await?;

        Ok(SessionPage {
            page,
            per_page,
            total,
            sessions: sessions.into_iter().map(SessionView::from).collect(),
        })
    }

    /// Soft-deletes a session so it stops counting toward any statistic.
    ///
    /// # Errors
    /// Returns an error if the session is missing or belongs to another user.
    pub async fn delete_session(&self, user_id: i64, session_id: i64) -> Result<()> {
        self.owned_session(user_id, session_id).await?;
        self.db().soft_delete_session(session_id).await?;
        tracing::info!(user_id, session_id, "study session deleted");

        Ok(())
    }

    /// Loads a session and verifies it belongs to the user.
    async fn owned_session(&self, user_id: i64, session_id: i64) -> Result<SessionRow> {
        let session = self
            .db()
            .get_session(session_id)
            .await?
            .ok_or(Error::NotFound("session"))?;
        if session.user_id != user_id {
            return Err(Error::NotFound("session"));
        }

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

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

    #[tokio::test]
    async fn test_start_session_rejects_a_second_active_session() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = SessionManager::new(Arc::clone(&services));
        let (user_id, subject_id) = seed_user_with_subject(&services).await;
        let today = date!(2026 - 03 - 10);
        manager
            .start_session_at(user_id, subject_id, "", 1_700_000_000, today)
            .await
            .expect("failed to start session");

        // Act
        let second = manager
            .start_session_at(user_id, subject_id, "", 1_700_000_100, today)
            .await;

        // Assert
        assert!(matches!(second, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_start_session_hides_other_users_subjects() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = SessionManager::new(Arc::clone(&services));
        let (_, subject_id) = seed_user_with_subject(&services).await;
        let outsider = services
            .db()
            .insert_user("ben")
            .await
            .expect("failed to insert user");

        // Act
        let result = manager
            .start_session_at(outsider, subject_id, "", 1_700_000_000, date!(2026 - 03 - 10))
            .await;

        // Assert
        assert!(matches!(result, Err(Error::NotFound("subject"))));
    }

    #[tokio::test]
    async fn test_end_session_measures_duration_and_commits_rewards() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = SessionManager::new(Arc::clone(&services));
        let (user_id, subject_id) = seed_user_with_subject(&services).await;
        let today = date!(2026 - 03 - 10);
        let started = manager
            .start_session_at(user_id, subject_id, "chapter 4", 1_700_000_000, today)
            .await
            .expect("failed to start session");

        // Act
        let completed = manager
            .end_session_at(
                user_id,
                started.id,
                &EndSessionInput {
                    break_minutes: 5,
                    productivity_score: Some(9),
                    notes: None,
                },
                1_700_000_000 + 90 * 60,
                today,
            )
            .await
            .expect("failed to end session");

        // Assert
        assert_eq!(completed.session.status, "completed");
        assert_eq!(completed.session.duration_minutes, 90);
        assert_eq!(completed.session.break_minutes, 5);
        assert_eq!(completed.session.notes, "chapter 4");
        assert_eq!(completed.rewards.points.base, 90);
        assert_eq!(completed.rewards.points.productivity_bonus, 45);
        assert_eq!(completed.rewards.streak_days, 1);
        assert_eq!(
            services
                .db()
                .sum_user_points(user_id)
                .await
                .expect("failed to sum points"),
            135
        );
    }

    #[tokio::test]
    async fn test_end_session_rejects_out_of_range_productivity() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = SessionManager::new(Arc::clone(&services));
        let (user_id, subject_id) = seed_user_with_subject(&services).await;
        let today = date!(2026 - 03 - 10);
        let started = manager
            .start_session_at(user_id, subject_id, "", 1_700_000_000, today)
            .await
            .expect("failed to start session");

        // Act
        let result = manager
            .end_session_at(
                user_id,
                started.id,
                &EndSessionInput {
                    productivity_score: Some(11),
                    ..EndSessionInput::default()
                },
                1_700_003_600,
                today,
            )
            .await;

        // Assert
        assert!(matches!(result, Err(Error::Validation(_))));
        let still_active = manager
            .active_session(user_id)
            .await
            .expect("failed to load active session");
        assert!(still_active.is_some());
    }

    #[tokio::test]
    async fn test_end_session_twice_is_rejected() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = SessionManager::new(Arc::clone(&services));
        let (user_id, subject_id) = seed_user_with_subject(&services).await;
        let today = date!(2026 - 03 - 10);
        let started = manager
            .start_session_at(user_id, subject_id, "", 1_700_000_000, today)
            .await
            .expect("failed to start session");
        manager
            .end_session_at(
                user_id,
                started.id,
                &EndSessionInput::default(),
                1_700_003_600,
                today,
            )
            .await
            .expect("failed to end session");

        // Act
        let again = manager
            .end_session_at(
                user_id,
                started.id,
                &EndSessionInput::default(),
                1_700_007_200,
                today,
            )
            .await;

        // Assert
        assert!(matches!(again, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_list_sessions_pages_newest_first() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = SessionManager::new(Arc::clone(&services));
        let (user_id, subject_id) = seed_user_with_subject(&services).await;
        for (index, day) in ["2026-03-08", "2026-03-09", "2026-03-10"].iter().enumerate() {
            let session_id = services
                .db()
                .insert_session(
                    user_id,
                    subject_id,
                    day,
                    1_700_000_000 + index as i64,
                    "",
                )
                .await
                .expect("failed to insert session");
            services
                .db()
                .complete_session(session_id, 1_700_003_600, 30, 0, None, "")
                .await
                .expect("failed to complete session");
        }

        // Act
        let page = manager
            .list_sessions(user_id, 1, 2)
            .await
            .expect("failed to list sessions");

        // Assert
        assert_eq!(page.total, 3);
        assert_eq!(page.sessions.len(), 2);
        assert_eq!(page.sessions[0].session_date, "2026-03-10");
        assert_eq!(page.sessions[1].session_date, "2026-03-09");
        assert!(matches!(
            manager.list_sessions(user_id, 0, 10).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_session_requires_ownership() {
        // Arrange
        let services = AppServices::open_in_memory().await;
        let manager = SessionManager::new(Arc::clone(&services));
        let (user_id, subject_id) = seed_user_with_subject(&services).await;
        let outsider = services
            .db()
            .insert_user("ben")
            .await
            .expect("failed to insert user");
        let started = manager
            .start_session_at(user_id, subject_id, "", 1_700_000_000, date!(2026 - 03 - 10))
            .await
            .expect("failed to start session");

        // Act
        let denied = manager.delete_session(outsider, started.id).await;
        manager
            .delete_session(user_id, started.id)
            .await
            .expect("failed to delete session");

        // Assert
        assert!(matches!(denied, Err(Error::NotFound("session"))));
        assert!(
            manager
                .active_session(user_id)
                .await
                .expect("failed to load active session")
                .is_none()
        );
    }
}
