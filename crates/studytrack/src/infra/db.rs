//! Database layer for study records, the point ledger, and achievements using
//! `SQLite` via `SQLx`.
//!
//! Every read filters on `deleted_at IS NULL` so soft-deleted rows vanish from
//! all statistics, streaks, and rankings at once. The point ledger is
//! append-only; totals are always recomputed from the surviving entries.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::Result;
use crate::domain::level::LevelUp;

/// Default database filename.
pub const DB_FILE: &str = "studytrack.db";

/// Maximum number of pooled `SQLite` connections for the on-disk database.
///
/// A value greater than `1` allows statistics reads to continue while session
/// completions commit their reward transactions.
pub const DB_POOL_MAX_CONNECTIONS: u32 = 10;

/// Ledger kind for points earned by completing a study session.
pub const POINT_KIND_STUDY_SESSION: &str = "study_session";

/// Ledger kind for one-time achievement bonuses.
pub const POINT_KIND_ACHIEVEMENT: &str = "achievement";

/// Ledger kind for the bonus credited when a user reaches a new level.
pub const POINT_KIND_LEVEL_UP: &str = "level_up";

/// Thin wrapper around a `SQLite` connection pool providing query methods.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

/// Row returned when loading a user from the `user` table.
pub struct UserRow {
    pub created_at: i64,
    pub id: i64,
    pub level: i64,
    pub status: String,
    pub username: String,
}

/// All-time totals for one user, computed from the surviving rows.
pub struct UserStatsRow {
    pub total_achievements: i64,
    pub total_minutes: i64,
    pub total_points: i64,
    pub total_sessions: i64,
}

/// Row returned when loading a subject from the `subject` table.
pub struct SubjectRow {
    pub color: String,
    pub id: i64,
    pub name: String,
    pub priority: i64,
    pub target_hours_per_week: i64,
    pub user_id: i64,
}

/// One subject with the minutes studied since a given week start.
pub struct SubjectProgressRow {
    pub color: String,
    pub id: i64,
    pub name: String,
    pub studied_minutes: i64,
    pub target_hours_per_week: i64,
}

/// Row returned when loading a session from the `study_session` table.
pub struct SessionRow {
    pub break_minutes: i64,
    pub duration_minutes: i64,
    pub ended_at: Option<i64>,
    pub id: i64,
    pub notes: String,
    pub productivity_score: Option<i64>,
    pub session_date: String,
    pub started_at: i64,
    pub status: String,
    pub subject_id: i64,
    pub subject_name: String,
    pub user_id: i64,
}

/// Aggregated figures for all sessions recorded on one calendar day.
pub struct DailyAggregateRow {
    pub avg_productivity: Option<f64>,
    pub session_count: i64,
    pub subject_names: Vec<String>,
    pub total_break_minutes: i64,
    pub total_minutes: i64,
}

/// Per-day rollup used by weekly and monthly overviews and by trend windows.
pub struct DailyRollupRow {
    pub avg_productivity: Option<f64>,
    pub date: String,
    pub session_count: i64,
    pub total_minutes: i64,
}

/// Totals over an arbitrary date range.
pub struct PeriodTotalsRow {
    pub avg_productivity: Option<f64>,
    pub total_minutes: i64,
    pub total_sessions: i64,
}

/// Row returned when loading an achievement definition.
pub struct AchievementRow {
    pub condition_type: String,
    pub condition_value: i64,
    pub description: String,
    pub id: i64,
    pub is_active: bool,
    pub name: String,
    pub points: i64,
}

/// One achievement a user has earned, with the grant timestamp.
pub struct UserAchievementRow {
    pub achievement_id: i64,
    pub description: String,
    pub earned_at: i64,
    pub name: String,
    pub points: i64,
}

/// One achievement to grant inside a session reward transaction.
pub struct AchievementGrant {
    pub achievement_id: i64,
    pub points: i64,
}

/// Row returned when loading a goal from the `goal` table.
pub struct GoalRow {
    pub completed_at: Option<i64>,
    pub current_value: f64,
    pub deadline: String,
    pub id: i64,
    pub priority: i64,
    pub status: String,
    pub subject_id: Option<i64>,
    pub target_value: f64,
    pub title: String,
    pub unit: String,
    pub user_id: i64,
}

/// One leaderboard entry ordered by ledger total.
pub struct LeaderboardRow {
    pub level: i64,
    pub study_days: i64,
    pub total_points: i64,
    pub user_id: i64,
    pub username: String,
}

/// A user's position in the full ranking over all active users.
pub struct UserRankRow {
    pub level: i64,
    pub rank: i64,
    pub total_points: i64,
    pub user_id: i64,
    pub username: String,
}

impl Database {
    /// Opens the `SQLite` database and runs embedded migrations.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created, the database
    /// cannot be opened, or migrations fail.
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                crate::Error::InvalidState(format!("failed to create database directory: {err}"))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(DB_POOL_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates a user and returns the new identifier.
    ///
    /// # Errors
    /// Returns an error if the row cannot be written, including when the
    /// username is already taken.
    pub async fn insert_user(&self, username: &str) -> Result<i64> {
        let result = sqlx::query(
            r"
INSERT INTO user (username)
VALUES (?)
",
        )
        .bind(username)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Looks up a user by identifier.
    ///
    /// # Errors
    /// Returns an error if the lookup query fails.
    pub async fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        let row = sqlx::query(
            r"
SELECT created_at,
       id,
       level,
       status,
       username
FROM user
WHERE id = ?
  AND deleted_at IS NULL
",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| UserRow {
            created_at: row.get("created_at"),
            id: row.get("id"),
            level: row.get("level"),
            status: row.get("status"),
            username: row.get("username"),
        }))
    }

    /// Computes all-time totals for one user from the surviving rows.
    ///
    /// # Errors
    /// Returns an error if the aggregate query fails.
    pub async fn user_stats(&self, user_id: i64) -> Result<UserStatsRow> {
        let row = sqlx::query(
            r"
SELECT (SELECT COUNT(*)
        FROM study_session
        WHERE user_id = ? AND deleted_at IS NULL) AS total_sessions,
       (SELECT COALESCE(SUM(duration_minutes), 0)
        FROM study_session
        WHERE user_id = ? AND deleted_at IS NULL) AS total_minutes,
       (SELECT COUNT(*)
        FROM user_achievement
        WHERE user_id = ?) AS total_achievements,
       (SELECT COALESCE(SUM(points), 0)
        FROM point_entry
        WHERE user_id = ? AND deleted_at IS NULL) AS total_points
",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(UserStatsRow {
            total_achievements: row.get("total_achievements"),
            total_minutes: row.get("total_minutes"),
            total_points: row.get("total_points"),
            total_sessions: row.get("total_sessions"),
        })
    }

    /// Creates a subject for a user and returns the new identifier.
    ///
    /// # Errors
    /// Returns an error if the row cannot be written.
    pub async fn insert_subject(
        &self,
        user_id: i64,
        name: &str,
        color: &str,
        target_hours_per_week: i64,
        priority: i64,
    ) -> Result<i64> {
        let result = sqlx::query(
            r"
INSERT INTO subject (user_id, name, color, target_hours_per_week, priority)
VALUES (?, ?, ?, ?, ?)
",
        )
        .bind(user_id)
        .bind(name)
        .bind(color)
        .bind(target_hours_per_week)
        .bind(priority)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Looks up a subject by identifier.
    ///
    /// # Errors
    /// Returns an error if the lookup query fails.
    pub async fn get_subject(&self, id: i64) -> Result<Option<SubjectRow>> {
        let row = sqlx::query(
            r"
SELECT color,
       id,
       name,
       priority,
       target_hours_per_week,
       user_id
FROM subject
WHERE id = ?
  AND deleted_at IS NULL
",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| SubjectRow {
            color: row.get("color"),
            id: row.get("id"),
            name: row.get("name"),
            priority: row.get("priority"),
            target_hours_per_week: row.get("target_hours_per_week"),
            user_id: row.get("user_id"),
        }))
    }

    /// Loads all subjects of a user with the minutes studied on or after
    /// `week_start` (a `YYYY-MM-DD` date).
    ///
    /// # Errors
    /// Returns an error if the aggregate query fails.
    pub async fn subject_weekly_progress(
        &self,
        user_id: i64,
        week_start: &str,
    ) -> Result<Vec<SubjectProgressRow>> {
        let rows = sqlx::query(
            r"
SELECT s.color,
       s.id,
       s.name,
       COALESCE(SUM(ss.duration_minutes), 0) AS studied_minutes,
       s.target_hours_per_week
FROM subject AS s
LEFT JOIN study_session AS ss
ON ss.subject_id = s.id
   AND ss.session_date >= ?
   AND ss.deleted_at IS NULL
WHERE s.user_id = ?
  AND s.deleted_at IS NULL
GROUP BY s.id
ORDER BY s.priority DESC,
         s.name
",
        )
        .bind(week_start)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SubjectProgressRow {
                color: row.get("color"),
                id: row.get("id"),
                name: row.get("name"),
                studied_minutes: row.get("studied_minutes"),
                target_hours_per_week: row.get("target_hours_per_week"),
            })
            .collect())
    }

    /// Returns the highest all-time minute total across a user's subjects.
    ///
    /// # Errors
    /// Returns an error if the aggregate query fails.
    pub async fn max_subject_minutes(&self, user_id: i64) -> Result<i64> {
        let row = sqlx::query(
            r"
SELECT COALESCE(MAX(subject_minutes), 0) AS max_minutes
FROM (
    SELECT SUM(duration_minutes) AS subject_minutes
    FROM study_session
    WHERE user_id = ?
      AND deleted_at IS NULL
    GROUP BY subject_id
)
",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("max_minutes"))
    }

    /// Starts a session in the `active` state and returns the new identifier.
    ///
    /// # Errors
    /// Returns an error if the row cannot be written.
    pub async fn insert_session(
        &self,
        user_id: i64,
        subject_id: i64,
        session_date: &str,
        started_at: i64,
        notes: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            r"
INSERT INTO study_session (user_id, subject_id, session_date, started_at, notes)
VALUES (?, ?, ?, ?, ?)
",
        )
        .bind(user_id)
        .bind(subject_id)
        .bind(session_date)
        .bind(started_at)
        .bind(notes)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Looks up a session by identifier, joined with its subject name.
    ///
    /// # Errors
    /// Returns an error if the lookup query fails.
    pub async fn get_session(&self, id: i64) -> Result<Option<SessionRow>> {
        let row = sqlx::query(&format!(
            "{SESSION_SELECT}
WHERE ss.id = ?
  AND ss.deleted_at IS NULL
"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_session_row))
    }

    /// Returns the user's currently running session, if any.
    ///
    /// # Errors
    /// Returns an error if the lookup query fails.
    pub async fn active_session(&self, user_id: i64) -> Result<Option<SessionRow>> {
        let row = sqlx::query(&format!(
            "{SESSION_SELECT}
WHERE ss.user_id = ?
  AND ss.status = 'active'
  AND ss.deleted_at IS NULL
ORDER BY ss.started_at DESC
LIMIT 1
"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_session_row))
    }

    /// Marks a session as completed and stores its final figures.
    ///
    /// # Errors
    /// Returns an error if the update query fails.
    pub async fn complete_session(
        &self,
        id: i64,
        ended_at: i64,
        duration_minutes: i64,
        break_minutes: i64,
        productivity_score: Option<i64>,
        notes: &str,
    ) -> Result<()> {
        sqlx::query(
            r"
UPDATE study_session
SET status = 'completed',
    ended_at = ?,
    duration_minutes = ?,
    break_minutes = ?,
    productivity_score = ?,
    notes = ?
WHERE id = ?
",
        )
        .bind(ended_at)
        .bind(duration_minutes)
        .bind(break_minutes)
        .bind(productivity_score)
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Soft-deletes a session so it stops counting toward any statistic.
    ///
    /// # Errors
    /// Returns an error if the update query fails.
    pub async fn soft_delete_session(&self, id: i64) -> Result<()> {
        sqlx::query(
            r"
UPDATE study_session
SET deleted_at = unixepoch()
WHERE id = ?
  AND deleted_at IS NULL
",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Loads one page of a user's sessions, newest first.
    ///
    /// # Errors
    /// Returns an error if the list query fails.
    pub async fn list_sessions(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SessionRow>> {
        let rows = sqlx::query(&format!(
            "{SESSION_SELECT}
WHERE ss.user_id = ?
  AND ss.deleted_at IS NULL
ORDER BY ss.session_date DESC,
         ss.started_at DESC,
         ss.id DESC
LIMIT ? OFFSET ?
"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_session_row).collect())
    }

    /// Counts a user's surviving sessions.
    ///
    /// # Errors
    /// Returns an error if the count query fails.
    pub async fn count_sessions(&self, user_id: i64) -> Result<i64> {
        let row = sqlx::query(
            r"
SELECT COUNT(*) AS session_count
FROM study_session
WHERE user_id = ?
  AND deleted_at IS NULL
",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("session_count"))
    }

    /// Returns the distinct calendar days a user studied on, newest first.
    ///
    /// The limit bounds how far back streak detection has to look.
    ///
    /// # Errors
    /// Returns an error if the list query fails.
    pub async fn session_dates(&self, user_id: i64, limit: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r"
SELECT DISTINCT session_date
FROM study_session
WHERE user_id = ?
  AND deleted_at IS NULL
ORDER BY session_date DESC
LIMIT ?
",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("session_date")).collect())
    }

    /// Aggregates all of a user's sessions recorded on one calendar day.
    ///
    /// # Errors
    /// Returns an error if the aggregate query fails.
    pub async fn daily_aggregate(&self, user_id: i64, date: &str) -> Result<DailyAggregateRow> {
        let row = sqlx::query(
            r"
SELECT AVG(ss.productivity_score) AS avg_productivity,
       COUNT(ss.id) AS session_count,
       GROUP_CONCAT(DISTINCT s.name) AS subject_names,
       COALESCE(SUM(ss.break_minutes), 0) AS total_break_minutes,
       COALESCE(SUM(ss.duration_minutes), 0) AS total_minutes
FROM study_session AS ss
JOIN subject AS s
ON s.id = ss.subject_id
WHERE ss.user_id = ?
  AND ss.session_date = ?
  AND ss.deleted_at IS NULL
",
        )
        .bind(user_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        let subject_names: Option<String> = row.get("subject_names");

        Ok(DailyAggregateRow {
            avg_productivity: row.get("avg_productivity"),
            session_count: row.get("session_count"),
            subject_names: subject_names
                .map(|names| names.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            total_break_minutes: row.get("total_break_minutes"),
            total_minutes: row.get("total_minutes"),
        })
    }

    /// Loads per-day rollups for `start_date <= session_date < end_date`,
    /// oldest first. Days without sessions produce no row.
    ///
    /// # Errors
    /// Returns an error if the aggregate query fails.
    pub async fn daily_rollups(
        &self,
        user_id: i64,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<DailyRollupRow>> {
        let rows = sqlx::query(
            r"
SELECT AVG(productivity_score) AS avg_productivity,
       session_date,
       COUNT(*) AS session_count,
       COALESCE(SUM(duration_minutes), 0) AS total_minutes
FROM study_session
WHERE user_id = ?
  AND session_date >= ?
  AND session_date < ?
  AND deleted_at IS NULL
GROUP BY session_date
ORDER BY session_date
",
        )
        .bind(user_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DailyRollupRow {
                avg_productivity: row.get("avg_productivity"),
                date: row.get("session_date"),
                session_count: row.get("session_count"),
                total_minutes: row.get("total_minutes"),
            })
            .collect())
    }

    /// Aggregates totals over `start_date <= session_date < end_date`.
    ///
    /// # Errors
    /// Returns an error if the aggregate query fails.
    pub async fn period_totals(
        &self,
        user_id: i64,
        start_date: &str,
        end_date: &str,
    ) -> Result<PeriodTotalsRow> {
        let row = sqlx::query(
            r"
SELECT AVG(productivity_score) AS avg_productivity,
       COALESCE(SUM(duration_minutes), 0) AS total_minutes,
       COUNT(*) AS total_sessions
FROM study_session
WHERE user_id = ?
  AND session_date >= ?
  AND session_date < ?
  AND deleted_at IS NULL
",
        )
        .bind(user_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(PeriodTotalsRow {
            avg_productivity: row.get("avg_productivity"),
            total_minutes: row.get("total_minutes"),
            total_sessions: row.get("total_sessions"),
        })
    }

    /// Counts the calendar days on which a user studied at least
    /// `minimum_minutes` in total.
    ///
    /// # Errors
    /// Returns an error if the aggregate query fails.
    pub async fn daily_goal_day_count(&self, user_id: i64, minimum_minutes: i64) -> Result<i64> {
        let row = sqlx::query(
            r"
SELECT COUNT(*) AS day_count
FROM (
    SELECT session_date
    FROM study_session
    WHERE user_id = ?
      AND deleted_at IS NULL
    GROUP BY session_date
    HAVING SUM(duration_minutes) >= ?
)
",
        )
        .bind(user_id)
        .bind(minimum_minutes)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("day_count"))
    }

    /// Appends one entry to the point ledger.
    ///
    /// # Errors
    /// Returns an error if the row cannot be written.
    pub async fn append_point_entry(
        &self,
        user_id: i64,
        points: i64,
        kind: &str,
        reference_id: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r"
INSERT INTO point_entry (user_id, points, kind, reference_id)
VALUES (?, ?, ?, ?)
",
        )
        .bind(user_id)
        .bind(points)
        .bind(kind)
        .bind(reference_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Sums a user's surviving ledger entries.
    ///
    /// # Errors
    /// Returns an error if the aggregate query fails.
    pub async fn sum_user_points(&self, user_id: i64) -> Result<i64> {
        let row = sqlx::query(
            r"
SELECT COALESCE(SUM(points), 0) AS total_points
FROM point_entry
WHERE user_id = ?
  AND deleted_at IS NULL
",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("total_points"))
    }

    /// Creates an achievement definition and returns the new identifier.
    ///
    /// # Errors
    /// Returns an error if the row cannot be written.
    pub async fn insert_achievement(
        &self,
        name: &str,
        description: &str,
        condition_type: &str,
        condition_value: i64,
        points: i64,
    ) -> Result<i64> {
        let result = sqlx::query(
            r"
INSERT INTO achievement (name, description, condition_type, condition_value, points)
VALUES (?, ?, ?, ?, ?)
",
        )
        .bind(name)
        .bind(description)
        .bind(condition_type)
        .bind(condition_value)
        .bind(points)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Loads all active achievement definitions in catalog order.
    ///
    /// # Errors
    /// Returns an error if the list query fails.
    pub async fn active_achievements(&self) -> Result<Vec<AchievementRow>> {
        let rows = sqlx::query(
            r"
SELECT condition_type,
       condition_value,
       description,
       id,
       is_active,
       name,
       points
FROM achievement
WHERE is_active = 1
ORDER BY id
",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| AchievementRow {
                condition_type: row.get("condition_type"),
                condition_value: row.get("condition_value"),
                description: row.get("description"),
                id: row.get("id"),
                is_active: row.get::<i64, _>("is_active") != 0,
                name: row.get("name"),
                points: row.get("points"),
            })
            .collect())
    }

    /// Returns whether a user already holds an achievement.
    ///
    /// # Errors
    /// Returns an error if the lookup query fails.
    pub async fn has_achievement(&self, user_id: i64, achievement_id: i64) -> Result<bool> {
        let row = sqlx::query(
            r"
SELECT 1 AS held
FROM user_achievement
WHERE user_id = ?
  AND achievement_id = ?
",
        )
        .bind(user_id)
        .bind(achievement_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Loads the achievements a user has earned, newest grant first.
    ///
    /// # Errors
    /// Returns an error if the list query fails.
    pub async fn user_achievements(&self, user_id: i64) -> Result<Vec<UserAchievementRow>> {
        let rows = sqlx::query(
            r"
SELECT ua.achievement_id,
       a.description,
       ua.earned_at,
       a.name,
       a.points
FROM user_achievement AS ua
JOIN achievement AS a
ON a.id = ua.achievement_id
WHERE ua.user_id = ?
ORDER BY ua.earned_at DESC,
         ua.achievement_id DESC
",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| UserAchievementRow {
                achievement_id: row.get("achievement_id"),
                description: row.get("description"),
                earned_at: row.get("earned_at"),
                name: row.get("name"),
                points: row.get("points"),
            })
            .collect())
    }

    /// Grants one achievement and credits its bonus in a single transaction.
    ///
    /// # Errors
    /// Returns an error if either write fails; neither is applied then.
    pub async fn grant_achievement(
        &self,
        user_id: i64,
        achievement_id: i64,
        points: i64,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        insert_grant(&mut tx, user_id, achievement_id, points).await?;

        tx.commit().await?;

        Ok(())
    }

    /// Commits every reward of one session completion atomically: the session
    /// points, any newly earned achievements with their bonuses, and the
    /// level-up bonus when the new totals cross a threshold.
    ///
    /// # Errors
    /// Returns an error if any write fails; no reward is applied then.
    pub async fn commit_session_rewards(
        &self,
        user_id: i64,
        session_id: i64,
        session_points: i64,
        grants: &[AchievementGrant],
        level_up: Option<&LevelUp>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
INSERT INTO point_entry (user_id, points, kind, reference_id)
VALUES (?, ?, ?, ?)
",
        )
        .bind(user_id)
        .bind(session_points)
        .bind(POINT_KIND_STUDY_SESSION)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        for grant in grants {
            insert_grant(&mut tx, user_id, grant.achievement_id, grant.points).await?;
        }

        if let Some(level_up) = level_up {
            apply_level_up(&mut tx, user_id, level_up).await?;
        }

        tx.commit().await?;

        Ok(())
    }

    /// Records a level change and its bonus in a single transaction.
    ///
    /// # Errors
    /// Returns an error if either write fails; neither is applied then.
    pub async fn record_level_up(&self, user_id: i64, level_up: &LevelUp) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        apply_level_up(&mut tx, user_id, level_up).await?;

        tx.commit().await?;

        Ok(())
    }

    /// Creates a goal and returns the new identifier.
    ///
    /// # Errors
    /// Returns an error if the row cannot be written.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_goal(
        &self,
        user_id: i64,
        subject_id: Option<i64>,
        title: &str,
        target_value: f64,
        unit: &str,
        deadline: &str,
        priority: i64,
    ) -> Result<i64> {
        let result = sqlx::query(
            r"
INSERT INTO goal (user_id, subject_id, title, target_value, unit, deadline, priority)
VALUES (?, ?, ?, ?, ?, ?, ?)
",
        )
        .bind(user_id)
        .bind(subject_id)
        .bind(title)
        .bind(target_value)
        .bind(unit)
        .bind(deadline)
        .bind(priority)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Looks up a goal by identifier.
    ///
    /// # Errors
    /// Returns an error if the lookup query fails.
    pub async fn get_goal(&self, id: i64) -> Result<Option<GoalRow>> {
        let row = sqlx::query(&format!(
            "{GOAL_SELECT}
WHERE id = ?
  AND deleted_at IS NULL
"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_goal_row))
    }

    /// Loads a user's goals, optionally filtered by status, with the most
    /// important and most urgent first.
    ///
    /// # Errors
    /// Returns an error if the list query fails.
    pub async fn goals_by_status(
        &self,
        user_id: i64,
        status: Option<&str>,
    ) -> Result<Vec<GoalRow>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "{GOAL_SELECT}
WHERE user_id = ?
  AND status = ?
  AND deleted_at IS NULL
ORDER BY priority DESC,
         deadline
"
                ))
                .bind(user_id)
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "{GOAL_SELECT}
WHERE user_id = ?
  AND deleted_at IS NULL
ORDER BY priority DESC,
         deadline
"
                ))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.iter().map(map_goal_row).collect())
    }

    /// Stores a goal's new progress value, status, and completion timestamp.
    ///
    /// # Errors
    /// Returns an error if the update query fails.
    pub async fn update_goal_progress(
        &self,
        id: i64,
        current_value: f64,
        status: &str,
        completed_at: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r"
UPDATE goal
SET current_value = ?,
    status = ?,
    completed_at = ?,
    updated_at = unixepoch()
WHERE id = ?
",
        )
        .bind(current_value)
        .bind(status)
        .bind(completed_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Changes a goal's status without touching its progress value.
    ///
    /// # Errors
    /// Returns an error if the update query fails.
    pub async fn set_goal_status(&self, id: i64, status: &str) -> Result<()> {
        sqlx::query(
            r"
UPDATE goal
SET status = ?,
    updated_at = unixepoch()
WHERE id = ?
",
        )
        .bind(status)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Loads a user's in-progress goals whose deadline lies before `today`.
    ///
    /// # Errors
    /// Returns an error if the list query fails.
    pub async fn expired_goal_candidates(
        &self,
        user_id: i64,
        today: &str,
    ) -> Result<Vec<GoalRow>> {
        let rows = sqlx::query(&format!(
            "{GOAL_SELECT}
WHERE user_id = ?
  AND status = 'in_progress'
  AND deadline < ?
  AND deleted_at IS NULL
ORDER BY deadline
"
        ))
        .bind(user_id)
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_goal_row).collect())
    }

    /// Loads the top of the leaderboard over all active users.
    ///
    /// Point totals come from a pre-aggregated ledger subquery so the study
    /// day join cannot inflate them.
    ///
    /// # Errors
    /// Returns an error if the ranking query fails.
    pub async fn leaderboard_rows(&self, limit: i64) -> Result<Vec<LeaderboardRow>> {
        let rows = sqlx::query(
            r"
SELECT u.level,
       COALESCE(days.study_days, 0) AS study_days,
       COALESCE(pts.total_points, 0) AS total_points,
       u.id AS user_id,
       u.username
FROM user AS u
LEFT JOIN (
    SELECT user_id,
           SUM(points) AS total_points
    FROM point_entry
    WHERE deleted_at IS NULL
    GROUP BY user_id
) AS pts
ON pts.user_id = u.id
LEFT JOIN (
    SELECT user_id,
           COUNT(DISTINCT session_date) AS study_days
    FROM study_session
    WHERE deleted_at IS NULL
    GROUP BY user_id
) AS days
ON days.user_id = u.id
WHERE u.status = 'active'
  AND u.deleted_at IS NULL
ORDER BY total_points DESC,
         u.level DESC
LIMIT ?
",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| LeaderboardRow {
                level: row.get("level"),
                study_days: row.get("study_days"),
                total_points: row.get("total_points"),
                user_id: row.get("user_id"),
                username: row.get("username"),
            })
            .collect())
    }

    /// Returns a user's position in the full ranking over all active users,
    /// or `None` when the user is missing, inactive, or deleted.
    ///
    /// # Errors
    /// Returns an error if the ranking query fails.
    pub async fn user_rank(&self, user_id: i64) -> Result<Option<UserRankRow>> {
        let row = sqlx::query(
            r"
SELECT ranked.level,
       ranked.rank,
       ranked.total_points,
       ranked.user_id,
       ranked.username
FROM (
    SELECT u.level,
           ROW_NUMBER() OVER (
               ORDER BY COALESCE(pts.total_points, 0) DESC,
                        u.level DESC
           ) AS rank,
           COALESCE(pts.total_points, 0) AS total_points,
           u.id AS user_id,
           u.username
    FROM user AS u
    LEFT JOIN (
        SELECT user_id,
               SUM(points) AS total_points
        FROM point_entry
        WHERE deleted_at IS NULL
        GROUP BY user_id
    ) AS pts
    ON pts.user_id = u.id
    WHERE u.status = 'active'
      AND u.deleted_at IS NULL
) AS ranked
WHERE ranked.user_id = ?
",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| UserRankRow {
            level: row.get("level"),
            rank: row.get("rank"),
            total_points: row.get("total_points"),
            user_id: row.get("user_id"),
            username: row.get("username"),
        }))
    }
}

/// Shared SELECT clause for session rows joined with their subject name.
const SESSION_SELECT: &str = r"
SELECT ss.break_minutes,
       ss.duration_minutes,
       ss.ended_at,
       ss.id,
       ss.notes,
       ss.productivity_score,
       ss.session_date,
       ss.started_at,
       ss.status,
       ss.subject_id,
       s.name AS subject_name,
       ss.user_id
FROM study_session AS ss
JOIN subject AS s
ON s.id = ss.subject_id";

fn map_session_row(row: &sqlx::sqlite::SqliteRow) -> SessionRow {
    SessionRow {
        break_minutes: row.get("break_minutes"),
        duration_minutes: row.get("duration_minutes"),
        ended_at: row.get("ended_at"),
        id: row.get("id"),
        notes: row.get("notes"),
        productivity_score: row.get("productivity_score"),
        session_date: row.get("session_date"),
        started_at: row.get("started_at"),
        status: row.get("status"),
        subject_id: row.get("subject_id"),
        subject_name: row.get("subject_name"),
        user_id: row.get("user_id"),
    }
}

/// Shared SELECT clause for goal rows.
const GOAL_SELECT: &str = r"
SELECT completed_at,
       current_value,
       deadline,
       id,
       priority,
       status,
       subject_id,
       target_value,
       title,
       unit,
       user_id
FROM goal";

fn map_goal_row(row: &sqlx::sqlite::SqliteRow) -> GoalRow {
    GoalRow {
        completed_at: row.get("completed_at"),
        current_value: row.get("current_value"),
        deadline: row.get("deadline"),
        id: row.get("id"),
        priority: row.get("priority"),
        status: row.get("status"),
        subject_id: row.get("subject_id"),
        target_value: row.get("target_value"),
        title: row.get("title"),
        unit: row.get("unit"),
        user_id: row.get("user_id"),
    }
}

/// Writes one achievement grant and its ledger bonus inside an open
/// transaction. Zero-point achievements skip the ledger entry.
async fn insert_grant(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: i64,
    achievement_id: i64,
    points: i64,
) -> Result<()> {
    sqlx::query(
        r"
INSERT INTO user_achievement (user_id, achievement_id)
VALUES (?, ?)
",
    )
    .bind(user_id)
    .bind(achievement_id)
    .execute(&mut **tx)
    .await?;

    if points > 0 {
        sqlx::query(
            r"
INSERT INTO point_entry (user_id, points, kind, reference_id)
VALUES (?, ?, ?, ?)
",
        )
        .bind(user_id)
        .bind(points)
        .bind(POINT_KIND_ACHIEVEMENT)
        .bind(achievement_id)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Writes the level change and its bonus inside an open transaction.
///
/// The ledger entry references the level reached so repeated promotions stay
/// distinguishable.
async fn apply_level_up(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: i64,
    level_up: &LevelUp,
) -> Result<()> {
    sqlx::query(
        r"
UPDATE user
SET level = ?
WHERE id = ?
",
    )
    .bind(level_up.new_level)
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    if level_up.bonus_points > 0 {
        sqlx::query(
            r"
INSERT INTO point_entry (user_id, points, kind, reference_id)
VALUES (?, ?, ?, ?)
",
        )
        .bind(user_id)
        .bind(level_up.bonus_points)
        .bind(POINT_KIND_LEVEL_UP)
        .bind(level_up.new_level)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
impl Database {
    /// Opens an in-memory `SQLite` database for tests and runs migrations.
    ///
    /// # Errors
    /// Returns an error if the database connection or migrations fail.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;

        Ok(Self { pool })
    }
}
