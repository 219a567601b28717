//! Leaderboard assembly over the point ledger.

use std::sync::Arc;

use serde::Serialize;

use crate::app::AppServices;
use crate::db::Database;
use crate::domain::level::level_name;
use crate::{Error, Result};

/// Entries shown when the caller does not ask for a specific page size.
pub const DEFAULT_LEADERBOARD_SIZE: i64 = 10;

/// Largest allowed leaderboard page.
pub const MAX_LEADERBOARD_SIZE: i64 = 100;

/// One ranked row of the leaderboard.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub user_id: i64,
    pub username: String,
    pub level: i64,
    pub level_name: String,
    pub total_points: i64,
    pub study_days: i64,
    pub is_current_user: bool,
}

/// The viewer's own position when it falls outside the visible page.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CurrentUserRank {
    pub rank: i64,
    pub user_id: i64,
    pub username: String,
    pub level: i64,
    pub total_points: i64,
}

/// The visible top of the ranking plus the viewer's own position when they
/// did not make the page.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
    pub current_user: Option<CurrentUserRank>,
}

/// Implements leaderboard assembly on top of the database layer.
pub struct LeaderboardManager {
    services: Arc<AppServices>,
}

impl LeaderboardManager {
    /// Creates a manager over the shared services.
    pub fn new(services: Arc<AppServices>) -> Self {
        Self { services }
    }

    fn db(&self) -> &Database {
        self.services.db()
    }

    /// Builds the default-size leaderboard as seen by `user_id`.
    ///
    /// # Errors
    /// Returns an error if the ranking queries fail.
    pub async fn leaderboard(&self, user_id: i64) -> Result<Leaderboard> {
        self.leaderboard_with_limit(user_id, DEFAULT_LEADERBOARD_SIZE)
            .await
    }

    /// Builds a leaderboard of up to `limit` entries as seen by `user_id`.
    ///
    /// Both the page and the viewer's rank come from the same ordering, so a
    /// viewer on the page is never also reported below it.
    ///
    /// # Errors
    /// Returns an error if `limit` is out of range or the ranking queries
    /// fail.
    pub async fn leaderboard_with_limit(&self, user_id: i64, limit: i64) -> Result<Leaderboard> {
        if limit < 1 || limit > MAX_LEADERBOARD_SIZE {
            return Err(Error::Validation(format!(
                "leaderboard size must be between 1 and {MAX_LEADERBOARD_SIZE}"
            )));
        }

        let rows = self.db().leaderboard_rows(limit).await?;

        let mut entries = Vec::with_capacity(rows.len());
        let mut rank = 0;
        for row in rows {
            rank += 1;
            entries.push(LeaderboardEntry {
                rank,
                user_id: row.user_id,
                username: row.username,
                level: row.level,
                level_name: level_name(row.level),
                total_points: row.total_points,
                study_days: row.study_days,
                is_current_user: row.user_id == user_id,
            });
        }

        let current_user = if entries.iter().any(|entry| entry.is_current_user) {
            None
        } else {
            self.db().user_rank(user_id).await?.map(|row| CurrentUserRank {
                rank: row.rank,
                user_id: row.user_id,
                username: row.username,
                level: row.level,
                total_points: row.total_points,
            })
        };

        Ok(Leaderboard {
            entries,
            current_user,
        })
    }
}
