//! App-layer composition root.
//!
//! This module wires the service container and the managers that implement
//! session lifecycle, scoring, statistics, goals, and ranking on top of the
//! database layer. Managers share one [`AppServices`] container and take
//! explicit dates and timestamps through `*_at` variants so behavior stays
//! reproducible in tests.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod dashboard;
pub mod gamification;
pub mod goals;
pub mod leaderboard;
pub mod service;
pub mod sessions;
pub mod stats;

pub use dashboard::DashboardManager;
pub use gamification::GamificationManager;
pub use goals::GoalManager;
pub use leaderboard::LeaderboardManager;
pub use service::AppServices;
pub use sessions::SessionManager;
pub use stats::StatsManager;

/// Returns the current unix timestamp in seconds.
pub(crate) fn unix_now() -> i64 {
    epoch_seconds(SystemTime::now())
}

fn epoch_seconds(at: SystemTime) -> i64 {
    match at.duration_since(UNIX_EPOCH) {
        Ok(duration) => i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
        Err(_) => {
            tracing::debug!("system clock reports a pre-epoch time, using 0");
            0
        }
    }
}
