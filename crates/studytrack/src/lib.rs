//! Scoring and statistics core of a study-habit tracking backend.
//!
//! The crate is organized in three layers:
//! - [`domain`] holds the pure gamification rules (points, streaks, levels,
//!   achievement conditions) and statistics helpers. No I/O.
//! - [`infra`] holds the `SQLite` persistence layer and the aggregate queries
//!   the domain rules are evaluated against.
//! - [`app`] composes both into the services a controller layer calls:
//!   session lifecycle, reward processing, rollups, leaderboard, dashboard.

pub mod app;
pub mod domain;
pub mod error;
pub mod infra;

pub use error::{Error, Result};
pub use infra::db;
