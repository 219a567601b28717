//! Pure gamification and statistics rules, free of I/O.

pub mod achievement;
pub mod dates;
pub mod goal;
pub mod level;
pub mod points;
pub mod session;
pub mod stats;
pub mod streak;
