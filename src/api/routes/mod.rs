//! API Routes
//!
//! Route handlers organized by functionality.

pub mod health;
pub mod indexer;
pub mod presents;
pub mod search;

/// Current unix time in seconds, for the read-time status projection
pub(crate) fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
