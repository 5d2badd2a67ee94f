//! Utility functions for build ids and timestamp handling.

pub mod timestamps;

pub use timestamps::{duration_ms, iso_timestamp, now_utc, Timestamp};

use uuid::Uuid;

/// Generates a new build id.
///
/// Uses UUID v7 so that ids sort by creation time.
#[must_use]
pub fn generate_build_id() -> Uuid {
    Uuid::now_v7()
}
