pub mod auth;
pub mod follows;
pub mod likes;
pub mod messages;
pub mod middleware;
pub mod users;
pub mod validate;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

/// Parse a timestamp column into UTC.
pub(crate) fn parse_sqlite_timestamp(raw: &str, context: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
            // Parse as naive UTC and convert.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on {}: {}", raw, context, e);
            DateTime::default()
        })
}
