//! Persistence layer modules.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{AppError, Result};

pub mod db;
pub mod reminder_repo;
pub mod schema;
pub mod task_repo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

/// Encode a timestamp as fixed-width RFC 3339 UTC so that lexical order in
/// `SQLite` matches chronological order.
pub(crate) fn encode_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a timestamp written by [`encode_ts`].
pub(crate) fn decode_ts(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Store(format!("invalid {field}: {e}")))
}
