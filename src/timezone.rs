//! Conversions between absolute instants and IANA zone projections.
//!
//! Every function here is pure. Zone names are parsed on each call; the
//! `chrono-tz` database lookup is cheap enough that nothing is cached.

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{AppError, Result};

/// An instant projected into a zone. Carries its UTC offset, so the
/// projection is reversible even across a DST fall-back overlap.
pub type ZonedTime = DateTime<Tz>;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse an IANA zone name.
///
/// # Errors
///
/// Returns `AppError::InvalidTimeZone` if the name is not in the tz database.
pub fn parse_zone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| AppError::InvalidTimeZone(name.to_owned()))
}

/// Project an instant into `zone`.
///
/// # Errors
///
/// Returns `AppError::InvalidTimeZone` for an unknown zone name.
pub fn to_zoned_time(instant: DateTime<Utc>, zone: &str) -> Result<ZonedTime> {
    let tz = parse_zone(zone)?;
    Ok(instant.with_timezone(&tz))
}

/// Resolve a zoned time back to its absolute instant.
///
/// The zoned value is first re-expressed in `zone`, which never changes the
/// instant it denotes.
///
/// # Errors
///
/// Returns `AppError::InvalidTimeZone` for an unknown zone name.
pub fn to_instant(zoned: &ZonedTime, zone: &str) -> Result<DateTime<Utc>> {
    let tz = parse_zone(zone)?;
    Ok(zoned.with_timezone(&tz).with_timezone(&Utc))
}

/// Interpret a wall-clock time in `zone`.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant.
///
/// # Errors
///
/// Returns `AppError::InvalidTimeZone` for an unknown zone name and
/// `AppError::Validation` for a wall-clock time skipped by a DST gap.
pub fn local_to_instant(local: NaiveDateTime, zone: &str) -> Result<DateTime<Utc>> {
    let tz = parse_zone(zone)?;
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Ok(dt.with_timezone(&Utc)),
        LocalResult::None => Err(AppError::Validation(format!(
            "{local} does not exist in {zone}"
        ))),
    }
}

/// Parse a task origin given either as an RFC 3339 instant or as a naive
/// wall-clock time interpreted in `zone`.
///
/// The zone is validated even when the input carries its own offset.
///
/// # Errors
///
/// Returns `AppError::InvalidTimeZone` for an unknown zone and
/// `AppError::Validation` for input that matches no accepted format.
pub fn parse_origin(input: &str, zone: &str) -> Result<DateTime<Utc>> {
    parse_zone(zone)?;
    let trimmed = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| AppError::Validation(format!("unparseable datetime: {trimmed}")))?;
    local_to_instant(naive, zone)
}

/// Wall-clock projection of `instant` in `zone`, without offset.
///
/// # Errors
///
/// Returns `AppError::InvalidTimeZone` for an unknown zone name.
pub fn project_local(instant: DateTime<Utc>, zone: &str) -> Result<NaiveDateTime> {
    Ok(to_zoned_time(instant, zone)?.naive_local())
}

/// Human-readable rendering of `instant` in `zone`, e.g. `2025-06-01 15:00 EDT`.
///
/// # Errors
///
/// Returns `AppError::InvalidTimeZone` for an unknown zone name.
pub fn display_in_zone(instant: DateTime<Utc>, zone: &str) -> Result<String> {
    Ok(to_zoned_time(instant, zone)?
        .format("%Y-%m-%d %H:%M %Z")
        .to_string())
}
