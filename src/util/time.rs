//! Timestamp parsing and formatting.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Result, ThreadkeepError};

/// Parse an export timestamp (RFC3339, optional fractional seconds and offset).
///
/// # Errors
///
/// Returns a validation error naming `field_name` if the value is not RFC3339.
pub fn parse_timestamp(s: &str, field_name: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            ThreadkeepError::validation(field_name, format!("invalid timestamp '{s}': {e}"))
        })
}

/// Format a timestamp for storage; fixed width so text ordering matches time ordering.
#[must_use]
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp, tolerating SQLite's `CURRENT_TIMESTAMP` format.
#[must_use]
pub fn parse_stored_timestamp(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}
