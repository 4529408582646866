//! Coercion of loosely-typed table cells into comparable instants and floats
//!
//! Every table the core consumes arrives as JSON-like rows (PostgREST responses,
//! SQLite rows converted to JSON values). Nothing in here fails: unparseable
//! timestamps become `None`, unparseable numbers become `NaN`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use serde_json::{Number, Value};

/// One untyped table row, keyed by column name
pub type Row = serde_json::Map<String, Value>;

/// Wire format for instants sent to the datastore in filter predicates
pub const ISO_UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

/// Parse an arbitrary timestamp cell into a UTC instant
///
/// Accepts RFC 3339 strings, Postgres-style `YYYY-MM-DD HH:MM:SS+00` text,
/// naive date-times (interpreted as UTC), bare dates, and numeric epochs.
/// Numeric epochs are scaled by magnitude: seconds, milliseconds,
/// microseconds, then nanoseconds.
pub fn to_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_instant_str(s),
        Value::Number(n) => n.as_f64().and_then(epoch_to_instant),
        _ => None,
    }
}

/// String form of [`to_instant`]
pub fn parse_instant_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    // Trailing "Z" without the "T" separator is common in hand-written fixtures
    let trimmed = s.strip_suffix('Z').unwrap_or(s);
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    s.parse::<f64>().ok().and_then(epoch_to_instant)
}

fn epoch_to_instant(raw: f64) -> Option<DateTime<Utc>> {
    if !raw.is_finite() {
        return None;
    }

    let magnitude = raw.abs();
    let micros = if magnitude < 1e11 {
        raw * 1e6
    } else if magnitude < 1e14 {
        raw * 1e3
    } else if magnitude < 1e17 {
        raw
    } else {
        raw / 1e3
    };

    DateTime::<Utc>::from_timestamp_micros(micros.round() as i64)
}

/// Coerce a cell to `f64`; anything unparseable becomes `NaN`
pub fn to_numeric(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => f64::NAN,
    }
}

/// Coerce the named columns of every row to numbers in place
///
/// Cells that cannot be parsed become `null` (read back as `NaN` by
/// [`to_numeric`]). Columns absent from a row are left absent and rows are
/// never dropped.
pub fn to_numeric_columns(rows: &mut [Row], cols: &[&str]) {
    for row in rows.iter_mut() {
        for col in cols {
            if let Some(cell) = row.get_mut(*col) {
                let parsed = to_numeric(cell);
                *cell = Number::from_f64(parsed).map(Value::Number).unwrap_or(Value::Null);
            }
        }
    }
}

/// Read a numeric column from a row; missing columns read as `NaN`
pub fn numeric_cell(row: &Row, col: &str) -> f64 {
    row.get(col).map(to_numeric).unwrap_or(f64::NAN)
}

/// Read a timestamp column from a row
pub fn instant_cell(row: &Row, col: &str) -> Option<DateTime<Utc>> {
    row.get(col).and_then(to_instant)
}

/// Read a non-empty text column from a row; numbers are rendered as text
pub fn text_cell(row: &Row, col: &str) -> Option<String> {
    match row.get(col)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Truncate (not round) an instant to the whole second
pub fn floor_to_second(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(0)
}

/// Canonical `YYYY-MM-DDTHH:MM:SSZ` form used in datastore filter predicates
pub fn format_iso_utc(instant: DateTime<Utc>) -> String {
    floor_to_second(instant).format(ISO_UTC_FORMAT).to_string()
}
