//! Timestamp encoding for TEXT columns.
//!
//! All timestamps are written as fixed-width UTC RFC 3339 with microseconds,
//! e.g. `2024-05-01T12:00:00.000000Z`. Fixed width keeps SQL string
//! comparison (`<`, `>`, `MAX`) in chronological order, which only holds for
//! four-digit years. Anything else is rejected on the way in and on the way
//! out.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Datelike, NaiveDateTime, Utc};

const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Whether `ts` has a four-digit year and so encodes in sort order.
pub fn in_range(ts: &DateTime<Utc>) -> bool {
    (0..=9999).contains(&ts.year())
}

pub fn encode(ts: DateTime<Utc>) -> Result<String> {
    if !in_range(&ts) {
        bail!("timestamp {} is outside years 0000-9999", ts);
    }
    Ok(ts.format(FORMAT).to_string())
}

pub fn decode(raw: &str) -> Result<DateTime<Utc>> {
    let ts = NaiveDateTime::parse_from_str(raw, FORMAT)
        .with_context(|| format!("invalid timestamp '{}'", raw))?
        .and_utc();

    // Only the canonical form compares correctly in SQL.
    if encode(ts)? != raw {
        bail!("non-canonical timestamp '{}'", raw);
    }
    Ok(ts)
}
