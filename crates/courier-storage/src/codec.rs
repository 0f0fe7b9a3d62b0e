// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Column encoding shared by the query modules.
//!
//! Timestamps are stored as RFC 3339 with millisecond precision and a `Z`
//! suffix, so lexical comparison in SQL matches chronological order.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;

use courier_core::types::{EventType, InboundEvent, Priority};

pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `ts + delay`, saturating at the end of year 9999 so the stored text
/// keeps its four-digit year.
pub fn add_delay(ts: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| ts.checked_add_signed(d))
        .filter(|t| *t <= far_future())
        .unwrap_or_else(far_future)
}

fn far_future() -> DateTime<Utc> {
    DateTime::from_timestamp(253_402_300_799, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn ts_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

pub fn opt_ts_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_ts(idx, &r)).transpose()
}

pub fn json_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parse a strum-backed enum column.
pub fn enum_col<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = strum::ParseError>,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read the six event columns starting at `start`:
/// `event_id, event_type, ticket_id, payload, priority, enqueued_at`.
pub fn event_cols(row: &rusqlite::Row<'_>, start: usize) -> rusqlite::Result<InboundEvent> {
    let event_type: EventType = enum_col(row, start + 1)?;
    let level: u8 = row.get(start + 4)?;
    let priority = Priority::from_level(level).ok_or(rusqlite::Error::IntegralValueOutOfRange(
        start + 4,
        i64::from(level),
    ))?;
    Ok(InboundEvent {
        id: row.get(start)?,
        event_type,
        ticket_id: row.get(start + 2)?,
        payload: json_col(row, start + 3)?,
        priority,
        enqueued_at: ts_col(row, start + 5)?,
    })
}
