//! Lenient timestamp decoding for backend payloads.
//!
//! The backend serializes its local date-times either as ISO-8601 text (with or
//! without an offset) or as the Jackson array form `[y, m, d, h, mi, s, nanos]`.
//! Epoch milliseconds are accepted as well. Values with an offset are normalized
//! to UTC before the offset is dropped.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{de, Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Parts(Vec<i64>),
    Millis(i64),
}

/// Use with `#[serde(default, deserialize_with = "timestamp::deserialize")]`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawTimestamp> = Option::deserialize(deserializer)?;
    raw.map(parse).transpose().map_err(de::Error::custom)
}

fn parse(raw: RawTimestamp) -> Result<NaiveDateTime, String> {
    match raw {
        RawTimestamp::Text(text) => parse_text(&text),
        RawTimestamp::Parts(parts) => parse_parts(&parts),
        RawTimestamp::Millis(ms) => DateTime::from_timestamp_millis(ms)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| format!("epoch millis out of range: {}", ms)),
    }
}

fn parse_text(text: &str) -> Result<NaiveDateTime, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|e| format!("invalid timestamp '{}': {}", text, e))
}

fn parse_parts(parts: &[i64]) -> Result<NaiveDateTime, String> {
    let part = |i: usize| parts.get(i).copied().unwrap_or(0);
    if parts.len() < 3 {
        return Err(format!("timestamp array too short: {:?}", parts));
    }
    let to_u32 =
        |v: i64| u32::try_from(v).map_err(|_| format!("invalid timestamp component: {}", v));
    let year = i32::try_from(part(0)).map_err(|_| format!("invalid year: {}", part(0)))?;
    NaiveDate::from_ymd_opt(year, to_u32(part(1))?, to_u32(part(2))?)
        .and_then(|d| {
            d.and_hms_nano_opt(
                to_u32(part(3)).ok()?,
                to_u32(part(4)).ok()?,
                to_u32(part(5)).ok()?,
                to_u32(part(6)).ok()?,
            )
        })
        .ok_or_else(|| format!("invalid timestamp array: {:?}", parts))
}
