//! Incremental sync cursors.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The cursor sent back to the remote catalog on the next poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Watermark {
    /// Numeric bookmark (bookmark variant).
    Bookmark(u64),
    /// ISO-8601 timestamp, kept verbatim as received (pagination-link variant).
    Timestamp(String),
}

impl Watermark {
    /// The value sent as the delta query parameter.
    pub fn as_query_value(&self) -> String {
        self.to_string()
    }

    /// Orders two watermarks of the same kind.
    ///
    /// Returns `None` when the kinds differ or a timestamp does not parse.
    pub fn compare(&self, other: &Watermark) -> Option<Ordering> {
        match (self, other) {
            (Watermark::Bookmark(a), Watermark::Bookmark(b)) => Some(a.cmp(b)),
            (Watermark::Timestamp(a), Watermark::Timestamp(b)) => {
                Some(parse_timestamp(a)?.cmp(&parse_timestamp(b)?))
            }
            _ => None,
        }
    }

    /// Returns whichever of `previous` and `candidate` is later.
    ///
    /// A candidate that cannot be ordered against `previous` wins.
    pub fn latest(previous: Option<&Watermark>, candidate: Watermark) -> Watermark {
        match previous {
            Some(prev) if prev.compare(&candidate) == Some(Ordering::Greater) => prev.clone(),
            _ => candidate,
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Watermark::Bookmark(b) => write!(f, "{b}"),
            Watermark::Timestamp(t) => f.write_str(t),
        }
    }
}

/// Parses an ISO-8601 date-time.
///
/// Accepts RFC 3339 with any fractional precision and offset. A value with no
/// offset is read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed);
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Returns the original text of the latest parseable timestamp.
///
/// Unparseable values are skipped. Ties keep the first occurrence.
pub fn latest_timestamp<'a, I>(values: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut latest: Option<(&'a str, DateTime<Utc>)> = None;
    for value in values {
        let Some(parsed) = parse_timestamp(value) else {
            continue;
        };
        let instant = parsed.with_timezone(&Utc);
        match latest {
            Some((_, current)) if current >= instant => {}
            _ => latest = Some((value, instant)),
        }
    }
    latest.map(|(text, _)| text)
}
