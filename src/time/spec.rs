//! Time specs and instant resolution
//!
//! OpenTSDB accepts times in several shapes: relative offsets (`1h-ago`),
//! the literal `now`, absolute text layouts (`2023/01/30-18:00:00`) and epoch
//! integers in either seconds or milliseconds.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time::duration::parse_duration;
use crate::time::error::{TimeError, TimeResult};

/// Wire format for absolute times (`YYYY/MM/DD-hh:mm:ss`, UTC)
pub const TSDB_TIME_FORMAT: &str = "%Y/%m/%d-%H:%M:%S";

/// Suffix marking a relative time spec
pub const RELATIVE_SUFFIX: &str = "-ago";

/// Largest value treated as epoch seconds; anything above is milliseconds
pub const MAX_EPOCH_SECONDS: i64 = 9_999_999_999;

/// Absolute layouts, most to least granular
///
/// Each entry is the literal input length the layout accepts, the chrono
/// format, and the padding appended so that chrono sees a full date-time.
const ABS_LAYOUTS: [(usize, &str, &str); 7] = [
    (19, "%Y/%m/%d-%H:%M:%S", ""),
    (19, "%Y/%m/%d %H:%M:%S", ""),
    (16, "%Y/%m/%d-%H:%M", ""),
    (16, "%Y/%m/%d %H:%M", ""),
    (13, "%Y/%m/%d-%H:%M", ":00"),
    (13, "%Y/%m/%d %H:%M", ":00"),
    (10, "%Y/%m/%d-%H:%M", "-00:00"),
];

/// An opaque textual time value
///
/// May be empty (meaning "now" or "unset" depending on context), relative
/// (`5m-ago`), `now`, an epoch integer, or an absolute layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSpec(String);

impl TimeSpec {
    pub fn new(spec: impl Into<String>) -> Self {
        Self(spec.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True for `…-ago` specs
    pub fn is_relative(&self) -> bool {
        self.0.ends_with(RELATIVE_SUFFIX)
    }

    /// Spec holding an instant as epoch seconds
    pub fn from_epoch(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp().to_string())
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TimeSpec {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TimeSpec {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A start or end time as it appears in a request
///
/// JSON bodies may carry either a string spec or a number; numbers are
/// epoch seconds or milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeValue {
    /// Integer epoch (seconds or milliseconds)
    Epoch(i64),
    /// Floating epoch, truncated on use
    Float(f64),
    /// Textual spec
    Spec(TimeSpec),
}

impl TimeValue {
    /// True for the empty textual spec
    pub fn is_empty(&self) -> bool {
        matches!(self, TimeValue::Spec(s) if s.is_empty())
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, TimeValue::Spec(s) if s.is_relative())
    }
}

impl Default for TimeValue {
    fn default() -> Self {
        TimeValue::Spec(TimeSpec::default())
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeValue::Epoch(i) => write!(f, "{}", i),
            TimeValue::Float(v) => write!(f, "{}", v),
            TimeValue::Spec(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for TimeValue {
    fn from(s: &str) -> Self {
        TimeValue::Spec(TimeSpec::from(s))
    }
}

impl From<TimeSpec> for TimeValue {
    fn from(s: TimeSpec) -> Self {
        TimeValue::Spec(s)
    }
}

impl From<i64> for TimeValue {
    fn from(i: i64) -> Self {
        TimeValue::Epoch(i)
    }
}

/// Resolve a time value against the current instant
pub fn parse_time(value: &TimeValue) -> TimeResult<DateTime<Utc>> {
    parse_time_at(value, Utc::now())
}

/// Resolve a time value against an explicit reference instant
///
/// Empty specs and `now` resolve to `now`; `X-ago` subtracts the duration
/// `X`. Numeric values above [`MAX_EPOCH_SECONDS`] are milliseconds.
pub fn parse_time_at(value: &TimeValue, now: DateTime<Utc>) -> TimeResult<DateTime<Utc>> {
    match value {
        TimeValue::Spec(spec) => {
            let s = spec.as_str();
            if s.is_empty() {
                return Ok(now);
            }
            if let Some(offset) = s.strip_suffix(RELATIVE_SUFFIX) {
                let d = parse_duration(offset)?;
                return d
                    .to_chrono()
                    .and_then(|d| now.checked_sub_signed(d))
                    .ok_or_else(|| TimeError::OutOfRange(s.to_string()));
            }
            if s.eq_ignore_ascii_case("now") {
                return Ok(now);
            }
            parse_abs_time(s)
        }
        TimeValue::Epoch(i) => from_epoch(normalize_epoch(*i)),
        TimeValue::Float(f) => from_epoch(normalize_epoch(*f as i64)),
    }
}

/// Parse any non-relative format
///
/// Layouts are only attempted when their literal length equals the input
/// length. If none matches, the text must be an epoch integer; values with
/// more than ten digits are milliseconds.
pub fn parse_abs_time(text: &str) -> TimeResult<DateTime<Utc>> {
    for (len, format, pad) in ABS_LAYOUTS {
        if text.len() != len {
            continue;
        }
        let padded = format!("{}{}", text, pad);
        if let Ok(naive) = NaiveDateTime::parse_from_str(&padded, format) {
            return Ok(naive.and_utc());
        }
    }

    let epoch: i64 = text
        .parse()
        .map_err(|_| TimeError::Parse(text.to_string()))?;
    from_epoch(normalize_epoch(epoch))
}

/// Render a time value in the wire format, leaving relative specs untouched
pub fn canonical_time(value: &TimeValue) -> TimeResult<String> {
    canonical_time_at(value, Utc::now())
}

pub fn canonical_time_at(value: &TimeValue, now: DateTime<Utc>) -> TimeResult<String> {
    if value.is_relative() {
        return Ok(value.to_string());
    }
    let t = parse_time_at(value, now)?;
    Ok(t.format(TSDB_TIME_FORMAT).to_string())
}

/// Normalize absolute times to integer epoch seconds
///
/// Text that parses as an absolute time and every numeric value become
/// [`TimeValue::Epoch`] in seconds. Anything else (relative specs, `now`,
/// garbage) is returned unchanged.
pub fn try_parse_abs_time(value: TimeValue) -> TimeValue {
    match value {
        TimeValue::Spec(ref spec) => match parse_abs_time(spec.as_str()) {
            Ok(t) => TimeValue::Epoch(t.timestamp()),
            Err(_) => value,
        },
        TimeValue::Float(f) => {
            let f = if f > MAX_EPOCH_SECONDS as f64 { f / 1000.0 } else { f };
            TimeValue::Epoch(f as i64)
        }
        TimeValue::Epoch(i) => TimeValue::Epoch(normalize_epoch(i)),
    }
}

fn normalize_epoch(i: i64) -> i64 {
    if i > MAX_EPOCH_SECONDS {
        i / 1000
    } else {
        i
    }
}

fn from_epoch(secs: i64) -> TimeResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| TimeError::OutOfRange(secs.to_string()))
}
