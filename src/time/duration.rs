//! Signed durations with OpenTSDB unit suffixes
//!
//! Durations are kept at millisecond resolution. The compact text form uses
//! the units accepted by OpenTSDB:
//!
//! ```text
//! ms  s  m  h  d  w  n (30 days)  y (365 days)
//! ```

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit0, digit1, one_of},
    combinator::{all_consuming, opt, recognize, value},
    multi::many1,
    sequence::pair,
    IResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::time::error::{TimeError, TimeResult};

pub const MILLISECOND: i64 = 1;
pub const SECOND: i64 = 1000 * MILLISECOND;
pub const MINUTE: i64 = 60 * SECOND;
pub const HOUR: i64 = 60 * MINUTE;
pub const DAY: i64 = 24 * HOUR;
pub const WEEK: i64 = 7 * DAY;
/// OpenTSDB's `n` unit
pub const MONTH: i64 = 30 * DAY;
pub const YEAR: i64 = 365 * DAY;

/// Units from largest to smallest, used for the compact rendering
const UNITS: [(i64, &str); 8] = [
    (YEAR, "y"),
    (MONTH, "n"),
    (WEEK, "w"),
    (DAY, "d"),
    (HOUR, "h"),
    (MINUTE, "m"),
    (SECOND, "s"),
    (MILLISECOND, "ms"),
];

/// A signed interval with millisecond resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Duration(i64);

impl Duration {
    pub const ZERO: Duration = Duration(0);
    pub const MAX: Duration = Duration(i64::MAX);

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * SECOND)
    }

    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Length in seconds, including the fractional part
    pub fn seconds(&self) -> f64 {
        self.0 as f64 / SECOND as f64
    }

    /// Length in whole seconds, truncated toward zero
    pub fn seconds_i64(&self) -> i64 {
        self.0 / SECOND
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Convert to a chrono duration for instant arithmetic
    pub fn to_chrono(&self) -> Option<chrono::Duration> {
        chrono::Duration::try_milliseconds(self.0)
    }

    /// Build from the difference between two instants
    pub fn from_chrono(d: chrono::Duration) -> Self {
        Self(d.num_milliseconds())
    }

    /// Render as hours, minutes and seconds, e.g. `7260h54m51s`
    ///
    /// Sub-second durations render in milliseconds (`250ms`) and fractional
    /// seconds keep their significant digits (`1.5s`).
    pub fn span_string(&self) -> String {
        if self.0 == 0 {
            return "0s".to_string();
        }

        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let second = SECOND as u64;

        if abs < second {
            return format!("{sign}{abs}ms");
        }

        let hours = abs / HOUR as u64;
        let minutes = (abs % HOUR as u64) / MINUTE as u64;
        let secs = (abs % MINUTE as u64) / second;
        let millis = abs % second;

        let mut seconds = secs.to_string();
        if millis > 0 {
            let frac = format!("{millis:03}");
            seconds.push('.');
            seconds.push_str(frac.trim_end_matches('0'));
        }

        if hours > 0 {
            format!("{sign}{hours}h{minutes}m{seconds}s")
        } else if minutes > 0 {
            format!("{sign}{minutes}m{seconds}s")
        } else {
            format!("{sign}{seconds}s")
        }
    }
}

impl fmt::Display for Duration {
    /// Compact form using the largest unit that divides the duration exactly
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "0s");
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        for (unit, suffix) in UNITS {
            let unit = unit as u64;
            if abs % unit == 0 {
                return write!(f, "{}{}{}", sign, abs / unit, suffix);
            }
        }
        write!(f, "{}{}ms", sign, abs)
    }
}

impl FromStr for Duration {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s)
    }
}

impl std::ops::Div<i64> for Duration {
    type Output = Duration;

    fn div(self, rhs: i64) -> Duration {
        Duration(self.0 / rhs)
    }
}

impl std::ops::Neg for Duration {
    type Output = Duration;

    fn neg(self) -> Duration {
        Duration(-self.0)
    }
}

/// Parse a duration like `15s`, `-1h`, `1h30m` or `1.5d`
///
/// A leading sign applies to the whole value. The bare literal `0` is
/// accepted without a unit.
pub fn parse_duration(text: &str) -> TimeResult<Duration> {
    let invalid = || TimeError::Duration(text.to_string());

    let (rest, sign) = parse_sign(text).map_err(|_| invalid())?;
    if rest == "0" {
        return Ok(Duration::ZERO);
    }

    let (_, components) = all_consuming(many1(parse_component))(rest).map_err(|_| invalid())?;

    let mut total: i64 = 0;
    for (numeral, unit) in components {
        let millis = scale(numeral, unit).ok_or_else(invalid)?;
        total = total.checked_add(millis).ok_or_else(invalid)?;
    }

    Ok(Duration(if sign == Some('-') { -total } else { total }))
}

fn parse_sign(input: &str) -> IResult<&str, Option<char>> {
    opt(one_of("+-"))(input)
}

/// One `<number><unit>` pair
fn parse_component(input: &str) -> IResult<&str, (&str, i64)> {
    pair(parse_numeral, parse_unit)(input)
}

fn parse_numeral(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(pair(digit1, opt(pair(char('.'), digit0)))),
        recognize(pair(char('.'), digit1)),
    ))(input)
}

fn parse_unit(input: &str) -> IResult<&str, i64> {
    alt((
        value(MILLISECOND, tag("ms")),
        value(SECOND, tag("s")),
        value(MINUTE, tag("m")),
        value(HOUR, tag("h")),
        value(DAY, tag("d")),
        value(WEEK, tag("w")),
        value(MONTH, tag("n")),
        value(YEAR, tag("y")),
    ))(input)
}

/// Multiply a decimal numeral by a unit, rounding the fraction to milliseconds
fn scale(numeral: &str, unit: i64) -> Option<i64> {
    let (whole, frac) = numeral.split_once('.').unwrap_or((numeral, ""));
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut millis = whole.checked_mul(unit)?;
    if !frac.is_empty() {
        let frac: f64 = format!("0.{}", frac).parse().ok()?;
        millis = millis.checked_add((frac * unit as f64).round() as i64)?;
    }
    Some(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("15s").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_millis(2 * DAY));
        assert_eq!(parse_duration("1w").unwrap(), Duration::from_millis(WEEK));
        assert_eq!(parse_duration("1n").unwrap(), Duration::from_millis(30 * DAY));
        assert_eq!(parse_duration("1y").unwrap(), Duration::from_millis(365 * DAY));
    }

    #[test]
    fn test_parse_signed_and_compound() {
        assert_eq!(parse_duration("-1h").unwrap(), Duration::from_secs(-3600));
        assert_eq!(parse_duration("+30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_duration(""), Err(TimeError::Duration(_))));
        assert!(parse_duration("15").is_err());
        assert!(parse_duration("15x").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("1h-").is_err());
    }

    #[test]
    fn test_display_compact() {
        assert_eq!(Duration::from_secs(15).to_string(), "15s");
        assert_eq!(Duration::from_secs(3600).to_string(), "1h");
        assert_eq!(Duration::from_secs(5400).to_string(), "90m");
        assert_eq!(Duration::from_millis(500).to_string(), "500ms");
        assert_eq!(Duration::from_millis(WEEK).to_string(), "1w");
        assert_eq!(Duration::from_millis(60 * DAY).to_string(), "2n");
        assert_eq!(Duration::from_millis(YEAR).to_string(), "1y");
        assert_eq!(Duration::from_secs(-120).to_string(), "-2m");
        assert_eq!(Duration::ZERO.to_string(), "0s");
    }

    #[test]
    fn test_display_parses_back() {
        for text in ["15s", "1h", "500ms", "3d", "2w", "1n", "1y", "-45m"] {
            let d = parse_duration(text).unwrap();
            assert_eq!(d.to_string(), text);
        }
    }

    #[test]
    fn test_span_string() {
        assert_eq!(Duration::from_secs(26_139_291).span_string(), "7260h54m51s");
        assert_eq!(Duration::from_secs(3600).span_string(), "1h0m0s");
        assert_eq!(Duration::from_secs(61).span_string(), "1m1s");
        assert_eq!(Duration::from_millis(1500).span_string(), "1.5s");
        assert_eq!(Duration::from_millis(250).span_string(), "250ms");
        assert_eq!(Duration::ZERO.span_string(), "0s");
    }

    #[test]
    fn test_seconds() {
        let d = Duration::from_millis(1500);
        assert_eq!(d.seconds(), 1.5);
        assert_eq!(d.seconds_i64(), 1);
        assert_eq!((Duration::from_secs(60) / 4).seconds_i64(), 15);
    }
}
