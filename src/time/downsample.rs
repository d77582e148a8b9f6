//! Downsample specs
//!
//! A downsample spec reduces sample density: `<interval>-<agg>[-<fill>]`,
//! e.g. `15s-avg`, `1h-max`, `1m-sum-zero`.

use nom::{
    bytes::complete::take_while1,
    character::complete::{char, one_of},
    combinator::{all_consuming, opt, recognize},
    multi::many1,
    sequence::{pair, preceded, tuple},
    IResult,
};
use std::fmt;
use std::str::FromStr;

use crate::time::duration::{parse_duration, Duration};
use crate::time::error::{TimeError, TimeResult};

/// A parsed downsample spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downsample {
    pub interval: Duration,
    pub aggregator: String,
    pub fill: Option<String>,
}

impl fmt::Display for Downsample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.interval, self.aggregator)?;
        if let Some(fill) = &self.fill {
            write!(f, "-{}", fill)?;
        }
        Ok(())
    }
}

impl FromStr for Downsample {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TimeError::Duration(s.to_string());
        let (_, (interval, aggregator, fill)) =
            all_consuming(parse_spec)(s).map_err(|_| invalid())?;
        Ok(Downsample {
            interval: parse_duration(interval)?,
            aggregator: aggregator.to_string(),
            fill: fill.map(str::to_string),
        })
    }
}

/// Interval of a downsample spec
///
/// Matches anywhere in `text`; the first
/// `<interval>-<agg>[-<fill>]` occurrence is used.
pub fn parse_downsample(text: &str) -> TimeResult<Duration> {
    for (start, _) in text.char_indices() {
        if let Ok((_, (interval, _, _))) = parse_spec(&text[start..]) {
            return parse_duration(interval);
        }
    }
    Err(TimeError::Duration(text.to_string()))
}

fn parse_spec(input: &str) -> IResult<&str, (&str, &str, Option<&str>)> {
    tuple((
        parse_interval,
        preceded(char('-'), lower_word),
        opt(preceded(char('-'), lower_word)),
    ))(input)
}

/// `[+-]<digits>[.<digits>]<unit>` repeated, e.g. `1h30m`
fn parse_interval(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        opt(one_of("+-")),
        many1(pair(
            take_while1(|c: char| c.is_ascii_digit() || c == '.'),
            take_while1(|c: char| matches!(c, 'm' | 's' | 'h' | 'd' | 'w' | 'n' | 'y')),
        )),
    ))(input)
}

fn lower_word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_lowercase())(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_downsample_interval() {
        assert_eq!(parse_downsample("500ms-avg").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_downsample("15s-avg").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_downsample("1h-max-zero").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_downsample_errors() {
        assert!(parse_downsample("").is_err());
        assert!(parse_downsample("avg").is_err());
        assert!(parse_downsample("15s").is_err());
        assert!(parse_downsample("15x-avg").is_err());
    }

    #[test]
    fn test_downsample_struct() {
        let ds: Downsample = "1m-sum-zero".parse().unwrap();
        assert_eq!(ds.interval, Duration::from_secs(60));
        assert_eq!(ds.aggregator, "sum");
        assert_eq!(ds.fill.as_deref(), Some("zero"));
        assert_eq!(ds.to_string(), "1m-sum-zero");

        let ds: Downsample = "15s-avg".parse().unwrap();
        assert_eq!(ds.fill, None);
        assert_eq!(ds.to_string(), "15s-avg");

        assert!("15s-AVG".parse::<Downsample>().is_err());
    }
}
