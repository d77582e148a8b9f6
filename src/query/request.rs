//! Request model
//!
//! A [`Request`] is a time window plus one or more sub-queries. It can be
//! decoded from a JSON body or from the URL form
//! (`start=1h-ago&m=sum:cpu{host=*}`), transformed, and encoded back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::query::ast::{null_as_default, Query, Version};
use crate::query::error::{QueryError, QueryResult};
use crate::query::parser::parse_query;
use crate::time::{
    canonical_time_at, parse_downsample, parse_time_at, try_parse_abs_time, Duration, TimeError,
    TimeSpec, TimeValue, SECOND,
};

/// Downsample intervals at or below this are left to the server
const AUTO_DOWNSAMPLE_FLOOR: Duration = Duration::from_secs(15);

/// A query request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(default, deserialize_with = "null_as_default")]
    pub start: TimeValue,
    /// Empty means "now"
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "TimeValue::is_empty"
    )]
    pub end: TimeValue,
    #[serde(default)]
    pub queries: Vec<Query>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub no_annotations: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub global_annotations: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ms_resolution: bool,
    #[serde(default, rename = "showTSUIDs", skip_serializing_if = "is_false")]
    pub show_tsuids: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub show_summary: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub show_stats: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub show_query: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub delete: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub use_calendar: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timezone: String,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Request {
    /// Create a request starting at `start` with no queries
    pub fn new(start: impl Into<TimeValue>) -> Self {
        Self {
            start: start.into(),
            ..Default::default()
        }
    }

    pub fn end(mut self, end: impl Into<TimeValue>) -> Self {
        self.end = end.into();
        self
    }

    pub fn query(mut self, query: Query) -> Self {
        self.queries.push(query);
        self
    }

    /// Decode a JSON body, normalizing absolute start and end times to epoch
    /// seconds
    pub fn from_json(body: &[u8]) -> QueryResult<Self> {
        let mut r: Request = serde_json::from_slice(body)?;
        r.start = try_parse_abs_time(std::mem::take(&mut r.start));
        r.end = try_parse_abs_time(std::mem::take(&mut r.end));
        Ok(r)
    }

    /// URL-encoded form with keys in ascending order (`end`, `m`, `start`)
    pub fn encode(&self) -> String {
        self.encode_at(Utc::now())
    }

    pub fn encode_at(&self, now: DateTime<Utc>) -> String {
        self.form_pairs(now)
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Unescaped form, as shown to humans
    pub fn to_string_at(&self, now: DateTime<Utc>) -> String {
        self.form_pairs(now)
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// `key=value&` pairs for OpenTSDB's `/` route
    ///
    /// The UI reads them from the URL fragment, so values are not escaped.
    pub fn search(&self) -> String {
        self.search_at(Utc::now())
    }

    pub fn search_at(&self, now: DateTime<Utc>) -> String {
        self.form_pairs(now)
            .iter()
            .map(|(k, v)| format!("{}={}&", k, v))
            .collect()
    }

    /// Times that fail to resolve are left out
    fn form_pairs(&self, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(self.queries.len() + 2);
        if !self.end.is_empty() {
            if let Ok(end) = canonical_time_at(&self.end, now) {
                pairs.push(("end", end));
            }
        }
        for q in &self.queries {
            pairs.push(("m", q.to_string()));
        }
        if let Ok(start) = canonical_time_at(&self.start, now) {
            pairs.push(("start", start));
        }
        pairs
    }

    /// Time between start and end
    pub fn duration(&self) -> QueryResult<Duration> {
        self.duration_at(Utc::now())
    }

    pub fn duration_at(&self, now: DateTime<Utc>) -> QueryResult<Duration> {
        if self.start.is_empty() {
            return Err(QueryError::MissingStart);
        }
        let start = parse_time_at(&self.start, now)?;
        let end = self.resolve_end(now)?;
        Ok(Duration::from_chrono(end - start))
    }

    /// Resolved end as an epoch-seconds spec
    pub fn end_spec(&self) -> QueryResult<TimeSpec> {
        self.end_spec_at(Utc::now())
    }

    pub fn end_spec_at(&self, now: DateTime<Utc>) -> QueryResult<TimeSpec> {
        Ok(TimeSpec::from_epoch(self.resolve_end(now)?))
    }

    fn resolve_end(&self, now: DateTime<Utc>) -> QueryResult<DateTime<Utc>> {
        if self.end.is_empty() {
            Ok(now)
        } else {
            Ok(parse_time_at(&self.end, now)?)
        }
    }

    /// Set every query's downsample so the window yields about `points`
    /// points
    ///
    /// Intervals of 15s or less clear the downsample instead.
    pub fn auto_downsample(&mut self, points: usize) -> QueryResult<()> {
        self.auto_downsample_at(points, Utc::now())
    }

    pub fn auto_downsample_at(&mut self, points: usize, now: DateTime<Utc>) -> QueryResult<()> {
        if points == 0 {
            return Err(QueryError::InvalidAutoDownsample);
        }
        let interval = self.duration_at(now)? / points as i64;
        let spec = if interval > AUTO_DOWNSAMPLE_FLOOR {
            format!("{}s-avg", interval.seconds_i64())
        } else {
            String::new()
        };
        for q in &mut self.queries {
            q.downsample = spec.clone();
        }
        Ok(())
    }

    /// Shift the window so that `t` is treated as the current instant
    ///
    /// Relative times become absolute epoch seconds. A missing end becomes
    /// `t`.
    pub fn set_time(&mut self, t: DateTime<Utc>) -> QueryResult<()> {
        self.set_time_at(t, Utc::now())
    }

    pub fn set_time_at(&mut self, t: DateTime<Utc>, now: DateTime<Utc>) -> QueryResult<()> {
        let diff = t - now;
        let shift = |value: &TimeValue| -> QueryResult<DateTime<Utc>> {
            let at = parse_time_at(value, now)?;
            at.checked_add_signed(diff)
                .ok_or_else(|| TimeError::OutOfRange(value.to_string()).into())
        };
        let start = shift(&self.start)?;
        let end = if self.end.is_empty() { t } else { shift(&self.end)? };
        self.start = TimeSpec::from_epoch(start).into();
        self.end = TimeSpec::from_epoch(end).into();
        Ok(())
    }

    /// Smallest downsample interval among the queries, 1s if none parses
    pub fn min_downsample(&self) -> Duration {
        self.queries
            .iter()
            .filter_map(|q| parse_downsample(&q.downsample).ok())
            .min()
            .unwrap_or(Duration::from_millis(SECOND))
    }

    /// Estimated number of datapoints the request returns
    ///
    /// One point per second for queries without downsample, one per interval
    /// otherwise.
    pub fn estimate_dps(&self) -> QueryResult<i64> {
        self.estimate_dps_at(Utc::now())
    }

    pub fn estimate_dps_at(&self, now: DateTime<Utc>) -> QueryResult<i64> {
        let span = self.duration_at(now)?;
        let mut dps = 0i64;
        for q in &self.queries {
            if q.downsample.is_empty() {
                dps += span.seconds_i64();
                continue;
            }
            let interval = parse_downsample(&q.downsample)?;
            if interval.as_millis() > 0 {
                dps += span.as_millis() / interval.as_millis();
            }
        }
        Ok(dps)
    }
}

/// Unescaped URL form resolved against the current time
impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_at(Utc::now()))
    }
}

/// Parse a URL-form request: `start=1h-ago&end=now&m=sum:cpu`
///
/// `start` and at least one `m` are required.
pub fn parse_request(text: &str, version: Version) -> QueryResult<Request> {
    let mut start = None;
    let mut end = None;
    let mut queries = Vec::new();

    for pair in text.trim_start_matches('?').split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = decode_component(value);
        match key.as_str() {
            "start" if start.is_none() => start = Some(value),
            "end" if end.is_none() => end = Some(value),
            "m" => queries.push(value),
            _ => {}
        }
    }

    let start = start
        .filter(|s| !s.is_empty())
        .ok_or(QueryError::MissingStart)?;
    if queries.is_empty() {
        return Err(QueryError::MissingQuery(text.to_string()));
    }

    let mut r = Request::new(TimeSpec::new(start));
    if let Some(end) = end.filter(|e| !e.is_empty()) {
        r.end = TimeSpec::new(end).into();
    }
    for m in &queries {
        r.queries.push(parse_query(m, version)?);
    }
    Ok(r)
}

/// Form decoding: `+` is a space, invalid escapes are kept as is
fn decode_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_request_duration() {
        let r = parse_request(
            "start=2023/01/30-18:00:00&end=2023/01/30-23:00:00&m=avg:1h-max:system.cpu.percent{cluster=*}",
            Version::V2_1,
        )
        .unwrap();
        assert_eq!(r.queries.len(), 1);
        assert_eq!(r.queries[0].downsample, "1h-max");
        assert_eq!(r.duration_at(reference()).unwrap(), Duration::from_secs(18000));
    }

    #[test]
    fn test_parse_request_escaped() {
        let r = parse_request("start=1h-ago&m=sum%3Asystem.cpu%7Bhost%3D*%7D", Version::V2_1).unwrap();
        assert_eq!(r.queries[0].metric, "system.cpu");
        assert_eq!(r.queries[0].tags.get("host"), Some("*"));
        assert!(r.end.is_empty());
    }

    #[test]
    fn test_parse_request_requires_start_and_query() {
        assert!(matches!(
            parse_request("m=sum:cpu", Version::V2_1),
            Err(QueryError::MissingStart)
        ));
        assert!(matches!(
            parse_request("start=1h-ago", Version::V2_1),
            Err(QueryError::MissingQuery(_))
        ));
        assert!(matches!(
            parse_request("start=1h-ago&m=bogus", Version::V2_1),
            Err(QueryError::BadFormat(_))
        ));
    }

    #[test]
    fn test_from_json_encode() {
        let body = br#"{"start":1633860709920,"queries":[{"metric":"system.cpu.percent","aggregator":"sum","downsample":"15s-avg","tags":{"host":"*"}}]}"#;
        let r = Request::from_json(body).unwrap();
        assert_eq!(r.start, TimeValue::Epoch(1633860709));
        assert_eq!(
            r.to_string_at(reference()),
            "m=sum:15s-avg:system.cpu.percent{host=*}&start=2021/10/10-10:11:49"
        );
        assert_eq!(
            r.encode_at(reference()),
            "m=sum%3A15s-avg%3Asystem.cpu.percent%7Bhost%3D%2A%7D&start=2021%2F10%2F10-10%3A11%3A49"
        );
    }

    #[test]
    fn test_from_json_span() {
        let body = br#"{"start":1633860709920,"end":1660000000000,"queries":[]}"#;
        let r = Request::from_json(body).unwrap();
        let d = r.duration_at(reference()).unwrap();
        assert_eq!(d.span_string(), "7260h54m51s");
    }

    #[test]
    fn test_from_json_text_times() {
        let body = br#"{"start":"2021/10/10-10:11:49","end":"1h-ago","queries":[]}"#;
        let r = Request::from_json(body).unwrap();
        assert_eq!(r.start, TimeValue::Epoch(1633860709));
        assert_eq!(r.end, TimeValue::from("1h-ago"));
    }

    #[test]
    fn test_relative_times_pass_through() {
        let r = Request::new("1h-ago")
            .end("5m-ago")
            .query(Query::new("sum", "cpu"));
        assert_eq!(r.to_string_at(reference()), "end=5m-ago&m=sum:cpu&start=1h-ago");
        assert_eq!(r.search_at(reference()), "end=5m-ago&m=sum:cpu&start=1h-ago&");
    }

    #[test]
    fn test_duration_missing_start() {
        let r = Request::default();
        assert!(matches!(r.duration_at(reference()), Err(QueryError::MissingStart)));
    }

    #[test]
    fn test_end_spec() {
        let now = reference();
        let r = Request::new("1h-ago");
        assert_eq!(r.end_spec_at(now).unwrap().as_str(), now.timestamp().to_string());
    }

    #[test]
    fn test_auto_downsample() {
        let now = reference();
        let mut r = Request::new("1d-ago")
            .query(Query::new("sum", "a"))
            .query(Query::new("sum", "b").downsample("1m-max"));
        r.auto_downsample_at(100, now).unwrap();
        assert!(r.queries.iter().all(|q| q.downsample == "864s-avg"));

        let mut short = Request::new("10m-ago").query(Query::new("sum", "a").downsample("1m-avg"));
        short.auto_downsample_at(100, now).unwrap();
        assert_eq!(short.queries[0].downsample, "");

        assert!(matches!(
            r.auto_downsample_at(0, now),
            Err(QueryError::InvalidAutoDownsample)
        ));
    }

    #[test]
    fn test_set_time() {
        let now = reference();
        let t = now - chrono::Duration::hours(2);
        let mut r = Request::new("1h-ago");
        r.set_time_at(t, now).unwrap();
        assert_eq!(r.start, TimeValue::from(TimeSpec::from_epoch(t - chrono::Duration::hours(1))));
        assert_eq!(r.end, TimeValue::from(TimeSpec::from_epoch(t)));
    }

    #[test]
    fn test_out_of_range_times_are_errors() {
        let now = reference();
        let r = Request::new("100000000y-ago");
        assert!(matches!(
            r.duration_at(now),
            Err(QueryError::Time(TimeError::OutOfRange(_)))
        ));
        assert!(r.clone().auto_downsample_at(100, now).is_err());
        assert!(r.estimate_dps_at(now).is_err());

        let mut r = Request::new("1h-ago");
        let far = DateTime::<Utc>::MIN_UTC;
        assert!(r.set_time_at(far, now).is_err());
        assert_eq!(r.start, TimeValue::from("1h-ago"));
    }

    #[test]
    fn test_from_json_null_times() {
        let r = Request::from_json(br#"{"start":"1h-ago","end":null,"queries":[]}"#).unwrap();
        assert_eq!(r.start, TimeValue::from("1h-ago"));
        assert!(r.end.is_empty());
    }

    #[test]
    fn test_min_downsample() {
        let r = Request::new("1h-ago")
            .query(Query::new("sum", "a").downsample("5m-avg"))
            .query(Query::new("sum", "b").downsample("30s-max"))
            .query(Query::new("sum", "c"));
        assert_eq!(r.min_downsample(), Duration::from_secs(30));
        assert_eq!(Request::new("1h-ago").min_downsample(), Duration::from_secs(1));
    }

    #[test]
    fn test_estimate_dps() {
        let now = reference();
        let r = Request::new("1h-ago")
            .query(Query::new("sum", "a"))
            .query(Query::new("sum", "b").downsample("1m-avg"))
            .query(Query::new("sum", "c").downsample("500ms-avg"));
        assert_eq!(r.estimate_dps_at(now).unwrap(), 3600 + 60 + 7200);

        let bad = Request::new("1h-ago").query(Query::new("sum", "a").downsample("oops"));
        assert!(bad.estimate_dps_at(now).is_err());
    }

    #[test]
    fn test_json_flags_round_trip() {
        let mut r = Request::new("1h-ago").query(Query::new("sum", "cpu"));
        r.show_tsuids = true;
        r.ms_resolution = true;
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["showTSUIDs"], true);
        assert_eq!(json["msResolution"], true);
        assert!(json.get("end").is_none());
        assert!(json.get("delete").is_none());
        let back: Request = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }
}
