//! Query Parser
//!
//! Parses compact OpenTSDB query strings into [`Query`] values.
//!
//! # Supported Syntax
//!
//! ```text
//! aggregator:[downsample:][rate[{counter[,max][,reset]}]:]metric[{group}][{group}]
//! ```
//!
//! The grammar depends on the server version:
//!
//! - **pre-2.2**: one trailing group of legacy `key=value` tags
//! - **2.2+**: up to two groups, grouping filters then non-grouping filters.
//!   Downsample and rate clauses are accepted in either order.
//!
//! # Examples
//!
//! ```text
//! sum:system.cpu.percent
//! avg:1h-max:system.cpu.percent{cluster=*}
//! sum:1m-avg:rate{counter,100}:net.bytes{host=wildcard(web*)}{dc=literal_or(east)}
//! ```

use nom::{
    bytes::complete::{tag, take_till, take_till1, take_while1},
    character::complete::char,
    combinator::{all_consuming, opt, recognize},
    sequence::{delimited, pair, terminated, tuple},
    IResult,
};

use crate::query::ast::{Filter, Filters, Query, RateOptions, Version};
use crate::query::error::{QueryError, QueryResult};
use crate::tags::{parse_tags, TagSet};

/// Clauses of a query string before validation
#[derive(Debug, Clone, PartialEq)]
struct RawQuery<'a> {
    aggregator: &'a str,
    downsample: Option<&'a str>,
    rate: Option<&'a str>,
    metric: &'a str,
    groups: [Option<&'a str>; 2],
}

type Variant = for<'a> fn(&'a str) -> IResult<&'a str, RawQuery<'a>>;

const LEGACY_VARIANTS: &[Variant] = &[legacy_query];
const FILTER_VARIANTS: &[Variant] = &[downsample_first_query, rate_first_query];

/// Parse a query string with the grammar of `version`
///
/// Errors carry no partial query. When a legacy tag group holds invalid
/// characters the tags that did parse are returned inside
/// [`TagError::InvalidCharacter`](crate::tags::TagError::InvalidCharacter).
pub fn parse_query(query: &str, version: Version) -> QueryResult<Query> {
    let variants = if version.filter_support() {
        FILTER_VARIANTS
    } else {
        LEGACY_VARIANTS
    };

    let raw = variants
        .iter()
        .find_map(|variant| all_consuming(*variant)(query).ok().map(|(_, raw)| raw))
        .ok_or_else(|| QueryError::BadFormat(query.to_string()))?;

    build_query(raw, version)
}

fn build_query(raw: RawQuery<'_>, version: Version) -> QueryResult<Query> {
    let mut q = Query {
        aggregator: raw.aggregator.to_string(),
        downsample: raw.downsample.unwrap_or_default().to_string(),
        metric: raw.metric.to_string(),
        ..Default::default()
    };

    if let Some(rate) = raw.rate {
        q.rate = true;
        let options = &rate["rate".len()..];
        if !options.is_empty() {
            q.rate_options = Some(parse_rate_options(options)?);
        }
    }

    if !version.filter_support() {
        if let Some(group) = raw.groups[0] {
            q.tags = parse_tags(group)?;
        }
        return Ok(q);
    }

    q.filters = Filters::new();
    q.group_by_tags = TagSet::new();
    for (group, grouping) in raw.groups.iter().zip([true, false]) {
        if let Some(group) = group {
            let filters = parse_filters(group, grouping)?;
            if grouping {
                for filter in &filters {
                    q.group_by_tags.insert(filter.tagk.clone(), "");
                }
            }
            q.filters.extend(filters);
        }
    }

    Ok(q)
}

/// Parse the `{counter|dropcounter[,counterMax][,resetValue]}` suffix of a
/// rate clause
fn parse_rate_options(text: &str) -> QueryResult<RateOptions> {
    let inner = text
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| QueryError::InvalidRateOptions(text.to_string()))?;

    let parse_int = |s: &str| -> QueryResult<i64> {
        s.parse()
            .map_err(|_| QueryError::InvalidNumber(s.to_string()))
    };

    let mut parts = inner.split(',');
    let kind = parts.next().unwrap_or_default();
    let mut opts = RateOptions {
        counter: kind == "counter" || kind == "dropcounter",
        drop_resets: kind == "dropcounter",
        ..Default::default()
    };
    if let Some(max) = parts.next().filter(|s| !s.is_empty()) {
        opts.counter_max = parse_int(max)?;
    }
    if let Some(reset) = parts.next() {
        opts.reset_value = parse_int(reset)?;
    }
    Ok(opts)
}

/// Parse a `tagk=value,...` filter group
///
/// Values of the form `func(expr)` name their filter type. Anything else is
/// promoted the way OpenTSDB does: `*` becomes `wildcard`, other values
/// containing `*` become `iwildcard`, the rest `literal_or`.
pub fn parse_filters(raw: &str, grouping: bool) -> QueryResult<Vec<Filter>> {
    raw.split(',')
        .map(|pair| {
            let (tagk, value) = pair
                .split_once('=')
                .ok_or_else(|| QueryError::BadFilter(raw.to_string()))?;
            let (kind, expr) = match filter_function(value) {
                Some(found) => found,
                None if value == "*" => ("wildcard", value),
                None if value.contains('*') => ("iwildcard", value),
                None => ("literal_or", value),
            };
            Ok(Filter::new(tagk, kind, expr, grouping))
        })
        .collect()
}

/// Find a trailing `name(expr)` call in a filter value
///
/// The name is the first run of `[a-z_]` directly followed by `(`; the
/// expression runs from there to the final `)`.
fn filter_function(value: &str) -> Option<(&str, &str)> {
    let body = value.strip_suffix(')')?;
    let is_name_char = |c: char| c.is_ascii_lowercase() || c == '_';

    for (open, _) in body.match_indices('(') {
        let prefix = &body[..open];
        let name_start = prefix
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_name_char(*c))
            .last()
            .map(|(i, _)| i);
        if let Some(start) = name_start {
            return Some((&body[start..open], &body[open + 1..]));
        }
    }
    None
}

fn word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn aggregator(input: &str) -> IResult<&str, &str> {
    terminated(word, char(':'))(input)
}

fn metric(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '-'))(input)
}

/// `<interval>-<agg>`
fn legacy_downsample(input: &str) -> IResult<&str, &str> {
    recognize(tuple((word, char('-'), word)))(input)
}

/// `<interval>-<agg>[-<fill>]`
fn downsample(input: &str) -> IResult<&str, &str> {
    recognize(tuple((word, char('-'), word, opt(pair(char('-'), word)))))(input)
}

/// `rate` followed by anything up to the next `:`
fn legacy_rate(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("rate"), take_till(|c: char| c == ':')))(input)
}

/// `rate` with optional `{…}` options
fn rate(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        tag("rate"),
        opt(tuple((char('{'), take_till(|c: char| c == '}'), char('}')))),
    ))(input)
}

fn legacy_group(input: &str) -> IResult<&str, &str> {
    delimited(char('{'), take_while1(|c: char| matches!(c, '*'..='|')), char('}'))(input)
}

/// `{…}`, possibly empty
fn filter_group(input: &str) -> IResult<&str, Option<&str>> {
    delimited(char('{'), opt(take_till1(|c: char| c == '}')), char('}'))(input)
}

fn legacy_query(input: &str) -> IResult<&str, RawQuery<'_>> {
    let (input, aggregator) = aggregator(input)?;
    let (input, downsample) = opt(terminated(legacy_downsample, char(':')))(input)?;
    let (input, rate) = opt(terminated(legacy_rate, char(':')))(input)?;
    let (input, metric) = metric(input)?;
    let (input, group) = opt(legacy_group)(input)?;

    Ok((
        input,
        RawQuery {
            aggregator,
            downsample,
            rate,
            metric,
            groups: [group, None],
        },
    ))
}

fn filter_groups(input: &str) -> IResult<&str, [Option<&str>; 2]> {
    let (input, first) = opt(filter_group)(input)?;
    let (input, second) = opt(filter_group)(input)?;
    Ok((input, [first.flatten(), second.flatten()]))
}

fn downsample_first_query(input: &str) -> IResult<&str, RawQuery<'_>> {
    let (input, aggregator) = aggregator(input)?;
    let (input, downsample) = opt(terminated(downsample, char(':')))(input)?;
    let (input, rate) = opt(terminated(rate, char(':')))(input)?;
    let (input, metric) = metric(input)?;
    let (input, groups) = filter_groups(input)?;

    Ok((
        input,
        RawQuery {
            aggregator,
            downsample,
            rate,
            metric,
            groups,
        },
    ))
}

fn rate_first_query(input: &str) -> IResult<&str, RawQuery<'_>> {
    let (input, aggregator) = aggregator(input)?;
    let (input, rate) = opt(terminated(rate, char(':')))(input)?;
    let (input, downsample) = opt(terminated(downsample, char(':')))(input)?;
    let (input, metric) = metric(input)?;
    let (input, groups) = filter_groups(input)?;

    Ok((
        input,
        RawQuery {
            aggregator,
            downsample,
            rate,
            metric,
            groups,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagError;

    fn legacy(s: &str) -> QueryResult<Query> {
        parse_query(s, Version::V2_1)
    }

    fn modern(s: &str) -> QueryResult<Query> {
        parse_query(s, Version::V2_2)
    }

    #[test]
    fn test_parse_simple() {
        let q = legacy("sum:system.cpu.percent").unwrap();
        assert_eq!(q.aggregator, "sum");
        assert_eq!(q.metric, "system.cpu.percent");
        assert!(q.downsample.is_empty());
        assert!(!q.rate);
        assert!(q.tags.is_empty());
    }

    #[test]
    fn test_parse_legacy_tags() {
        let q = legacy("avg:1h-max:system.cpu.percent{cluster=*,host=web01|web02}").unwrap();
        assert_eq!(q.downsample, "1h-max");
        assert_eq!(q.tags.get("cluster"), Some("*"));
        assert_eq!(q.tags.get("host"), Some("web01|web02"));
        assert!(q.filters.is_empty());
    }

    #[test]
    fn test_parse_legacy_rate() {
        let q = legacy("sum:rate{dropcounter,,5}:net.bytes").unwrap();
        assert!(q.rate);
        assert_eq!(
            q.rate_options,
            Some(RateOptions {
                counter: true,
                counter_max: 0,
                reset_value: 5,
                drop_resets: true,
            })
        );

        let q = legacy("sum:1m-avg:rate:net.bytes").unwrap();
        assert!(q.rate);
        assert_eq!(q.rate_options, None);
        assert_eq!(q.downsample, "1m-avg");
    }

    #[test]
    fn test_parse_filters_group_order() {
        let q = modern("sum:m{host=wildcard(web*)}{dc=literal_or(east)}").unwrap();
        assert_eq!(q.filters.len(), 2);
        let filters: Vec<_> = q.filters.iter().cloned().collect();
        assert_eq!(filters[0], Filter::new("host", "wildcard", "web*", true));
        assert_eq!(filters[1], Filter::new("dc", "literal_or", "east", false));
        assert_eq!(q.group_by_tags.get("host"), Some(""));
        assert!(!q.group_by_tags.contains_key("dc"));
        assert!(q.tags.is_empty());
    }

    #[test]
    fn test_legacy_promotion() {
        let q = modern("sum:m{a=*,b=web*,c=web01|web02}").unwrap();
        let kinds: Vec<_> = q.filters.iter().map(|f| f.kind.as_str()).collect();
        assert_eq!(kinds, vec!["wildcard", "iwildcard", "literal_or"]);
        assert!(q.filters.iter().all(|f| f.group_by));
    }

    #[test]
    fn test_empty_group_then_non_grouping() {
        let q = modern("sum:m{}{dc=east}").unwrap();
        assert_eq!(q.filters.len(), 1);
        assert!(q.filters.iter().all(|f| !f.group_by));
        assert!(q.group_by_tags.is_empty());
        assert_eq!(q.to_string(), "sum:m{}{dc=literal_or(east)}");
    }

    #[test]
    fn test_clause_orders() {
        let a = modern("sum:1m-avg-zero:rate{counter}:m").unwrap();
        let b = modern("sum:rate{counter}:1m-avg-zero:m").unwrap();
        assert_eq!(a.downsample, "1m-avg-zero");
        assert_eq!(a, b);
        // the old grammar only knows downsample before rate
        assert!(matches!(
            legacy("sum:rate:1m-avg:m"),
            Err(QueryError::BadFormat(_))
        ));
    }

    #[test]
    fn test_filter_function() {
        assert_eq!(filter_function("literal_or(a|b)"), Some(("literal_or", "a|b")));
        assert_eq!(filter_function("regexp(web.(1|2))"), Some(("regexp", "web.(1|2)")));
        assert_eq!(filter_function("X(y)"), None);
        assert_eq!(filter_function("web01"), None);
        assert_eq!(filter_function("not_literal_or(a)x"), None);
    }

    #[test]
    fn test_round_trip() {
        let cases = [
            (Version::V2_1, "sum:system.cpu.percent"),
            (Version::V2_1, "avg:1h-max:system.cpu.percent{cluster=*,host=web01}"),
            (Version::V2_1, "sum:rate{counter,100,5}:net.bytes{host=a}"),
            (Version::V2_2, "sum:1m-avg:rate{dropcounter,,5}:m{host=wildcard(*)}"),
            (Version::V2_2, "sum:m{host=iwildcard(web*)}{dc=literal_or(east)}"),
            (Version::V2_3, "max:10s-max-nan:m"),
        ];
        for (version, s) in cases {
            let q = parse_query(s, version).unwrap();
            assert_eq!(q.to_string(), s);
            assert_eq!(parse_query(&q.to_string(), version).unwrap(), q);
        }
    }

    #[test]
    fn test_round_trip_canonicalizes() {
        let q = legacy("sum:m{b=2,a=1}").unwrap();
        assert_eq!(q.to_string(), "sum:m{a=1,b=2}");

        let q = modern("sum:rate:m{host=*}").unwrap();
        assert_eq!(q.to_string(), "sum:rate:m{host=wildcard(*)}");
        assert_eq!(modern(&q.to_string()).unwrap(), q);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(legacy("sum"), Err(QueryError::BadFormat(_))));
        assert!(matches!(modern("sum:m{a=b}{c=d}{e=f}"), Err(QueryError::BadFormat(_))));
        assert!(matches!(legacy("sum:m{a b}"), Err(QueryError::BadFormat(_))));
        assert!(matches!(modern("sum:rate{counter:m"), Err(QueryError::BadFormat(_))));
        assert!(matches!(
            legacy("sum:ratex:m"),
            Err(QueryError::InvalidRateOptions(s)) if s == "x"
        ));
        assert!(matches!(
            modern("sum:rate{counter,abc}:m"),
            Err(QueryError::InvalidNumber(s)) if s == "abc"
        ));
        assert!(matches!(modern("sum:m{host}"), Err(QueryError::BadFilter(_))));
        assert!(matches!(
            legacy("sum:m{host}"),
            Err(QueryError::Tags(TagError::BadPair(_)))
        ));
        assert!(matches!(
            legacy("sum:m{host=a,host=b}"),
            Err(QueryError::Tags(TagError::Duplicate(_)))
        ));
    }

    #[test]
    fn test_invalid_tag_characters_keep_partial_tags() {
        let tag_err = match legacy("sum:m{host=web01,dc=a@b}") {
            Err(QueryError::Tags(e)) => e,
            other => panic!("unexpected {other:?}"),
        };
        assert!(matches!(tag_err, TagError::InvalidCharacter { ref value, .. } if value == "a@b"));
        let partial = tag_err.partial().unwrap();
        assert_eq!(partial.get("host"), Some("web01"));
        assert_eq!(partial.get("dc"), Some("a@b"));
    }
}
