//! Query model
//!
//! Structured form of an OpenTSDB sub-query and the pieces it is built from.
//! [`Query`] renders back to the compact query-string form through
//! [`Display`](fmt::Display):
//!
//! ```text
//! sum:1m-avg:rate{counter,100}:system.cpu.percent{host=*}{dc=literal_or(east)}
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::query::error::QueryError;
use crate::tags::TagSet;

/// A sub-query of a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(default, deserialize_with = "null_as_default")]
    pub metric: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub aggregator: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rate: bool,
    #[serde(default)]
    pub rate_options: Option<RateOptions>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub downsample: String,
    /// Legacy (pre-2.2) tag map
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "TagSet::is_empty"
    )]
    pub tags: TagSet,
    /// 2.2+ filters
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Filters::is_empty"
    )]
    pub filters: Filters,
    #[serde(default, deserialize_with = "null_as_default")]
    pub explicit_tags: bool,
    #[serde(
        default,
        rename = "tsuids",
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tsuids: Vec<String>,
    /// Keys of the grouping filters, with empty values
    #[serde(skip)]
    pub group_by_tags: TagSet,
    #[serde(default)]
    pub index: i64,
}

/// Servers echo unset fields as `null`
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Query {
    /// Create a query for a metric with an aggregator
    pub fn new(aggregator: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            aggregator: aggregator.into(),
            metric: metric.into(),
            ..Default::default()
        }
    }

    pub fn downsample(mut self, spec: impl Into<String>) -> Self {
        self.downsample = spec.into();
        self
    }

    pub fn rate(mut self, options: Option<RateOptions>) -> Self {
        self.rate = true;
        self.rate_options = options;
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        if filter.group_by {
            self.group_by_tags.insert(filter.tagk.clone(), "");
        }
        self.filters.push(filter);
        self
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.aggregator)?;
        if !self.downsample.is_empty() {
            write!(f, "{}:", self.downsample)?;
        }
        if self.rate {
            f.write_str("rate")?;
            if let Some(opts) = self.rate_options.as_ref().filter(|o| o.counter) {
                write!(f, "{}", opts)?;
            }
            f.write_str(":")?;
        }
        f.write_str(&self.metric)?;
        if !self.tags.is_empty() {
            write!(f, "{}", self.tags)?;
        }
        if !self.filters.is_empty() {
            write!(f, "{}", self.filters)?;
        }
        Ok(())
    }
}

/// Counter handling for rate queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateOptions {
    #[serde(default, skip_serializing_if = "is_false")]
    pub counter: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub counter_max: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub reset_value: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub drop_resets: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(i: &i64) -> bool {
    *i == 0
}

/// Renders the `{counter[,max][,reset]}` suffix
///
/// A reset value without a counter max keeps its position with an empty
/// middle field: `{counter,,5}`.
impl fmt::Display for RateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        f.write_str(if self.drop_resets { "dropcounter" } else { "counter" })?;
        if self.counter_max != 0 {
            write!(f, ",{}", self.counter_max)?;
        }
        if self.reset_value != 0 {
            if self.counter_max == 0 {
                f.write_str(",")?;
            }
            write!(f, ",{}", self.reset_value)?;
        }
        f.write_str("}")
    }
}

/// A tag filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(rename = "type")]
    pub kind: String,
    pub tagk: String,
    pub filter: String,
    /// Echoed queries spell this `group_by`
    #[serde(default, alias = "group_by")]
    pub group_by: bool,
}

impl Filter {
    pub fn new(
        tagk: impl Into<String>,
        kind: impl Into<String>,
        filter: impl Into<String>,
        group_by: bool,
    ) -> Self {
        Self {
            kind: kind.into(),
            tagk: tagk.into(),
            filter: filter.into(),
            group_by,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}({})", self.tagk, self.kind, self.filter)
    }
}

/// Ordered list of filters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(Vec<Filter>);

impl Filters {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, filter: Filter) {
        self.0.push(filter);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Filter> {
        self.0.iter()
    }

    /// Grouping filters in their original order
    pub fn group_by(&self) -> impl Iterator<Item = &Filter> {
        self.0.iter().filter(|f| f.group_by)
    }

    /// Non-grouping filters in their original order
    pub fn non_group_by(&self) -> impl Iterator<Item = &Filter> {
        self.0.iter().filter(|f| !f.group_by)
    }
}

impl FromIterator<Filter> for Filters {
    fn from_iter<I: IntoIterator<Item = Filter>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Filter> for Filters {
    fn extend<I: IntoIterator<Item = Filter>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl<'a> IntoIterator for &'a Filters {
    type Item = &'a Filter;
    type IntoIter = std::slice::Iter<'a, Filter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Grouping filters in braces (always present, possibly `{}`), then the
/// non-grouping filters in a second pair of braces when there are any
impl fmt::Display for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<'a>(filters: impl Iterator<Item = &'a Filter>) -> String {
            filters.map(Filter::to_string).collect::<Vec<_>>().join(",")
        }

        write!(f, "{{{}}}", join(self.group_by()))?;
        let rest = join(self.non_group_by());
        if !rest.is_empty() {
            write!(f, "{{{}}}", rest)?;
        }
        Ok(())
    }
}

/// OpenTSDB server version
///
/// Selects the query grammar: filters are supported from 2.2 on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: i64,
    pub minor: i64,
}

impl Version {
    pub const V2_1: Version = Version::new(2, 1);
    pub const V2_2: Version = Version::new(2, 2);
    pub const V2_3: Version = Version::new(2, 3);
    pub const V2_4: Version = Version::new(2, 4);

    pub const fn new(major: i64, minor: i64) -> Self {
        Self { major, minor }
    }

    pub fn filter_support(&self) -> bool {
        self.major >= 2 && self.minor >= 2
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || QueryError::InvalidVersion(s.to_string());
        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        if minor.contains('.') {
            return Err(invalid());
        }
        Ok(Version {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
