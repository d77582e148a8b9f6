//! Query responses
//!
//! A backend answers a request with a multi-set response: one [`Response`]
//! per series, each holding its datapoints keyed by epoch seconds.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::aggregate::{aggregator_fn, UnknownAggregator};
use crate::query::{Query, Request};
use crate::tags::TagSet;

/// Series returned for one request, in server order
pub type ResponseSet = Vec<Response>;

/// A series of a query response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub tags: TagSet,
    #[serde(default)]
    pub aggregate_tags: Vec<String>,
    /// Echo of the sub-query, present when the request sets `showQuery`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
    #[serde(default)]
    pub dps: DataPoints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<QueryStats>,
    /// Trailing summary element sent with `showSummary`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_summary: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Response {
    /// Identity of the series across sources
    ///
    /// The metric followed by the sorted aggregate tags and `key=value` tag
    /// pairs, space separated.
    pub fn stable_key(&self) -> String {
        let mut parts: Vec<String> = self.aggregate_tags.clone();
        parts.extend(self.tags.iter().map(|(k, v)| format!("{}={}", k, v)));
        parts.sort();

        let mut key = self.metric.clone();
        for part in parts {
            key.push(' ');
            key.push_str(&part);
        }
        key
    }

    /// Aggregator named by the echoed sub-query, if any
    pub fn aggregator(&self) -> Option<&str> {
        self.query
            .as_ref()
            .map(|q| q.aggregator.as_str())
            .filter(|a| !a.is_empty())
    }
}

/// Datapoints keyed by epoch seconds
///
/// `null` values, written by the `null` fill policy, are skipped on decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DataPoints(HashMap<i64, f64>);

impl<'de> Deserialize<'de> for DataPoints {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = HashMap::<i64, Option<f64>>::deserialize(deserializer)?;
        Ok(raw.into_iter().filter_map(|(t, v)| Some((t, v?))).collect())
    }
}

impl DataPoints {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, time: i64, value: f64) -> Option<f64> {
        self.0.insert(time, value)
    }

    pub fn get(&self, time: i64) -> Option<f64> {
        self.0.get(&time).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.0.iter().map(|(t, v)| (*t, *v))
    }

    /// Fold `other` into `self` with the merge function of `aggregator`
    ///
    /// Timestamps present in both are combined; the rest are copied.
    pub fn join(&mut self, other: &DataPoints, aggregator: &str) -> Result<(), UnknownAggregator> {
        let f = aggregator_fn(aggregator)?;
        for (t, v) in &other.0 {
            self.0
                .entry(*t)
                .and_modify(|existing| *existing = f(*existing, *v))
                .or_insert(*v);
        }
        Ok(())
    }

    /// Timestamps in ascending order
    pub fn sorted_times(&self) -> Vec<i64> {
        let mut times: Vec<i64> = self.0.keys().copied().collect();
        times.sort_unstable();
        times
    }
}

impl FromIterator<(i64, f64)> for DataPoints {
    fn from_iter<I: IntoIterator<Item = (i64, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Per-query timings returned with `showStats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    #[serde(rename = "queryIndex", default)]
    pub index: i64,
    #[serde(rename = "emittedDPs", default)]
    pub emitted_dps: i64,
    #[serde(rename = "aggregationTime", default)]
    pub aggregation_time: f64,
    #[serde(rename = "groupByTime", default)]
    pub group_by_time: f64,
    #[serde(rename = "queryScanTime", default)]
    pub query_scan_time: f64,
    #[serde(rename = "saltScannerMergeTime", default)]
    pub salt_scanner_merge_time: f64,
    #[serde(rename = "serializationTime", default)]
    pub serialization_time: f64,
    #[serde(rename = "uidToStringTime", default)]
    pub uid_to_string_time: f64,
}

/// Drop tag keys the request did not ask for
///
/// Keeps keys that appear in the query's tags or as a grouping filter. Only
/// applies to single-query requests.
pub fn filter_tags(request: &Request, responses: &mut [Response]) {
    let [query] = request.queries.as_slice() else {
        return;
    };
    for resp in responses.iter_mut() {
        resp.tags.retain(|k, _| {
            query.tags.contains_key(k) || query.filters.group_by().any(|f| f.tagk == k)
        });
    }
}
