//! Multi-Source Merge Engine
//!
//! Sends one request to several contexts at once and merges their answers.
//! Series are matched across sources by [`Response::stable_key`]; matching
//! series have their datapoints combined with the aggregator of the incoming
//! series' query.
//!
//! Fetches run concurrently but results are merged in target order, so the
//! merged series order is: every series of the first target in its original
//! order, then each new series of later targets as it is met. The first
//! failing fetch fails the whole query and cancels the rest.

use async_trait::async_trait;
use futures_util::future::try_join_all;
use std::collections::HashMap;

use crate::aggregate::UnknownAggregator;
use crate::client::{ClientResult, Context};
use crate::query::{Request, Version};
use crate::response::{Response, ResponseSet};

/// Fans a request out to several contexts
#[derive(Default)]
pub struct MultiSource {
    targets: Vec<Box<dyn Context>>,
}

impl MultiSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a context; targets are merged in the order they are added
    pub fn add<C: Context + 'static>(mut self, target: C) -> Self {
        self.targets.push(Box::new(target));
        self
    }

    pub fn push(&mut self, target: Box<dyn Context>) {
        self.targets.push(target);
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[async_trait]
impl Context for MultiSource {
    async fn query(&self, request: &Request) -> ClientResult<ResponseSet> {
        let sets = try_join_all(self.targets.iter().map(|t| t.query(request))).await?;

        // Responses only echo their query with `showQuery`; a single-query
        // request still tells us the aggregator.
        let fallback = match request.queries.as_slice() {
            [only] => Some(only.aggregator.as_str()),
            _ => None,
        };

        let merged = merge_response_sets(sets, fallback)?;
        tracing::debug!(
            targets = self.targets.len(),
            series = merged.len(),
            "Merged multi-source response"
        );
        Ok(merged)
    }

    /// Lowest version among the targets, 2.4 when there are none
    fn version(&self) -> Version {
        self.targets
            .iter()
            .map(|t| t.version())
            .min()
            .unwrap_or(Version::V2_4)
    }
}

/// Merge per-target response sets into one
///
/// The first set seeds the result. Each later series is appended if its key
/// is new, otherwise its datapoints are joined into the existing series with
/// its query's aggregator, or `fallback_aggregator` when the series carries
/// no query.
pub fn merge_response_sets(
    sets: Vec<ResponseSet>,
    fallback_aggregator: Option<&str>,
) -> Result<ResponseSet, UnknownAggregator> {
    let mut sets = sets.into_iter();
    let mut result: ResponseSet = match sets.next() {
        Some(first) => first,
        None => return Ok(Vec::new()),
    };

    let mut index: HashMap<String, usize> = result
        .iter()
        .enumerate()
        .map(|(i, r)| (r.stable_key(), i))
        .collect();

    for set in sets {
        for resp in set {
            let key = resp.stable_key();
            match index.get(&key) {
                Some(&i) => {
                    let aggregator = merge_aggregator(&resp, fallback_aggregator);
                    result[i].dps.join(&resp.dps, aggregator)?;
                }
                None => {
                    index.insert(key, result.len());
                    result.push(resp);
                }
            }
        }
    }

    Ok(result)
}

fn merge_aggregator<'a>(resp: &'a Response, fallback: Option<&'a str>) -> &'a str {
    resp.aggregator().or(fallback).unwrap_or_default()
}
