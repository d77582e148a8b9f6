//! Aggregation Function Registry
//!
//! Maps an OpenTSDB aggregator name to the binary function used to combine
//! two values that two sources report for the same series and timestamp.
//!
//! `min`/`mimmin` keep the greater value and `dev`/`first`/`last` average,
//! matching the OpenTSDB client these merges must agree with.

use thiserror::Error;

/// Combines an existing value with an incoming one
pub type AggregatorFn = fn(f64, f64) -> f64;

/// Aggregator names with a merge function
pub const AGGREGATORS: &[&str] = &[
    "sum", "zimsum", "count", "avg", "max", "mimmax", "min", "mimmin", "dev", "first", "last",
];

/// The aggregator has no merge function
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown aggregator: {0:?}")]
pub struct UnknownAggregator(pub String);

/// Look up the merge function for `name`
pub fn aggregator_fn(name: &str) -> Result<AggregatorFn, UnknownAggregator> {
    let f: AggregatorFn = match name {
        "sum" | "zimsum" | "count" => add,
        "avg" | "dev" | "first" | "last" => mean,
        "max" | "mimmax" | "min" | "mimmin" => greater,
        _ => return Err(UnknownAggregator(name.to_string())),
    };
    Ok(f)
}

fn add(a: f64, b: f64) -> f64 {
    a + b
}

fn mean(a: f64, b: f64) -> f64 {
    (a + b) / 2.0
}

fn greater(a: f64, b: f64) -> f64 {
    if a > b {
        a
    } else {
        b
    }
}
