//! Time & Duration Resolver
//!
//! Converts the time representations accepted by OpenTSDB into instants and
//! durations:
//!
//! - **Duration**: signed intervals with `ms|s|m|h|d|w|n|y` suffixes
//! - **TimeSpec / TimeValue**: relative, `now`, absolute layouts and epochs
//! - **Downsample**: `<interval>-<agg>[-<fill>]` specs
//!
//! # Epoch disambiguation
//!
//! Epoch values above `9999999999` (more than ten digits) are read as
//! milliseconds. Data point timestamps use a different, 32-bit threshold;
//! see [`crate::point`].

mod downsample;
mod duration;
mod error;
mod spec;

pub use downsample::{parse_downsample, Downsample};
pub use duration::{parse_duration, Duration, DAY, HOUR, MINUTE, MONTH, SECOND, WEEK, YEAR};
pub use error::{TimeError, TimeResult};
pub use spec::{
    canonical_time, canonical_time_at, parse_abs_time, parse_time, parse_time_at,
    try_parse_abs_time, TimeSpec, TimeValue, MAX_EPOCH_SECONDS, RELATIVE_SUFFIX,
    TSDB_TIME_FORMAT,
};
