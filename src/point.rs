//! Data points for the `/api/put` route
//!
//! Timestamps above `0xFFFFFFFF` are read as milliseconds when a point is
//! cleaned. This threshold differs from the ten-digit rule used for query
//! times in [`crate::time`]; both are what OpenTSDB clients expect at their
//! respective entry points.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::name::{clean, is_valid_name, NameError};
use crate::tags::{TagError, TagSet};

/// Timestamps above this are milliseconds
pub const MAX_POINT_SECONDS: i64 = 0xFFFF_FFFF;

/// Errors raised while cleaning a data point
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PointError {
    #[error("Cleaning tags for metric {metric}: {source}")]
    Tags { metric: String, source: TagError },

    #[error("Cleaning metric {metric}: {source}")]
    Metric { metric: String, source: NameError },

    #[error("Unparseable number {0:?}")]
    Unparseable(String),

    #[error("Datapoint is invalid")]
    Invalid,
}

pub type PointResult<T> = Result<T, PointError>;

/// Numeric value of a data point
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointValue {
    Int(i64),
    Float(f64),
}

impl PointValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            PointValue::Int(i) => *i as f64,
            PointValue::Float(f) => *f,
        }
    }
}

/// Integer first, then floating point
impl FromStr for PointValue {
    type Err = PointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(i) = s.parse::<i64>() {
            return Ok(PointValue::Int(i));
        }
        s.parse::<f64>()
            .map(PointValue::Float)
            .map_err(|_| PointError::Unparseable(s.to_string()))
    }
}

impl From<i64> for PointValue {
    fn from(i: i64) -> Self {
        PointValue::Int(i)
    }
}

impl From<f64> for PointValue {
    fn from(f: f64) -> Self {
        PointValue::Float(f)
    }
}

/// Values beyond `i64::MAX` become floating point
impl From<u64> for PointValue {
    fn from(u: u64) -> Self {
        match i64::try_from(u) {
            Ok(i) => PointValue::Int(i),
            Err(_) => PointValue::Float(u as f64),
        }
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointValue::Int(i) => write!(f, "{}", i),
            PointValue::Float(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for PointValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PointValue::Int(i) => serializer.serialize_i64(*i),
            PointValue::Float(f) => serializer.serialize_f64(*f),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for PointValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawValue::deserialize(deserializer)? {
            RawValue::Int(i) => Ok(PointValue::Int(i)),
            RawValue::UInt(u) => Ok(PointValue::from(u)),
            RawValue::Float(f) => Ok(PointValue::Float(f)),
            RawValue::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// A data point to submit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub metric: String,
    pub timestamp: i64,
    pub value: PointValue,
    #[serde(default)]
    pub tags: TagSet,
}

impl DataPoint {
    pub fn new(metric: impl Into<String>, timestamp: i64, value: impl Into<PointValue>) -> Self {
        Self {
            metric: metric.into(),
            timestamp,
            value: value.into(),
            tags: TagSet::new(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }

    /// Whether the point can be submitted as is
    pub fn valid(&self) -> bool {
        !self.metric.is_empty()
            && is_valid_name(&self.metric)
            && self.timestamp != 0
            && self.value.as_f64().is_finite()
            && self.tags.valid()
    }

    /// Strip invalid characters from metric and tags, convert millisecond
    /// timestamps to seconds, then validate
    ///
    /// The point is only modified when every step succeeds.
    pub fn clean(&mut self) -> PointResult<()> {
        let mut cleaned = self.clone();
        cleaned.tags.clean().map_err(|source| PointError::Tags {
            metric: self.metric.clone(),
            source,
        })?;
        cleaned.metric = clean(&self.metric).map_err(|source| PointError::Metric {
            metric: self.metric.clone(),
            source,
        })?;
        if cleaned.timestamp > MAX_POINT_SECONDS {
            cleaned.timestamp /= 1000;
        }
        if !cleaned.valid() {
            return Err(PointError::Invalid);
        }
        *self = cleaned;
        Ok(())
    }
}

/// Points submitted in one request
pub type MultiDataPoint = Vec<DataPoint>;
