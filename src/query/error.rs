//! Query error types
//!
//! Defines all error conditions that can occur while parsing queries and
//! building or transforming requests.

use thiserror::Error;

use crate::tags::TagError;
use crate::time::TimeError;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// The query string does not match any grammar variant
    #[error("Bad query format: {0}")]
    BadFormat(String),

    /// Rate options not wrapped in `{…}`
    #[error("Invalid rate options: {0}")]
    InvalidRateOptions(String),

    /// counterMax or resetValue is not an integer
    #[error("Invalid number in rate options: {0}")]
    InvalidNumber(String),

    /// A filter group could not be split into `key=value` pairs
    #[error("Failed to parse filter(s): {0}")]
    BadFilter(String),

    /// Legacy tag group failed to parse
    #[error("Tag error: {0}")]
    Tags(#[from] TagError),

    /// Start or end time could not be resolved
    #[error("Time error: {0}")]
    Time(#[from] TimeError),

    /// Request has no start time
    #[error("Missing start time")]
    MissingStart,

    /// URL-form request has no `m` parameter
    #[error("Missing query: {0}")]
    MissingQuery(String),

    /// Auto downsample asked for zero points
    #[error("Target number of datapoints cannot be zero")]
    InvalidAutoDownsample,

    /// Version text is not `major.minor`
    #[error("Invalid OpenTSDB version, expected number.number (i.e 2.2), got {0:?}")]
    InvalidVersion(String),

    /// JSON request body could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
