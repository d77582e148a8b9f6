//! Time error types
//!
//! Errors raised while resolving time specs and durations.

use thiserror::Error;

/// Errors that can occur while parsing times and durations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// No relative, absolute or epoch format matched
    #[error("Invalid time: {0}")]
    Parse(String),

    /// Unknown unit or malformed numeral in a duration
    #[error("Invalid duration: {0}")]
    Duration(String),

    /// Epoch value or offset cannot be represented as an instant
    #[error("Time out of range: {0}")]
    OutOfRange(String),
}

/// Result type for time operations
pub type TimeResult<T> = Result<T, TimeError>;
