//! Client error types

use thiserror::Error;

use crate::aggregate::UnknownAggregator;

/// Errors that can occur while querying OpenTSDB hosts
#[derive(Error, Debug)]
pub enum ClientError {
    /// Non-200 reply whose body is not a structured OpenTSDB error
    #[error("OpenTSDB status={status}")]
    Transport { status: u16, body: Option<String> },

    /// Structured error reported by the server
    #[error("OpenTSDB status={code} req='{request}' msg={message}")]
    Upstream {
        code: i64,
        message: String,
        details: String,
        /// JSON body of the failed request
        request: String,
    },

    /// The reply reached the configured byte limit
    #[error("TSDB response too large: limited to {limit} bytes")]
    ResponseTooLarge { limit: u64 },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Host unavailable: {0}")]
    Unavailable(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid host URL: {0}")]
    InvalidUrl(String),

    /// A merged series names an aggregator with no merge function
    #[error(transparent)]
    Aggregator(#[from] UnknownAggregator),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
