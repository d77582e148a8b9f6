//! OpenTSDB client
//!
//! An explicit [`TsdbClient`] carries the HTTP client and its settings and is
//! handed to every [`Host`] and [`Target`]; there are no process-wide
//! defaults.

mod context;
mod error;
mod http;

pub use context::{Context, Host, Target};
pub use error::{ClientError, ClientResult};
pub use http::{query_url, ClientConfig, TsdbClient, QUERY_PATH};
