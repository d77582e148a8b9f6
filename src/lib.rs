//! # tsdb-relay
//!
//! OpenTSDB query language client: parse and encode queries, then fan them
//! out to several TSDB backends and merge what comes back.
//!
//! ## Modules
//!
//! - [`time`]: durations, relative/absolute times and downsample specs
//! - [`name`]: metric and tag character validation and cleaning
//! - [`tags`]: tag set algebra and tag-string parsing
//! - [`query`]: query AST, compact-string parser and requests
//! - [`response`]: query results and datapoint joins
//! - [`aggregate`]: aggregator functions used when merging
//! - [`point`]: data points for submission
//! - [`client`]: HTTP transport and query contexts
//! - [`multi`]: concurrent fan-out and merge across contexts
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tsdb_relay::client::{ClientConfig, Context, Target, TsdbClient};
//! use tsdb_relay::multi::MultiSource;
//! use tsdb_relay::query::parse_request;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TsdbClient::new(ClientConfig::default())?;
//!
//!     let multi = MultiSource::new()
//!         .add(Target::new(client.clone(), "tsdb-east:4242"))
//!         .add(Target::new(client, "tsdb-west:4242").limit(10 << 20));
//!
//!     let request = parse_request("start=1h-ago&m=sum:sys.cpu{host=*}", multi.version())?;
//!     let merged = multi.query(&request).await?;
//!
//!     println!("Got {} series", merged.len());
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod client;
pub mod config;
pub mod multi;
pub mod name;
pub mod point;
pub mod query;
pub mod response;
pub mod tags;
pub mod time;

// Re-export top-level types for convenience
pub use aggregate::{aggregator_fn, AggregatorFn, UnknownAggregator, AGGREGATORS};

pub use client::{ClientConfig, ClientError, ClientResult, Context, Host, Target, TsdbClient};

pub use config::{Config, ConfigError, LoggingConfig, TargetConfig};

pub use multi::{merge_response_sets, MultiSource};

pub use point::{DataPoint, MultiDataPoint, PointError, PointValue};

pub use query::{
    parse_query, parse_request, Filter, Filters, Query, QueryError, QueryResult, RateOptions,
    Request, Version,
};

pub use response::{DataPoints, Response, ResponseSet};

pub use tags::{TagError, TagSet};

pub use time::{Duration, TimeError, TimeSpec, TimeValue};
