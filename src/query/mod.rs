//! Query DSL
//!
//! Structured OpenTSDB queries and requests:
//!
//! - **AST**: [`Query`], [`Filter`], [`RateOptions`], [`Version`]
//! - **Parser**: compact query strings into [`Query`], gated by [`Version`]
//! - **Request**: the start/end window plus sub-queries, with URL-form and
//!   JSON encodings and the window transformations
//!
//! # Query Language
//!
//! ```text
//! aggregator:[downsample:][rate[{counter[,max][,reset]}]:]metric[{tags}][{filters}]
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use tsdb_relay::query::{parse_request, Version};
//!
//! let req = parse_request("start=1h-ago&m=sum:rate:net.bytes{host=*}", Version::V2_2)?;
//! assert_eq!(req.queries[0].to_string(), "sum:rate:net.bytes{host=wildcard(*)}");
//! ```

mod ast;
mod error;
mod parser;
mod request;

pub use ast::{Filter, Filters, Query, RateOptions, Version};
pub use error::{QueryError, QueryResult};
pub use parser::{parse_filters, parse_query};
pub use request::{parse_request, Request};
