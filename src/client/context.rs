//! Query contexts
//!
//! A [`Context`] is anything that can answer a [`Request`]: a plain
//! [`Host`], a byte-limited [`Target`], or a [`MultiSource`](crate::multi::MultiSource)
//! fanning out to several targets.

use async_trait::async_trait;
use std::time::Instant;

use crate::client::error::ClientResult;
use crate::client::http::TsdbClient;
use crate::query::{Request, Version};
use crate::response::{filter_tags, ResponseSet};
use crate::tags::TagSet;

/// Something that answers OpenTSDB requests
#[async_trait]
pub trait Context: Send + Sync {
    async fn query(&self, request: &Request) -> ClientResult<ResponseSet>;

    /// Server version, which selects the query grammar
    fn version(&self) -> Version;
}

/// A host queried without limits or post-processing
#[derive(Debug, Clone)]
pub struct Host {
    client: TsdbClient,
    host: String,
    version: Version,
}

impl Host {
    pub fn new(client: TsdbClient, host: impl Into<String>, version: Version) -> Self {
        Self {
            client,
            host: host.into(),
            version,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl Context for Host {
    async fn query(&self, request: &Request) -> ClientResult<ResponseSet> {
        self.client.query(&self.host, request).await
    }

    fn version(&self) -> Version {
        self.version
    }
}

/// A host with a response size limit, optional tag filtering and
/// synthetic tags
///
/// Synthetic tags are added to every series the host returns, so series
/// from different targets can be told apart after a merge.
#[derive(Debug, Clone)]
pub struct Target {
    client: TsdbClient,
    host: String,
    /// `None` reads replies of any size
    limit: Option<u64>,
    filter_tags: bool,
    version: Version,
    synthetic_tags: TagSet,
}

impl Target {
    /// Target with no limit, no filtering and no synthetic tags
    pub fn new(client: TsdbClient, host: impl Into<String>) -> Self {
        Self {
            client,
            host: host.into(),
            limit: None,
            filter_tags: false,
            version: Version::V2_4,
            synthetic_tags: TagSet::new(),
        }
    }

    /// Limit replies to `limit` bytes; a negative limit means unlimited
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = u64::try_from(limit).ok();
        self
    }

    /// Drop tag keys the request did not ask for
    pub fn filter_tags(mut self, enabled: bool) -> Self {
        self.filter_tags = enabled;
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn synthetic_tags(mut self, tags: TagSet) -> Self {
        self.synthetic_tags = tags;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn response_limit(&self) -> Option<u64> {
        self.limit
    }
}

#[async_trait]
impl Context for Target {
    async fn query(&self, request: &Request) -> ClientResult<ResponseSet> {
        let started = Instant::now();
        tracing::debug!(host = %self.host, limit = ?self.limit, "Querying target");

        let mut set = self
            .client
            .query_limited(&self.host, request, self.limit)
            .await
            .map_err(|e| {
                tracing::warn!(host = %self.host, error = %e, "Target query failed");
                e
            })?;

        if self.filter_tags {
            filter_tags(request, &mut set);
        }
        if !self.synthetic_tags.is_empty() {
            for resp in &mut set {
                resp.tags.merge(&self.synthetic_tags);
            }
        }

        tracing::debug!(
            host = %self.host,
            series = set.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Target query finished"
        );
        Ok(set)
    }

    fn version(&self) -> Version {
        self.version
    }
}
