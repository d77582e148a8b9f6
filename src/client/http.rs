//! OpenTSDB HTTP transport
//!
//! POSTs a [`Request`] as JSON to a host's `/api/query` route and decodes the
//! multi-set response, optionally capping the number of bytes read.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use crate::client::error::{ClientError, ClientResult};
use crate::query::Request;
use crate::response::ResponseSet;

/// Path used when the host does not name one
pub const QUERY_PATH: &str = "/api/query";

/// Configuration for [`TsdbClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// User-Agent header sent with every request
    pub user_agent: String,
    /// Skip TLS certificate verification
    pub accept_invalid_certs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            user_agent: format!("tsdb-relay/{}", env!("CARGO_PKG_VERSION")),
            accept_invalid_certs: false,
        }
    }
}

/// HTTP client shared by every host a process queries
#[derive(Debug, Clone)]
pub struct TsdbClient {
    client: Client,
    config: ClientConfig,
}

impl TsdbClient {
    /// Create a new client with the given configuration
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run `request` against `host` and decode the whole reply
    pub async fn query(&self, host: &str, request: &Request) -> ClientResult<ResponseSet> {
        self.query_limited(host, request, None).await
    }

    /// Run `request` against `host`, failing once the reply reaches `limit`
    /// bytes
    pub async fn query_limited(
        &self,
        host: &str,
        request: &Request,
        limit: Option<u64>,
    ) -> ClientResult<ResponseSet> {
        let response = self.send(host, request).await?;
        let body = read_limited(response, limit).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send(&self, host: &str, request: &Request) -> ClientResult<reqwest::Response> {
        let url = query_url(host)?;
        let body = serde_json::to_string(request)?;

        tracing::debug!(%url, queries = request.queries.len(), "Sending OpenTSDB query");

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout(host.to_string())
                } else if e.is_connect() {
                    ClientError::Unavailable(host.to_string())
                } else {
                    ClientError::Http(e)
                }
            })?;

        if response.status() == StatusCode::OK {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let reply = response.bytes().await?;
        Err(error_from_reply(status, &reply, body))
    }
}

#[derive(Deserialize)]
struct ErrorReply {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: String,
}

/// Classify a non-200 reply
///
/// A body shaped like `{"error":{"code":…,"message":…}}` becomes
/// [`ClientError::Upstream`]; anything else a [`ClientError::Transport`].
fn error_from_reply(status: u16, body: &[u8], request: String) -> ClientError {
    match serde_json::from_slice::<ErrorReply>(body) {
        Ok(reply) => ClientError::Upstream {
            code: reply.error.code,
            message: reply.error.message,
            details: reply.error.details,
            request,
        },
        Err(_) => ClientError::Transport {
            status,
            body: (!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned()),
        },
    }
}

/// Query URL for a host
///
/// `host:port` becomes `http://host:port/api/query`. Full `http(s)://` URLs
/// keep their scheme, path and query string; a missing path defaults to
/// [`QUERY_PATH`].
pub fn query_url(host: &str) -> ClientResult<Url> {
    if let Ok(mut url) = Url::parse(host) {
        if url.has_host() && matches!(url.scheme(), "http" | "https") {
            if url.path().is_empty() || url.path() == "/" {
                url.set_path(QUERY_PATH);
            }
            return Ok(url);
        }
    }

    Url::parse(&format!("http://{}{}", host, QUERY_PATH))
        .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", host, e)))
}

async fn read_limited(mut response: reqwest::Response, limit: Option<u64>) -> ClientResult<Vec<u8>> {
    let too_large = |len: usize| matches!(limit, Some(limit) if len as u64 >= limit);

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        body.extend_from_slice(&chunk);
        if too_large(body.len()) {
            break;
        }
    }

    if let Some(limit) = limit.filter(|_| too_large(body.len())) {
        tracing::warn!(limit, "TSDB response too large");
        return Err(ClientError::ResponseTooLarge { limit });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout_ms, 30_000);
        assert!(config.user_agent.starts_with("tsdb-relay/"));
        assert!(!config.accept_invalid_certs);
    }

    #[test]
    fn test_query_url() {
        assert_eq!(
            query_url("localhost:4242").unwrap().as_str(),
            "http://localhost:4242/api/query"
        );
        assert_eq!(
            query_url("10.0.0.1:4242").unwrap().as_str(),
            "http://10.0.0.1:4242/api/query"
        );
        assert_eq!(
            query_url("https://tsdb.example.com").unwrap().as_str(),
            "https://tsdb.example.com/api/query"
        );
        assert_eq!(
            query_url("http://proxy:8080/tsdb/query?cluster=a").unwrap().as_str(),
            "http://proxy:8080/tsdb/query?cluster=a"
        );
        assert!(matches!(query_url("bad host:x"), Err(ClientError::InvalidUrl(_))));
    }

    #[test]
    fn test_error_from_reply() {
        let upstream = error_from_reply(
            400,
            br#"{"error":{"code":400,"message":"No such name for 'metrics'","details":"x"}}"#,
            "{}".to_string(),
        );
        match upstream {
            ClientError::Upstream { code, message, request, .. } => {
                assert_eq!(code, 400);
                assert_eq!(message, "No such name for 'metrics'");
                assert_eq!(request, "{}");
            }
            other => panic!("unexpected {other:?}"),
        }

        let transport = error_from_reply(502, b"Bad Gateway", String::new());
        assert!(matches!(
            transport,
            ClientError::Transport { status: 502, body: Some(ref b) } if b == "Bad Gateway"
        ));

        let empty = error_from_reply(503, b"", String::new());
        assert!(matches!(empty, ClientError::Transport { status: 503, body: None }));
    }

    #[test]
    fn test_client_builds() {
        let client = TsdbClient::new(ClientConfig::default()).unwrap();
        assert_eq!(client.config().timeout_ms, 30_000);
    }
}
