use crate::feed::parser::{parse_feed, FieldMappings, ParseError};
use crate::feed::raw::RawFeedItem;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

pub const DEFAULT_USER_AGENT: &str = concat!("newsfeed/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_ACCEPT: &str =
    "application/atom+xml,application/rss+xml,application/xml;q=0.9,*/*;q=0.8";

/// Errors that can occur while fetching a single feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed from the options
    #[error("Invalid client configuration: {0}")]
    Client(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0}ms")]
    Timeout(u64),
    /// Body was not a readable feed document
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Request and collection settings for feed fetching.
///
/// Read from the `[fetch]` table of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    pub user_agent: String,
    pub accept_header: String,
    pub timeout_ms: u64,
    /// Raw items taken from the head of each source's document.
    pub items_per_source: usize,
    /// Upper bound on the merged article list.
    pub max_articles: usize,
    /// Extra XML elements to read into raw item fields.
    pub field_mappings: FieldMappings,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_header: DEFAULT_ACCEPT.to_string(),
            timeout_ms: 15_000,
            items_per_source: 6,
            max_articles: 64,
            field_mappings: FieldMappings::new(),
        }
    }
}

impl FetchOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// HTTP client for feed documents, configured once and shared by clone.
#[derive(Debug, Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    timeout: Duration,
    field_mappings: FieldMappings,
}

impl FeedClient {
    pub fn new(options: &FetchOptions) -> Result<Self, FetchError> {
        let accept = reqwest::header::HeaderValue::from_str(&options.accept_header)
            .map_err(|e| FetchError::Client(format!("accept header: {e}")))?;
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::ACCEPT, accept);

        let http = reqwest::Client::builder()
            .user_agent(options.user_agent.as_str())
            .default_headers(headers)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            http,
            timeout: options.timeout(),
            field_mappings: options.field_mappings.clone(),
        })
    }

    /// Downloads a feed document.
    ///
    /// The timeout covers the whole exchange, headers and body.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let timeout_ms = self.timeout.as_millis() as u64;
        tokio::time::timeout(self.timeout, self.download(url))
            .await
            .map_err(|_| FetchError::Timeout(timeout_ms))?
    }

    /// Downloads and parses a feed document into raw items, in document order.
    pub async fn fetch_items(&self, url: &str) -> Result<Vec<RawFeedItem>, FetchError> {
        let bytes = self.fetch_bytes(url).await?;
        let items = parse_feed(&bytes, &self.field_mappings)?;
        tracing::debug!(feed = %url, items = items.len(), "Parsed feed");
        Ok(items)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }
        read_limited_bytes(response, MAX_FEED_SIZE).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
