//! Network side of the offline cache.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use url::Url;

/// A response body plus the metadata needed to replay it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    #[serde(skip)]
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type.to_string()),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Where assets come from when they are not served from cache.
pub trait AssetSource: Send + Sync {
    /// Fetch `url`. Non-success statuses are returned, not raised.
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<CachedResponse, FetchError>> + Send;
}

/// `reqwest`-backed source.
#[derive(Debug, Clone, Default)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl AssetSource for HttpSource {
    async fn fetch(&self, url: &Url) -> Result<CachedResponse, FetchError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();
        Ok(CachedResponse {
            status,
            content_type,
            body,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0} is unreachable")]
    Unreachable(String),
    #[error("no response within {}ms", .0.as_millis())]
    TimedOut(Duration),
}
