//! `reqwest`-backed fetcher used by the CLI host.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use tracing::{debug, warn};

use super::Fetcher;
use crate::error::FetchError;
use crate::request::{Method, Request, Response};

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Sent with every request so origin logs can tell worker traffic apart.
const USER_AGENT: &str = concat!("swcache/", env!("CARGO_PKG_VERSION"));

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }

    /// Repeated headers are joined with ", ", the way fetch's `Headers.get`
    /// reports them. Values that are not visible ASCII are dropped.
    fn snapshot_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
        let mut snapshot: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in headers {
            let Ok(value) = value.to_str() else {
                continue;
            };
            snapshot
                .entry(name.as_str().to_string())
                .and_modify(|joined| {
                    joined.push_str(", ");
                    joined.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
        snapshot
    }

    fn classify(url: &str, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(url.to_string())
        } else if error.is_connect() {
            FetchError::Offline
        } else {
            FetchError::Network(error.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = request.url.as_str();
        let mut builder = self.client.request(Self::method(request.method), url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            warn!(url = url, error = %e, "Network request failed");
            Self::classify(url, e)
        })?;

        let status = response.status();
        let mut snapshot = Response::new(status.as_u16(), Vec::new());
        snapshot.status_text = status.canonical_reason().unwrap_or_default().to_string();
        snapshot.headers = Self::snapshot_headers(response.headers());

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::classify(url, e))?;
        snapshot.body = body.to_vec();

        debug!(
            method = %request.method,
            url = url,
            status = snapshot.status,
            bytes = snapshot.body.len(),
            "Fetched from network"
        );
        Ok(snapshot)
    }
}
