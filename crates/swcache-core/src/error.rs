use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid cache name: {0}")]
    InvalidCacheName(String),
}

/// Transport level failure. A non-2xx status is a response, not an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Offline - no network available")]
    Offline,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Refusing to cache {method} request: {key}")]
    UncacheableMethod { method: String, key: String },

    #[error("Refusing to cache status {status} for {key}")]
    UncacheableStatus { status: u16, key: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Install failed for {url}: {reason}")]
    Install { url: String, reason: String },

    #[error("Request failed for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 200;

impl WorkerError {
    /// Install failure caused by a non-2xx manifest response.
    pub fn install_status(url: &str, status: u16, body: &[u8]) -> Self {
        WorkerError::Install {
            url: url.to_string(),
            reason: format!("status {}: {}", status, truncate_body(body)),
        }
    }
}

fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= MAX_ERROR_BODY_LENGTH {
        text.into_owned()
    } else {
        let cut: String = text.chars().take(MAX_ERROR_BODY_LENGTH).collect();
        format!("{}... (truncated, {} total bytes)", cut, body.len())
    }
}
