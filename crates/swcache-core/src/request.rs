//! Request descriptors, cache keys and response snapshots.
//!
//! A `Request` is what the page issues and the worker intercepts. Its
//! `CacheKey` (method + URL without fragment) is the key every store uses.
//! A `Response` is an immutable snapshot of status, headers and body; the
//! same type is returned from the network and stored in a cache.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }

    /// Only GET responses are ever stored.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Method::Get)
    }

    /// Parse a method name, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "HEAD" => Some(Method::Head),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "PATCH" => Some(Method::Patch),
            "DELETE" => Some(Method::Delete),
            "OPTIONS" => Some(Method::Options),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An intercepted outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: BTreeMap::new(),
        }
    }

    /// Build a GET request for `path`, resolved against `origin`.
    /// Absolute URLs are accepted as-is.
    pub fn get(origin: &Url, path: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(Method::Get, resolve(origin, path)?))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.method, &self.url)
    }
}

/// Resolve a manifest or command line path against the origin.
pub fn resolve(origin: &Url, path: &str) -> Result<Url, ConfigError> {
    origin
        .join(path)
        .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", path, e)))
}

/// Store key: method plus URL with the fragment dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(method: Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(format!("{} {}", method, url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of a response, either fresh from the network or out of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
    /// Set on the copy handed back from a store, never persisted as true.
    #[serde(skip)]
    pub from_cache: bool,
    /// When the snapshot was written to a store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: default_status_text(status).to_string(),
            headers: BTreeMap::new(),
            body: body.into(),
            from_cache: false,
            cached_at: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Copy stamped for storage.
    pub(crate) fn stamped(mut self) -> Self {
        self.from_cache = false;
        self.cached_at = Some(Utc::now());
        self
    }

    /// Copy handed out of a store.
    pub(crate) fn served_from_cache(&self) -> Self {
        let mut copy = self.clone();
        copy.from_cache = true;
        copy
    }

    pub fn age_minutes(&self) -> Option<i64> {
        self.cached_at
            .map(|cached_at| (Utc::now() - cached_at).num_minutes())
    }

    pub fn age_display(&self) -> String {
        let Some(minutes) = self.age_minutes() else {
            return "never".to_string();
        };
        if minutes < 1 {
            // Clock skew lands here too
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

fn default_status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Stores hold bodies as base64 text rather than a JSON array of numbers.
mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn origin() -> Url {
        Url::parse("https://pwa.example.com/").unwrap()
    }

    #[test]
    fn test_request_resolves_against_origin() {
        let req = Request::get(&origin(), "/bills").unwrap();
        assert_eq!(req.url.as_str(), "https://pwa.example.com/bills");
        assert_eq!(req.path(), "/bills");
    }

    #[test]
    fn test_cache_key_ignores_fragment() {
        let a = Request::get(&origin(), "/bills#top").unwrap();
        let b = Request::get(&origin(), "/bills").unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(b.cache_key().as_str(), "GET https://pwa.example.com/bills");
    }

    #[test]
    fn test_cache_key_distinguishes_query_and_method() {
        let a = Request::get(&origin(), "/api/bills?page=1").unwrap();
        let b = Request::get(&origin(), "/api/bills?page=2").unwrap();
        assert_ne!(a.cache_key(), b.cache_key());

        let post = Request::new(Method::Post, a.url.clone());
        assert_ne!(post.cache_key(), a.cache_key());
    }

    #[test]
    fn test_method_parse_and_cacheable() {
        assert_eq!(Method::parse("get"), Some(Method::Get));
        assert_eq!(Method::parse("Delete"), Some(Method::Delete));
        assert_eq!(Method::parse("BREW"), None);
        assert!(Method::Get.is_cacheable());
        assert!(!Method::Post.is_cacheable());
    }

    #[test]
    fn test_response_success_range() {
        assert!(Response::new(200, "ok").is_success());
        assert!(Response::new(204, "").is_success());
        assert!(!Response::new(304, "").is_success());
        assert!(!Response::new(500, "").is_success());
    }

    #[test]
    fn test_response_age_display() {
        let mut resp = Response::new(200, "x");
        assert_eq!(resp.age_display(), "never");

        resp = resp.stamped();
        assert_eq!(resp.age_display(), "just now");

        resp.cached_at = Some(Utc::now() - Duration::minutes(5));
        assert_eq!(resp.age_display(), "5m ago");

        resp.cached_at = Some(Utc::now() - Duration::minutes(95));
        assert_eq!(resp.age_display(), "2h ago");

        resp.cached_at = Some(Utc::now() - Duration::hours(26));
        assert_eq!(resp.age_display(), "1d ago");
    }

    #[test]
    fn test_response_body_stored_as_base64_text() {
        let resp = Response::new(200, vec![0u8, 159, 146, 150, b'o', b'k']);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["body"], "AJ+Slm9r");

        let back: Response = serde_json::from_value(json).unwrap();
        assert_eq!(back.body, resp.body);
    }

    #[test]
    fn test_response_rejects_malformed_body_encoding() {
        let json = r#"{"status":200,"status_text":"OK","headers":{},"body":"not base64!"}"#;
        assert!(serde_json::from_str::<Response>(json).is_err());
    }
}
