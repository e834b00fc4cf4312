//! Install-time manifest: the assets that must be in the static store
//! before a worker generation may activate.

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::request::Request;

/// Paths pre-cached by default: the app shell bundles, stylesheet,
/// web manifest and the navigable routes.
const DEFAULT_ASSETS: &[&str] = &[
    "/_next/static/js/main-app.js",
    "/_next/static/js/app/layout.js",
    "/_next/static/js/app/todos/page.js",
    "/_next/static/js/app/bills/page.js",
    "/globals.css",
    "/manifest.json",
    "/",
    "/todos",
    "/bills",
];

/// Ordered set of URL paths. Duplicates collapse to their first position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: Vec<String>,
}

impl Manifest {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut deduped: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry.into();
            if !deduped.contains(&entry) {
                deduped.push(entry);
            }
        }
        Self { entries: deduped }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e == path)
    }

    /// Returns a manifest with `path` appended, if not already present.
    pub fn with_entry(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if !self.contains(&path) {
            self.entries.push(path);
        }
        self
    }

    /// GET requests for every entry, in manifest order.
    pub fn resolve(&self, origin: &Url) -> Result<Vec<Request>, ConfigError> {
        self.entries
            .iter()
            .map(|path| Request::get(origin, path))
            .collect()
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new(DEFAULT_ASSETS.iter().copied())
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<String>::deserialize(deserializer)?;
        Ok(Self::new(entries))
    }
}
