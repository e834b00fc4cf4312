use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{CacheError, ConfigError};
use crate::request::{CacheKey, Method, Request, Response};

/// Extension of the per-store files in a persisted storage directory.
const STORE_FILE_EXT: &str = "json";

/// A stored request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub method: Method,
    pub url: String,
    pub response: Response,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    name: String,
    created_at: DateTime<Utc>,
    entries: BTreeMap<CacheKey, CacheEntry>,
}

#[derive(Debug)]
struct CacheInner {
    name: String,
    created_at: DateTime<Utc>,
    path: Option<PathBuf>,
    deleted: AtomicBool,
    entries: RwLock<BTreeMap<CacheKey, CacheEntry>>,
}

impl CacheInner {
    fn new(name: &str, path: Option<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            created_at: Utc::now(),
            path,
            deleted: AtomicBool::new(false),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Write the whole store to its file, if it has one.
    fn persist(&self, entries: &BTreeMap<CacheKey, CacheEntry>) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if self.deleted.load(Ordering::Acquire) {
            return Ok(());
        }

        let file = StoreFile {
            name: self.name.clone(),
            created_at: self.created_at,
            entries: entries.clone(),
        };
        let contents = serde_json::to_string_pretty(&file)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write cache store: {}", self.name))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace cache store: {}", self.name))?;
        Ok(())
    }
}

/// Handle to a single named store.
/// Clone is cheap - all handles to the same name share one store.
#[derive(Debug, Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

impl Cache {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub async fn match_request(&self, request: &Request) -> Option<Response> {
        let entries = self.inner.entries.read().await;
        entries
            .get(&request.cache_key())
            .map(|entry| entry.response.served_from_cache())
    }

    /// Store a snapshot, replacing any previous one for the same key.
    /// Non-GET requests and non-2xx responses are rejected.
    pub async fn put(&self, request: &Request, response: Response) -> Result<(), CacheError> {
        self.put_all(vec![(request.clone(), response)]).await
    }

    /// Store a batch of snapshots. Either every pair is stored or none is.
    pub async fn put_all(&self, pairs: Vec<(Request, Response)>) -> Result<(), CacheError> {
        let mut staged = Vec::with_capacity(pairs.len());
        for (request, response) in pairs {
            staged.push((request.cache_key(), Self::entry_for(&request, response)?));
        }

        let mut entries = self.inner.entries.write().await;
        let mut previous = Vec::with_capacity(staged.len());
        for (key, entry) in staged {
            let old = entries.insert(key.clone(), entry);
            previous.push((key, old));
        }

        if let Err(e) = self.inner.persist(&entries) {
            // Roll back so memory matches what is on disk
            for (key, old) in previous.into_iter().rev() {
                match old {
                    Some(old) => entries.insert(key, old),
                    None => entries.remove(&key),
                };
            }
            return Err(CacheError::Storage(format!("{:#}", e)));
        }

        debug!(cache = %self.inner.name, entries = entries.len(), "Cache updated");
        Ok(())
    }

    fn entry_for(request: &Request, response: Response) -> Result<CacheEntry, CacheError> {
        if !request.method.is_cacheable() {
            return Err(CacheError::UncacheableMethod {
                method: request.method.to_string(),
                key: request.cache_key().to_string(),
            });
        }
        if !response.is_success() {
            return Err(CacheError::UncacheableStatus {
                status: response.status,
                key: request.cache_key().to_string(),
            });
        }
        Ok(CacheEntry {
            method: request.method,
            url: request.url.to_string(),
            response: response.stamped(),
        })
    }

    pub async fn delete(&self, request: &Request) -> Result<bool, CacheError> {
        let mut entries = self.inner.entries.write().await;
        let Some(old) = entries.remove(&request.cache_key()) else {
            return Ok(false);
        };
        if let Err(e) = self.inner.persist(&entries) {
            entries.insert(request.cache_key(), old);
            return Err(CacheError::Storage(format!("{:#}", e)));
        }
        Ok(true)
    }

    pub async fn keys(&self) -> Vec<CacheKey> {
        self.inner.entries.read().await.keys().cloned().collect()
    }

    pub async fn entries(&self) -> Vec<CacheEntry> {
        self.inner.entries.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Debug)]
struct StorageInner {
    root: Option<PathBuf>,
    /// Stores in creation order.
    caches: RwLock<Vec<Cache>>,
}

/// The set of named stores an origin owns.
///
/// Passed explicitly to the worker; tests get isolated in-memory storage,
/// the CLI a directory-backed one that survives restarts.
#[derive(Debug, Clone)]
pub struct CacheStorage {
    inner: Arc<StorageInner>,
}

impl Default for CacheStorage {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl CacheStorage {
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(StorageInner {
                root: None,
                caches: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Storage backed by one JSON file per store under `root`.
    /// Existing store files are loaded; unreadable ones are skipped.
    pub fn persistent(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create storage directory: {}", root.display()))?;

        let mut loaded = Vec::new();
        for dir_entry in std::fs::read_dir(&root)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STORE_FILE_EXT) {
                continue;
            }
            match Self::load_store(&path) {
                Ok(cache) => loaded.push(cache),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable cache store");
                }
            }
        }
        loaded.sort_by_key(|c| c.inner.created_at);

        debug!(root = %root.display(), stores = loaded.len(), "Opened persistent cache storage");
        Ok(Self {
            inner: Arc::new(StorageInner {
                root: Some(root),
                caches: RwLock::new(loaded),
            }),
        })
    }

    fn load_store(path: &Path) -> Result<Cache> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache store: {}", path.display()))?;
        let file: StoreFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache store: {}", path.display()))?;

        Ok(Cache {
            inner: Arc::new(CacheInner {
                name: file.name,
                created_at: file.created_at,
                path: Some(path.to_path_buf()),
                deleted: AtomicBool::new(false),
                entries: RwLock::new(file.entries),
            }),
        })
    }

    fn validate_name(name: &str) -> Result<(), ConfigError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if valid {
            Ok(())
        } else {
            Err(ConfigError::InvalidCacheName(name.to_string()))
        }
    }

    /// Open a store, creating it if absent.
    pub async fn open(&self, name: &str) -> Result<Cache, CacheError> {
        Self::validate_name(name).map_err(|e| CacheError::Storage(e.to_string()))?;

        let mut caches = self.inner.caches.write().await;
        if let Some(cache) = caches.iter().find(|c| c.name() == name) {
            return Ok(cache.clone());
        }

        let path = self
            .inner
            .root
            .as_ref()
            .map(|root| root.join(format!("{}.{}", name, STORE_FILE_EXT)));
        let cache = Cache {
            inner: Arc::new(CacheInner::new(name, path)),
        };
        cache
            .inner
            .persist(&BTreeMap::new())
            .map_err(|e| CacheError::Storage(format!("{:#}", e)))?;

        debug!(cache = name, "Created cache store");
        caches.push(cache.clone());
        Ok(cache)
    }

    pub async fn has(&self, name: &str) -> bool {
        self.inner.caches.read().await.iter().any(|c| c.name() == name)
    }

    /// Delete a store and its file. Outstanding handles keep working in
    /// memory but no longer write to disk.
    pub async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut caches = self.inner.caches.write().await;
        let Some(pos) = caches.iter().position(|c| c.name() == name) else {
            return Ok(false);
        };
        let cache = &caches[pos];
        cache.inner.deleted.store(true, Ordering::Release);

        if let Some(ref path) = cache.inner.path {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    // Store stays listed and writable when its file cannot go
                    cache.inner.deleted.store(false, Ordering::Release);
                    return Err(CacheError::Storage(format!("{}: {}", path.display(), e)));
                }
            }
        }
        caches.remove(pos);
        debug!(cache = name, "Deleted cache store");
        Ok(true)
    }

    /// Store names in creation order.
    pub async fn keys(&self) -> Vec<String> {
        self.inner
            .caches
            .read()
            .await
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn req(path: &str) -> Request {
        Request::get(&Url::parse("https://pwa.example.com").unwrap(), path).unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_and_reuses() {
        let storage = CacheStorage::in_memory();
        assert!(!storage.has("pwa-cache-v1").await);

        let a = storage.open("pwa-cache-v1").await.unwrap();
        a.put(&req("/"), Response::new(200, "home")).await.unwrap();

        let b = storage.open("pwa-cache-v1").await.unwrap();
        assert_eq!(b.len().await, 1);
        assert_eq!(storage.keys().await, vec!["pwa-cache-v1"]);
    }

    #[tokio::test]
    async fn test_match_returns_cached_copy() {
        let storage = CacheStorage::in_memory();
        let cache = storage.open("static").await.unwrap();
        cache.put(&req("/globals.css"), Response::new(200, "body{}")).await.unwrap();

        let hit = cache.match_request(&req("/globals.css")).await.unwrap();
        assert!(hit.from_cache);
        assert!(hit.cached_at.is_some());
        assert_eq!(hit.text(), "body{}");
        assert!(cache.match_request(&req("/other.css")).await.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_previous_snapshot() {
        let storage = CacheStorage::in_memory();
        let cache = storage.open("api").await.unwrap();
        cache.put(&req("/api/bills"), Response::new(200, "v1")).await.unwrap();
        cache.put(&req("/api/bills"), Response::new(200, "v2")).await.unwrap();

        assert_eq!(cache.len().await, 1);
        let hit = cache.match_request(&req("/api/bills")).await.unwrap();
        assert_eq!(hit.text(), "v2");
    }

    #[tokio::test]
    async fn test_put_rejects_error_status_and_keeps_entry() {
        let storage = CacheStorage::in_memory();
        let cache = storage.open("api").await.unwrap();
        cache.put(&req("/api/bills"), Response::new(200, "good")).await.unwrap();

        let err = cache
            .put(&req("/api/bills"), Response::new(503, "down"))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::UncacheableStatus { status: 503, .. }));

        let hit = cache.match_request(&req("/api/bills")).await.unwrap();
        assert_eq!(hit.text(), "good");
    }

    #[tokio::test]
    async fn test_put_rejects_non_get() {
        let storage = CacheStorage::in_memory();
        let cache = storage.open("api").await.unwrap();
        let post = Request::new(Method::Post, req("/api/bills").url);

        let err = cache.put(&post, Response::new(200, "")).await.unwrap_err();
        assert!(matches!(err, CacheError::UncacheableMethod { .. }));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_all_is_all_or_nothing() {
        let storage = CacheStorage::in_memory();
        let cache = storage.open("static").await.unwrap();

        let result = cache
            .put_all(vec![
                (req("/"), Response::new(200, "home")),
                (req("/bills"), Response::new(404, "missing")),
            ])
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_entry_and_store() {
        let storage = CacheStorage::in_memory();
        let cache = storage.open("static").await.unwrap();
        cache.put(&req("/"), Response::new(200, "home")).await.unwrap();

        assert!(cache.delete(&req("/")).await.unwrap());
        assert!(!cache.delete(&req("/")).await.unwrap());

        assert!(storage.delete("static").await.unwrap());
        assert!(!storage.delete("static").await.unwrap());
        assert!(!storage.has("static").await);
    }

    #[tokio::test]
    async fn test_invalid_store_names_rejected() {
        let storage = CacheStorage::in_memory();
        assert!(storage.open("").await.is_err());
        assert!(storage.open("../escape").await.is_err());
        assert!(storage.open("a/b").await.is_err());
        assert!(storage.open("pwa-cache-v2").await.is_ok());
    }

    #[tokio::test]
    async fn test_persistent_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let storage = CacheStorage::persistent(dir.path()).unwrap();
            let stat = storage.open("pwa-cache-v1").await.unwrap();
            stat.put(&req("/"), Response::new(200, "home")).await.unwrap();
            storage.open("api-cache-v1").await.unwrap();
        }

        let storage = CacheStorage::persistent(dir.path()).unwrap();
        let mut names = storage.keys().await;
        names.sort();
        assert_eq!(names, vec!["api-cache-v1", "pwa-cache-v1"]);
        let stat = storage.open("pwa-cache-v1").await.unwrap();
        let hit = stat.match_request(&req("/")).await.unwrap();
        assert_eq!(hit.text(), "home");
    }

    #[tokio::test]
    async fn test_persistent_delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::persistent(dir.path()).unwrap();
        let old = storage.open("pwa-cache-v0").await.unwrap();
        let file = dir.path().join("pwa-cache-v0.json");
        assert!(file.exists());

        storage.delete("pwa-cache-v0").await.unwrap();
        assert!(!file.exists());

        // A stale handle must not resurrect the file
        old.put(&req("/"), Response::new(200, "home")).await.unwrap();
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_store_listed() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CacheStorage::persistent(dir.path()).unwrap();
        storage.open("pwa-cache-v0").await.unwrap();

        // A directory where the store file should be cannot be removed as a file
        let file = dir.path().join("pwa-cache-v0.json");
        std::fs::remove_file(&file).unwrap();
        std::fs::create_dir(&file).unwrap();

        assert!(matches!(
            storage.delete("pwa-cache-v0").await,
            Err(CacheError::Storage(_))
        ));
        assert!(storage.has("pwa-cache-v0").await);
    }

    #[tokio::test]
    async fn test_persistent_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let storage = CacheStorage::persistent(dir.path()).unwrap();
        assert!(storage.keys().await.is_empty());
    }
}
