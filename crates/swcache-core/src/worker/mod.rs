//! The offline worker: install handler, fetch interceptor and the two
//! caching strategies it dispatches to.
//!
//! ```text
//! on_install ──> manifest ──> fetch all ──> static store (all or nothing)
//!
//! on_fetch(request)
//!     ├── non-GET ──────────────> network only
//!     ├── path under api prefix ─> stale-while-revalidate (api store)
//!     └── everything else ──────> cache-first (static store)
//! ```

mod install;
mod strategy;

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::error::WorkerError;
use crate::manifest::Manifest;
use crate::net::Fetcher;
use crate::request::{Request, Response};

/// Version suffix used when none is configured.
pub const DEFAULT_CACHE_VERSION: &str = "v1";

/// Paths under this prefix are API calls.
pub const DEFAULT_API_PREFIX: &str = "/api/";

const STATIC_CACHE_PREFIX: &str = "pwa-cache";
const API_CACHE_PREFIX: &str = "api-cache";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub origin: Url,
    pub static_cache: String,
    pub api_cache: String,
    pub api_prefix: String,
    pub manifest: Manifest,
    /// Store successful cache-first misses so the static store can heal
    /// without a redeploy.
    pub cache_first_write_back: bool,
}

impl WorkerConfig {
    pub fn new(origin: Url, version: &str) -> Self {
        Self {
            origin,
            static_cache: format!("{}-{}", STATIC_CACHE_PREFIX, version),
            api_cache: format!("{}-{}", API_CACHE_PREFIX, version),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            manifest: Manifest::default(),
            cache_first_write_back: true,
        }
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn with_write_back(mut self, enabled: bool) -> Self {
        self.cache_first_write_back = enabled;
        self
    }

    /// Names of the stores this generation owns.
    pub fn cache_names(&self) -> [&str; 2] {
        [&self.static_cache, &self.api_cache]
    }
}

/// Strategy chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    CacheFirst,
    StaleWhileRevalidate,
    NetworkOnly,
}

pub struct OfflineWorker {
    config: WorkerConfig,
    storage: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    revalidations: Mutex<JoinSet<()>>,
}

impl OfflineWorker {
    pub fn new(config: WorkerConfig, storage: CacheStorage, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            storage,
            fetcher,
            revalidations: Mutex::new(JoinSet::new()),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    /// Pick a strategy from the request alone. No I/O.
    pub fn route(&self, request: &Request) -> Route {
        if !request.method.is_cacheable() {
            Route::NetworkOnly
        } else if request.path().starts_with(&self.config.api_prefix) {
            Route::StaleWhileRevalidate
        } else {
            Route::CacheFirst
        }
    }

    /// Answer an intercepted request through exactly one strategy.
    pub async fn on_fetch(&self, request: Request) -> Result<Response, WorkerError> {
        let route = self.route(&request);
        debug!(method = %request.method, url = %request.url, route = ?route, "Intercepted fetch");

        match route {
            Route::CacheFirst => self.cache_first(request).await,
            Route::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
            Route::NetworkOnly => self.network_only(request).await,
        }
    }

    /// Wait for every background revalidation started so far.
    pub async fn settle(&self) {
        let mut pending = match self.revalidations.lock() {
            Ok(mut set) => std::mem::take(&mut *set),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Background revalidation task failed");
            }
        }
    }

    pub(crate) fn spawn_background<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut set = match self.revalidations.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Reap finished tasks so the set does not grow without bound
        while set.try_join_next().is_some() {}
        set.spawn(task);
    }
}
