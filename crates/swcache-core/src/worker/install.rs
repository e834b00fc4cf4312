use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use super::OfflineWorker;
use crate::error::WorkerError;
use crate::request::{Request, Response};

/// Maximum concurrent manifest fetches during install.
/// Keeps a large manifest from opening a connection per asset at once.
const MAX_CONCURRENT_INSTALL_FETCHES: usize = 6;

impl OfflineWorker {
    /// Pre-cache every manifest URL into the static store.
    ///
    /// All fetches must succeed with a 2xx status before anything is
    /// written; a single failure fails the whole install and leaves the
    /// static store as it was. Returns the number of entries stored.
    pub async fn on_install(&self) -> Result<usize, WorkerError> {
        let requests = self.config.manifest.resolve(&self.config.origin)?;
        info!(
            cache = %self.config.static_cache,
            assets = requests.len(),
            "Installing worker generation"
        );

        let fetcher = &self.fetcher;
        let pairs: Vec<(Request, Response)> = stream::iter(requests)
            .map(|request| async move {
                let response = fetcher.fetch(&request).await.map_err(|e| WorkerError::Install {
                    url: request.url.to_string(),
                    reason: e.to_string(),
                })?;
                if !response.is_success() {
                    return Err(WorkerError::install_status(
                        request.url.as_str(),
                        response.status,
                        &response.body,
                    ));
                }
                debug!(url = %request.url, bytes = response.body.len(), "Fetched manifest asset");
                Ok::<_, WorkerError>((request, response))
            })
            .buffered(MAX_CONCURRENT_INSTALL_FETCHES)
            .try_collect()
            .await?;

        let stored = pairs.len();
        let cache = self.storage.open(&self.config.static_cache).await?;
        cache.put_all(pairs).await.map_err(|e| WorkerError::Install {
            url: cache.name().to_string(),
            reason: e.to_string(),
        })?;

        info!(cache = cache.name(), stored = stored, "Install complete");
        Ok(stored)
    }

    /// Delete every store that does not belong to this generation.
    /// Returns the names reclaimed. A store that cannot be deleted is
    /// logged and left for the next activation.
    pub async fn on_activate(&self) -> Vec<String> {
        let current = self.config.cache_names();
        let mut reclaimed = Vec::new();

        for name in self.storage.keys().await {
            if current.contains(&name.as_str()) {
                continue;
            }
            match self.storage.delete(&name).await {
                Ok(true) => {
                    debug!(cache = %name, "Reclaimed stale cache store");
                    reclaimed.push(name);
                }
                Ok(false) => {}
                Err(e) => warn!(cache = %name, error = %e, "Failed to reclaim stale cache store"),
            }
        }

        info!(reclaimed = reclaimed.len(), "Activated worker generation");
        reclaimed
    }
}
