use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::OfflineWorker;
use crate::error::{FetchError, WorkerError};
use crate::request::{Request, Response};

impl OfflineWorker {
    /// Serve from the static store; on a miss go to the network.
    pub(crate) async fn cache_first(&self, request: Request) -> Result<Response, WorkerError> {
        let cache = self.storage.open(&self.config.static_cache).await?;

        if let Some(cached) = cache.match_request(&request).await {
            debug!(url = %request.url, cache = cache.name(), "Cache hit");
            return Ok(cached);
        }

        debug!(url = %request.url, cache = cache.name(), "Cache miss, going to network");
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|source| WorkerError::Network {
                url: request.url.to_string(),
                source,
            })?;

        if self.config.cache_first_write_back && response.is_success() {
            if let Err(e) = cache.put(&request, response.clone()).await {
                warn!(url = %request.url, error = %e, "Failed to store cache-first miss");
            }
        }
        Ok(response)
    }

    /// Answer from the API store at once when possible, refreshing it from
    /// the network in the background either way.
    pub(crate) async fn stale_while_revalidate(
        &self,
        request: Request,
    ) -> Result<Response, WorkerError> {
        let cache = self.storage.open(&self.config.api_cache).await?;

        // The network fetch starts before the cache lookup and is never
        // awaited when the cache can answer.
        let (tx, rx) = oneshot::channel();
        let fetcher = Arc::clone(&self.fetcher);
        let store = cache.clone();
        let background_request = request.clone();
        self.spawn_background(async move {
            let request = background_request;
            let result = fetcher.fetch(&request).await;
            match &result {
                Ok(response) if response.is_success() => {
                    if let Err(e) = store.put(&request, response.clone()).await {
                        warn!(url = %request.url, error = %e, "Failed to store revalidated response");
                    } else {
                        debug!(url = %request.url, cache = store.name(), "Revalidated");
                    }
                }
                Ok(response) => {
                    debug!(url = %request.url, status = response.status, "Keeping cached entry, network returned error status");
                }
                Err(e) => {
                    debug!(url = %request.url, error = %e, "Revalidation failed");
                }
            }
            // Receiver is gone when the caller was answered from cache
            let _ = tx.send(result);
        });

        let cached = cache.match_request(&request).await;
        if let Some(cached) = cached {
            debug!(url = %request.url, cache = cache.name(), "Serving cached response while revalidating");
            return Ok(cached);
        }

        let result = rx.await.unwrap_or_else(|_| {
            Err(FetchError::Network("revalidation task was cancelled".to_string()))
        });
        match result {
            Ok(response) => Ok(response),
            Err(source) => {
                // An API path may have been pre-cached by install
                let installed = self.storage.open(&self.config.static_cache).await?;
                if let Some(cached) = installed.match_request(&request).await {
                    debug!(url = %request.url, cache = installed.name(), "Network failed, serving installed snapshot");
                    return Ok(cached);
                }
                debug!(url = %request.url, "No cached response and network failed");
                Err(WorkerError::Network {
                    url: request.url.to_string(),
                    source,
                })
            }
        }
    }

    pub(crate) async fn network_only(&self, request: Request) -> Result<Response, WorkerError> {
        self.fetcher
            .fetch(&request)
            .await
            .map_err(|source| WorkerError::Network {
                url: request.url.to_string(),
                source,
            })
    }
}
