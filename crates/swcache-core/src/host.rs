//! Minimal lifecycle host.
//!
//! Plays the part the browser plays for a real service worker: runs the
//! install step for a new generation, keeps it waiting until activation,
//! and routes intercepted requests to whichever generation is active.
//!
//! ```text
//! register(worker) ── Installing ──ok──> Installed (waiting)
//!                          └──err──> Redundant (active keeps serving)
//! activate()        ── Activating ──> Activated (old active -> Redundant)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::error::{FetchError, WorkerError};
use crate::net::Fetcher;
use crate::request::{Request, Response};
use crate::worker::OfflineWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenerationId(u64);

impl GenerationId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WorkerState {
    #[default]
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Replaced by a newer generation or failed to install.
    Redundant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    StateChange {
        generation: GenerationId,
        state: WorkerState,
    },
    StoresReclaimed {
        generation: GenerationId,
        names: Vec<String>,
    },
}

#[derive(Clone)]
struct Generation {
    id: GenerationId,
    worker: Arc<OfflineWorker>,
}

pub struct ServiceWorkerHost {
    network: Arc<dyn Fetcher>,
    waiting: RwLock<Option<Generation>>,
    active: RwLock<Option<Generation>>,
    event_tx: mpsc::UnboundedSender<HostEvent>,
}

impl ServiceWorkerHost {
    /// `network` answers requests while no generation is active.
    pub fn new(network: Arc<dyn Fetcher>) -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                network,
                waiting: RwLock::new(None),
                active: RwLock::new(None),
                event_tx,
            },
            event_rx,
        )
    }

    fn emit(&self, generation: GenerationId, state: WorkerState) {
        // Nobody listening is fine
        let _ = self.event_tx.send(HostEvent::StateChange { generation, state });
    }

    /// Install a new generation. On success it waits for `activate`; on
    /// failure it is discarded and the active generation is untouched.
    pub async fn register(&self, worker: OfflineWorker) -> Result<GenerationId, WorkerError> {
        let generation = Generation {
            id: GenerationId::next(),
            worker: Arc::new(worker),
        };
        self.emit(generation.id, WorkerState::Installing);

        if let Err(e) = generation.worker.on_install().await {
            warn!(generation = generation.id.0, error = %e, "Install failed, generation is redundant");
            self.emit(generation.id, WorkerState::Redundant);
            return Err(e);
        }

        self.emit(generation.id, WorkerState::Installed);
        let id = generation.id;
        if let Some(replaced) = self.waiting.write().await.replace(generation) {
            self.emit(replaced.id, WorkerState::Redundant);
        }
        Ok(id)
    }

    /// Promote the waiting generation and reclaim stores it does not own.
    /// Returns `None` when nothing was waiting.
    pub async fn activate(&self) -> Option<GenerationId> {
        let generation = self.waiting.write().await.take()?;
        self.emit(generation.id, WorkerState::Activating);

        let previous = self.active.write().await.replace(generation.clone());
        if let Some(previous) = previous {
            previous.worker.settle().await;
            self.emit(previous.id, WorkerState::Redundant);
        }

        let names = generation.worker.on_activate().await;
        if !names.is_empty() {
            let _ = self.event_tx.send(HostEvent::StoresReclaimed {
                generation: generation.id,
                names,
            });
        }

        self.emit(generation.id, WorkerState::Activated);
        info!(generation = generation.id.0, "Generation active");
        Some(generation.id)
    }

    /// Register and activate in one step, like `skipWaiting()`.
    pub async fn install_and_activate(
        &self,
        worker: OfflineWorker,
    ) -> Result<GenerationId, WorkerError> {
        let id = self.register(worker).await?;
        self.activate().await;
        Ok(id)
    }

    pub async fn active_generation(&self) -> Option<GenerationId> {
        self.active.read().await.as_ref().map(|g| g.id)
    }

    pub async fn waiting_generation(&self) -> Option<GenerationId> {
        self.waiting.read().await.as_ref().map(|g| g.id)
    }

    pub async fn active_worker(&self) -> Option<Arc<OfflineWorker>> {
        self.active.read().await.as_ref().map(|g| Arc::clone(&g.worker))
    }

    /// Deliver a request to the active generation, or straight to the
    /// network when none is active.
    pub async fn fetch(&self, request: Request) -> Result<Response, WorkerError> {
        match self.active_worker().await {
            Some(worker) => worker.on_fetch(request).await,
            None => self
                .network
                .fetch(&request)
                .await
                .map_err(|source: FetchError| WorkerError::Network {
                    url: request.url.to_string(),
                    source,
                }),
        }
    }

    /// Wait for the active generation's background work.
    pub async fn settle(&self) {
        if let Some(worker) = self.active_worker().await {
            worker.settle().await;
        }
    }
}
