//! # swcache-core
//!
//! Offline cache manager for a progressive web app origin.
//!
//! The worker sits between the page and the network:
//!
//! - **Install** pre-caches a fixed manifest into the static store, all or
//!   nothing.
//! - **Fetch** routes every request by path: API paths use
//!   stale-while-revalidate against the API store, everything else is
//!   cache-first against the static store.
//! - **Activate** reclaims stores left behind by older generations.
//!
//! Stores and the network are injected (`CacheStorage`, `Fetcher`), so the
//! same worker runs under the CLI host against a real origin or under a
//! scripted network in tests.

pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod manifest;
pub mod net;
pub mod request;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{Cache, CacheEntry, CacheStorage};
pub use config::Config;
pub use error::{CacheError, ConfigError, FetchError, WorkerError};
pub use host::{GenerationId, HostEvent, ServiceWorkerHost, WorkerState};
pub use manifest::Manifest;
pub use net::{Fetcher, HttpFetcher};
pub use request::{CacheKey, Method, Request, Response};
pub use worker::{OfflineWorker, Route, WorkerConfig};
