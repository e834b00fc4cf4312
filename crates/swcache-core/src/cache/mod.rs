//! Named cache stores.
//!
//! `CacheStorage` is the explicit handle over every store an origin owns;
//! `Cache` is one named store mapping request keys to response snapshots.
//! A store name carries its generation (e.g. `pwa-cache-v1`), so bumping
//! the version starts a fresh store and leaves the old one for the
//! activate step to reclaim.

pub mod storage;

pub use storage::{Cache, CacheEntry, CacheStorage};
