//! Upstream network access.
//!
//! The worker never talks to `reqwest` directly: it goes through the
//! `Fetcher` trait so the host (or a test) decides what "the network" is.
//! A fetcher only fails on transport errors; any HTTP status, including
//! 4xx/5xx, comes back as a `Response` for the strategy to judge.

pub mod client;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::request::{Request, Response};

pub use client::HttpFetcher;

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}
