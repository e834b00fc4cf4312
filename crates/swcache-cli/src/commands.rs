//! Subcommand implementations.
//!
//! Each command takes the network and the output stream from `main`, so the
//! same code runs against a real origin or a scripted one in tests.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use swcache_core::{
    CacheStorage, Config, Fetcher, HostEvent, Method, OfflineWorker, Request, ServiceWorkerHost,
};

#[derive(Args)]
pub struct FetchArgs {
    /// Path (resolved against the origin) or absolute URL
    pub path: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Print the response body
    #[arg(short, long)]
    pub include_body: bool,
}

#[derive(Args)]
pub struct ClearArgs {
    /// Only delete this store
    #[arg(long)]
    pub name: Option<String>,
}

fn open_storage(config: &Config) -> Result<CacheStorage> {
    let dir = config.stores_dir()?;
    debug!(dir = %dir.display(), "Opening cache stores");
    CacheStorage::persistent(dir)
}

fn build_worker(
    config: &Config,
    storage: CacheStorage,
    network: Arc<dyn Fetcher>,
) -> Result<OfflineWorker> {
    Ok(OfflineWorker::new(config.worker_config()?, storage, network))
}

pub async fn install(config: &Config, network: Arc<dyn Fetcher>, out: &mut impl Write) -> Result<()> {
    let storage = open_storage(config)?;
    let (host, _events) = ServiceWorkerHost::new(Arc::clone(&network));

    let worker = build_worker(config, storage, network)?;
    let static_cache = worker.config().static_cache.clone();
    host.register(worker)
        .await
        .context("Install failed; the previous generation is still in place")?;

    writeln!(
        out,
        "Installed {} assets into {}",
        config.manifest.len(),
        static_cache
    )?;
    Ok(())
}

pub async fn activate(config: &Config, network: Arc<dyn Fetcher>, out: &mut impl Write) -> Result<()> {
    let storage = open_storage(config)?;
    let (host, mut events) = ServiceWorkerHost::new(Arc::clone(&network));

    let worker = build_worker(config, storage.clone(), network)?;
    host.install_and_activate(worker).await?;

    let mut reclaimed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let HostEvent::StoresReclaimed { names, .. } = event {
            reclaimed.extend(names);
        }
    }

    writeln!(out, "Active stores: {}", storage.keys().await.join(", "))?;
    if reclaimed.is_empty() {
        writeln!(out, "No stale stores to reclaim")?;
    } else {
        writeln!(out, "Reclaimed: {}", reclaimed.join(", "))?;
    }
    Ok(())
}

pub async fn fetch(
    config: &Config,
    args: FetchArgs,
    network: Arc<dyn Fetcher>,
    out: &mut impl Write,
) -> Result<()> {
    let method = Method::parse(&args.method)
        .ok_or_else(|| anyhow::anyhow!("Unsupported method: {}", args.method))?;
    let storage = open_storage(config)?;
    let worker = build_worker(config, storage, network)?;

    let mut request = Request::get(&config.origin_url()?, &args.path)?;
    request.method = method;
    let route = worker.route(&request);

    let response = worker.on_fetch(request).await?;
    // Let the background refresh land in the store before exiting
    worker.settle().await;

    let source = if response.from_cache { "cache" } else { "network" };
    writeln!(
        out,
        "{} {} ({}, {:?}, {} bytes)",
        response.status,
        response.status_text,
        source,
        route,
        response.body.len()
    )?;
    if args.include_body {
        out.write_all(&response.body)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

pub async fn status(config: &Config, out: &mut impl Write) -> Result<()> {
    let storage = open_storage(config)?;
    let worker_config = config.worker_config()?;
    let names = storage.keys().await;

    if names.is_empty() {
        writeln!(out, "No cache stores")?;
        return Ok(());
    }

    for name in names {
        let cache = storage.open(&name).await?;
        let marker = if worker_config.cache_names().contains(&name.as_str()) {
            "current"
        } else {
            "stale"
        };
        writeln!(out, "{} ({}, {} entries)", name, marker, cache.len().await)?;
        for entry in cache.entries().await {
            writeln!(
                out,
                "  {:<6} {:<60} {:>4} {:>8} bytes  {}",
                entry.method.as_str(),
                entry.url,
                entry.response.status,
                entry.response.body.len(),
                entry.response.age_display()
            )?;
        }
    }
    Ok(())
}

pub async fn clear(config: &Config, args: ClearArgs, out: &mut impl Write) -> Result<()> {
    let storage = open_storage(config)?;
    let names = match args.name {
        Some(name) => vec![name],
        None => storage.keys().await,
    };

    for name in names {
        if storage.delete(&name).await? {
            writeln!(out, "Deleted {}", name)?;
        } else {
            writeln!(out, "No store named {}", name)?;
        }
    }
    Ok(())
}
