//! Scripted network for worker tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use url::Url;

use crate::error::FetchError;
use crate::net::Fetcher;
use crate::request::{Request, Response};

pub const ORIGIN: &str = "https://pwa.example.com";

pub fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub fn get(path: &str) -> Request {
    Request::get(&origin(), path).unwrap()
}

/// Holds matching fetches until opened. Stays open once opened.
#[derive(Clone)]
pub struct Gate(Arc<watch::Sender<bool>>);

impl Gate {
    pub fn open(&self) {
        self.0.send_replace(true);
    }
}

#[derive(Clone)]
enum Reply {
    Respond(Response),
    Fail(FetchError),
}

#[derive(Clone)]
struct Route {
    reply: Reply,
    gate: Option<watch::Receiver<bool>>,
}

/// Fetcher keyed by URL path. Unscripted paths fail as offline.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, path: &str, status: u16, body: &str) {
        self.script(path, Reply::Respond(Response::new(status, body)));
    }

    pub fn fail(&self, path: &str) {
        self.script(path, Reply::Fail(FetchError::Offline));
    }

    fn script(&self, path: &str, reply: Reply) {
        let mut routes = self.routes.lock().unwrap();
        let gate = routes.get(path).and_then(|r| r.gate.clone());
        routes.insert(path.to_string(), Route { reply, gate });
    }

    /// Delay every fetch of `path` until the returned gate is opened.
    pub fn gate(&self, path: &str) -> Gate {
        let (tx, rx) = watch::channel(false);
        let mut routes = self.routes.lock().unwrap();
        let route = routes.entry(path.to_string()).or_insert(Route {
            reply: Reply::Fail(FetchError::Offline),
            gate: None,
        });
        route.gate = Some(rx);
        Gate(Arc::new(tx))
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|p| *p == path).count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let path = request.path().to_string();
        self.calls.lock().unwrap().push(path.clone());

        let route = self.routes.lock().unwrap().get(&path).cloned();
        let Some(route) = route else {
            return Err(FetchError::Offline);
        };

        if let Some(mut gate) = route.gate {
            let _ = gate.wait_for(|open| *open).await;
        }

        // Re-read so a reply scripted while gated wins
        let reply = self
            .routes
            .lock()
            .unwrap()
            .get(&path)
            .map(|r| r.reply.clone())
            .unwrap_or(route.reply);
        match reply {
            Reply::Respond(response) => Ok(response),
            Reply::Fail(error) => Err(error),
        }
    }
}
