//! Shared fixtures for agent integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::{header, HeaderValue, StatusCode};
use swcache_agent::{AgentConfig, AgentError, CacheStorage, MemoryStorage, RequestKey, StoredResponse};
use swcache_net::{Fetcher, NetError, Request, Response, ResponseType};
use tokio::sync::Notify;
use url::Url;

pub const SCOPE: &str = "https://app.example/";
pub const VUE: &str = "https://unpkg.com/vue@3/dist/vue.global.js";

/// Route agent logs through the test harness; `RUST_LOG` selects verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn url(path: &str) -> Url {
    Url::parse(SCOPE).unwrap().join(path).unwrap()
}

pub fn config(version: &str) -> AgentConfig {
    AgentConfig {
        cache_version: version.to_string(),
        scope: SCOPE.to_string(),
        manifest: vec![
            "./".to_string(),
            "./index.html".to_string(),
            "./products.json".to_string(),
            VUE.to_string(),
        ],
        trusted_hosts: vec!["unpkg.com".to_string()],
        revalidate: vec!["./products.json".to_string()],
        ..Default::default()
    }
}

#[derive(Clone)]
enum Route {
    Respond {
        status: u16,
        body: String,
        response_type: ResponseType,
    },
    Fail,
    Flaky {
        failures: usize,
        body: String,
    },
}

/// Holds one fetch until opened.
#[derive(Default)]
pub struct Gate {
    arrived: Notify,
    release: Notify,
}

impl Gate {
    /// Wait until the held fetch has started.
    pub async fn arrived(&self) {
        self.arrived.notified().await;
    }

    /// Let the held fetch continue.
    pub fn open(&self) {
        self.release.notify_one();
    }
}

/// Fetcher that answers from a table of routes and records every call.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Route>>,
    gates: Mutex<HashMap<String, Arc<Gate>>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        init_tracing();
        Arc::new(Self::default())
    }

    /// Fetcher that serves every entry of `config("...")`'s manifest.
    pub fn serving_manifest() -> Arc<Self> {
        let fetcher = Self::new();
        fetcher.respond(url("./").as_str(), 200, "<html>root</html>");
        fetcher.respond(url("./index.html").as_str(), 200, "<html>index</html>");
        fetcher.respond(url("./products.json").as_str(), 200, "[\"v1\"]");
        fetcher.respond_cross(VUE, 200, "/* vue */");
        fetcher
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.route(url, Route::Respond {
            status,
            body: body.to_string(),
            response_type: ResponseType::Basic,
        });
    }

    pub fn respond_cross(&self, url: &str, status: u16, body: &str) {
        self.route(url, Route::Respond {
            status,
            body: body.to_string(),
            response_type: ResponseType::Cors,
        });
    }

    pub fn fail(&self, url: &str) {
        self.route(url, Route::Fail);
    }

    /// Fail `failures` times, then answer 200 with `body`.
    pub fn flaky(&self, url: &str, failures: usize, body: &str) {
        self.route(url, Route::Flaky {
            failures,
            body: body.to_string(),
        });
    }

    /// Hold the next fetch of `url` until the returned gate is opened.
    pub fn gate(&self, url: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates
            .lock()
            .unwrap()
            .insert(url.to_string(), Arc::clone(&gate));
        gate
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn route(&self, url: &str, route: Route) {
        self.routes.lock().unwrap().insert(url.to_string(), route);
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        let key = request.url.to_string();
        self.calls.lock().unwrap().push(key.clone());

        let gate = self.gates.lock().unwrap().remove(&key);
        if let Some(gate) = gate {
            gate.arrived.notify_one();
            gate.release.notified().await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::RequestFailed("offline".to_string()));
        }

        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .get_mut(&key)
            .ok_or_else(|| NetError::RequestFailed(format!("no route to {key}")))?;

        let (status, body, response_type) = match route {
            Route::Respond {
                status,
                body,
                response_type,
            } => (*status, body.clone(), *response_type),
            Route::Fail => return Err(NetError::RequestFailed("connection reset".to_string())),
            Route::Flaky { failures, body } => {
                if *failures > 0 {
                    *failures -= 1;
                    return Err(NetError::RequestFailed("flaky".to_string()));
                }
                (200, body.clone(), ResponseType::Basic)
            }
        };

        Ok(Response::new(request.url.clone(), StatusCode::from_u16(status).unwrap())
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .with_body(body)
            .with_type(response_type))
    }
}

/// Memory storage whose deletes always fail.
#[derive(Default)]
pub struct StickyStorage {
    inner: MemoryStorage,
}

#[async_trait]
impl CacheStorage for StickyStorage {
    async fn open(&self, name: &str) -> swcache_agent::Result<()> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> swcache_agent::Result<bool> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> swcache_agent::Result<Vec<String>> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> swcache_agent::Result<bool> {
        Err(AgentError::Storage(format!("{name} is locked")))
    }

    async fn match_entry(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> swcache_agent::Result<Option<StoredResponse>> {
        self.inner.match_entry(name, key).await
    }

    async fn put(
        &self,
        name: &str,
        key: RequestKey,
        response: StoredResponse,
    ) -> swcache_agent::Result<bool> {
        self.inner.put(name, key, response).await
    }

    async fn entries(&self, name: &str) -> swcache_agent::Result<Vec<RequestKey>> {
        self.inner.entries(name).await
    }
}

/// Memory storage whose entry reads and writes fail once `broken` is set.
#[derive(Default)]
pub struct FaultyStorage {
    inner: MemoryStorage,
    broken: AtomicBool,
}

impl FaultyStorage {
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    fn check(&self) -> swcache_agent::Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(AgentError::Storage("disk unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for FaultyStorage {
    async fn open(&self, name: &str) -> swcache_agent::Result<()> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> swcache_agent::Result<bool> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> swcache_agent::Result<Vec<String>> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> swcache_agent::Result<bool> {
        self.inner.delete(name).await
    }

    async fn match_entry(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> swcache_agent::Result<Option<StoredResponse>> {
        self.check()?;
        self.inner.match_entry(name, key).await
    }

    async fn put(
        &self,
        name: &str,
        key: RequestKey,
        response: StoredResponse,
    ) -> swcache_agent::Result<bool> {
        self.check()?;
        self.inner.put(name, key, response).await
    }

    async fn entries(&self, name: &str) -> swcache_agent::Result<Vec<RequestKey>> {
        self.inner.entries(name).await
    }
}

/// Body of the entry stored for `url` in `version`, if any.
pub async fn stored_body(storage: &dyn CacheStorage, version: &str, url: &Url) -> Option<String> {
    storage
        .match_entry(version, &RequestKey::get(url))
        .await
        .unwrap()
        .map(|s| String::from_utf8(s.body().to_vec()).unwrap())
}
