//! Cache-first resolution with background revalidation.
//!
//! ```text
//! Start → Lookup ─┬─ hit ──────────────→ ReturnCached
//!                 ├─ hit (revalidated) → ReturnCachedWithBackgroundRefresh
//!                 └─ miss → NetworkFetch ─┬─ 200 basic → StoreAndReturn
//!                                         ├─ other     → ReturnUncached
//!                                         └─ failure ──┬─ navigation → ReturnOfflineDocument
//!                                                      └─ otherwise  → error
//! ```
//!
//! A response the cache could not take (storage error, or the version's cache
//! was collected meanwhile) is returned as `ReturnUncached`.

use std::sync::Arc;

use hashbrown::HashSet;
use http::StatusCode;
use swcache_net::{Fetcher, Request, Response, ResponseType};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use url::Url;

use crate::offline::offline_response;
use crate::storage::CacheStorage;
use crate::types::{CacheVersion, RequestKey, StoredResponse};
use crate::Result;

/// Terminal state reached while resolving a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    ReturnCached,
    ReturnCachedWithBackgroundRefresh,
    StoreAndReturn,
    ReturnUncached,
    ReturnOfflineDocument,
}

impl Outcome {
    /// Whether the response came from the cache.
    pub fn from_cache(self) -> bool {
        matches!(
            self,
            Outcome::ReturnCached | Outcome::ReturnCachedWithBackgroundRefresh
        )
    }
}

/// A resolved request.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub response: Response,
    pub outcome: Outcome,
}

/// Background refresh tasks that have not been awaited yet.
#[derive(Debug, Default)]
struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    async fn push(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    async fn settle(&self) -> usize {
        let handles = std::mem::take(&mut *self.handles.lock().await);
        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Background refresh task panicked");
            }
        }
        count
    }
}

/// Serves eligible requests from the cache for one version.
pub struct ResolutionStrategy {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    version: CacheVersion,
    revalidate: HashSet<String>,
    background: BackgroundTasks,
}

impl ResolutionStrategy {
    /// Create a strategy. Requests whose URL (ignoring query and fragment)
    /// matches one of `revalidate` are served stale-while-revalidate.
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        version: CacheVersion,
        revalidate: &[Url],
    ) -> Self {
        Self {
            storage,
            fetcher,
            version,
            revalidate: revalidate.iter().map(revalidation_key).collect(),
            background: BackgroundTasks::default(),
        }
    }

    /// Whether `url` is a designated mutable resource.
    pub fn is_revalidated(&self, url: &Url) -> bool {
        self.revalidate.contains(&revalidation_key(url))
    }

    /// Resolve a request. Only network failures on non-navigation requests
    /// are returned as errors.
    pub async fn resolve(&self, request: &Request) -> Result<Resolution> {
        let key = RequestKey::from_request(request);

        if let Some(key) = &key {
            if let Some(cached) = self.lookup(key).await {
                let response = cached.to_response()?;
                debug!(url = %request.url, "Serving from cache");

                if self.is_revalidated(&request.url) {
                    self.spawn_refresh(request.clone(), key.clone()).await;
                    return Ok(Resolution {
                        response,
                        outcome: Outcome::ReturnCachedWithBackgroundRefresh,
                    });
                }

                return Ok(Resolution {
                    response,
                    outcome: Outcome::ReturnCached,
                });
            }
        }

        debug!(url = %request.url, "Fetching from network");
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if !is_cacheable(&response) {
                    return Ok(Resolution {
                        response,
                        outcome: Outcome::ReturnUncached,
                    });
                }
                let stored = match key {
                    Some(key) => self.store(&request.url, key, &response).await,
                    None => false,
                };
                let outcome = if stored {
                    Outcome::StoreAndReturn
                } else {
                    Outcome::ReturnUncached
                };
                Ok(Resolution { response, outcome })
            }
            Err(e) if request.is_navigation() => {
                warn!(url = %request.url, error = %e, "Navigation failed, serving offline document");
                Ok(Resolution {
                    response: offline_response(&request.url),
                    outcome: Outcome::ReturnOfflineDocument,
                })
            }
            Err(e) => {
                error!(url = %request.url, error = %e, "Network fetch failed");
                Err(e.into())
            }
        }
    }

    /// Wait for every background refresh started so far. Returns how many
    /// were awaited.
    pub async fn settle(&self) -> usize {
        self.background.settle().await
    }

    async fn lookup(&self, key: &RequestKey) -> Option<StoredResponse> {
        match self.storage.match_entry(self.version.as_str(), key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    // Never creates the version's cache; a collected version stays gone.
    async fn store(&self, url: &Url, key: RequestKey, response: &Response) -> bool {
        match self
            .storage
            .put(self.version.as_str(), key, StoredResponse::snapshot(response))
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                debug!(%url, version = %self.version, "Cache no longer exists, not storing");
                false
            }
            Err(e) => {
                warn!(%url, error = %e, "Failed to cache network response");
                false
            }
        }
    }

    async fn spawn_refresh(&self, request: Request, key: RequestKey) {
        let storage = Arc::clone(&self.storage);
        let fetcher = Arc::clone(&self.fetcher);
        let version = self.version.clone();

        let handle = tokio::spawn(async move {
            match fetcher.fetch(&request).await {
                Ok(response) if response.ok() => {
                    let snapshot = StoredResponse::snapshot(&response);
                    match storage.put(version.as_str(), key, snapshot).await {
                        Ok(true) => debug!(url = %request.url, "Background refresh stored"),
                        Ok(false) => {
                            debug!(url = %request.url, %version, "Cache was collected, dropping refresh")
                        }
                        Err(e) => warn!(url = %request.url, error = %e, "Background refresh not stored"),
                    }
                }
                Ok(response) => {
                    debug!(url = %request.url, status = %response.status, "Background refresh not ok, keeping cache");
                }
                Err(e) => {
                    debug!(url = %request.url, error = %e, "Background refresh failed, keeping cache");
                }
            }
        });

        self.background.push(handle).await;
    }
}

/// Only complete, same-origin 200 responses are stored on a miss.
fn is_cacheable(response: &Response) -> bool {
    response.status == StatusCode::OK && response.response_type == ResponseType::Basic
}

fn revalidation_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.into()
}
