//! Install-time precaching of the manifest.

use std::sync::Arc;

use futures::future::join_all;
use swcache_common::{retry_with_backoff, RetryConfig};
use swcache_net::{Fetcher, NetError, Request};
use tracing::{debug, info, warn};
use url::Url;

use crate::storage::CacheStorage;
use crate::types::{CacheVersion, RequestKey, StoredResponse};
use crate::{AgentError, Result};

/// Result of a successful precache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecacheReport {
    pub version: CacheVersion,
    /// Number of manifest entries stored.
    pub stored: usize,
}

/// Fetches the manifest into the cache for a version.
pub struct PrecachePopulator {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    retry: RetryConfig,
}

impl PrecachePopulator {
    pub fn new(storage: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>, retry: RetryConfig) -> Self {
        Self {
            storage,
            fetcher,
            retry,
        }
    }

    /// Open the cache for `version` and store every manifest entry.
    ///
    /// Entries are fetched concurrently. If any entry fails, the whole
    /// populate fails with [`AgentError::Precache`]; entries that did succeed
    /// stay in the cache and a later populate simply overwrites them.
    pub async fn populate(&self, manifest: &[Url], version: &CacheVersion) -> Result<PrecacheReport> {
        info!(%version, entries = manifest.len(), "Caching manifest");
        self.storage.open(version.as_str()).await?;

        let results = join_all(manifest.iter().map(|url| self.cache_entry(url, version))).await;

        let mut stored = 0;
        let mut failed = Vec::new();
        for (url, result) in manifest.iter().zip(results) {
            match result {
                Ok(()) => stored += 1,
                Err(e) => {
                    warn!(%url, error = %e, "Precache entry failed");
                    failed.push(format!("{url}: {e}"));
                }
            }
        }

        if !failed.is_empty() {
            return Err(AgentError::Precache {
                version: version.clone(),
                failed,
            });
        }

        Ok(PrecacheReport {
            version: version.clone(),
            stored,
        })
    }

    async fn cache_entry(&self, url: &Url, version: &CacheVersion) -> Result<()> {
        let request = Request::get(url.clone());
        let fetcher = &self.fetcher;
        let request_ref = &request;

        let response = retry_with_backoff(&self.retry, || async move {
            let response = fetcher.fetch(request_ref).await?;
            if !response.ok() {
                return Err(AgentError::Network(NetError::RequestFailed(format!(
                    "status {}",
                    response.status
                ))));
            }
            Ok::<_, AgentError>(response)
        })
        .await?;

        let stored = self
            .storage
            .put(
                version.as_str(),
                RequestKey::get(url),
                StoredResponse::snapshot(&response),
            )
            .await?;
        if !stored {
            return Err(AgentError::Storage(format!(
                "cache {version} was deleted during install"
            )));
        }

        debug!(%url, status = %response.status, "Precached");
        Ok(())
    }
}
