//! Removal of superseded cache generations.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info};

use crate::storage::CacheStorage;
use crate::types::CacheVersion;
use crate::Result;

/// Outcome of one collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Caches that were deleted.
    pub deleted: Vec<String>,
    /// Caches whose deletion failed, with the reason. Retried next activation.
    pub failed: Vec<(String, String)>,
}

/// Deletes every cache that is not the current version.
pub struct CacheGarbageCollector {
    storage: Arc<dyn CacheStorage>,
}

impl CacheGarbageCollector {
    pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
        Self { storage }
    }

    /// Delete all caches except `current`.
    ///
    /// Only listing the caches can fail; individual deletion failures are
    /// logged and reported, never propagated.
    pub async fn collect(&self, current: &CacheVersion) -> Result<GcReport> {
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != current.as_str())
            .collect();

        let results = join_all(stale.iter().map(|name| async move {
            info!(cache = %name, "Deleting old cache");
            self.storage.delete(name).await
        }))
        .await;

        let mut report = GcReport::default();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => report.deleted.push(name),
                Err(e) => {
                    error!(cache = %name, error = %e, "Failed to delete old cache");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}
