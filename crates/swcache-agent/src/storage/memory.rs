//! In-memory cache storage.

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::RwLock;

use super::CacheStorage;
use crate::types::{RequestKey, StoredResponse};
use crate::Result;

/// A single named cache.
#[derive(Debug, Default, Clone)]
pub(crate) struct NamedCache {
    entries: HashMap<RequestKey, StoredResponse>,
}

impl NamedCache {
    pub(crate) fn match_request(&self, key: &RequestKey) -> Option<&StoredResponse> {
        self.entries.get(key)
    }

    pub(crate) fn put(&mut self, key: RequestKey, response: StoredResponse) {
        self.entries.insert(key, response);
    }

    pub(crate) fn keys(&self) -> Vec<RequestKey> {
        let mut keys: Vec<RequestKey> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub(crate) fn into_entries(self) -> impl Iterator<Item = (RequestKey, StoredResponse)> {
        self.entries.into_iter()
    }
}

impl FromIterator<(RequestKey, StoredResponse)> for NamedCache {
    fn from_iter<I: IntoIterator<Item = (RequestKey, StoredResponse)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Cache storage held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    caches: RwLock<HashMap<String, NamedCache>>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.caches.read().await.contains_key(name))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn match_entry(&self, name: &str, key: &RequestKey) -> Result<Option<StoredResponse>> {
        let caches = self.caches.read().await;
        Ok(caches
            .get(name)
            .and_then(|cache| cache.match_request(key))
            .cloned())
    }

    async fn put(&self, name: &str, key: RequestKey, response: StoredResponse) -> Result<bool> {
        match self.caches.write().await.get_mut(name) {
            Some(cache) => {
                cache.put(key, response);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>> {
        Ok(self
            .caches
            .read()
            .await
            .get(name)
            .map(NamedCache::keys)
            .unwrap_or_default())
    }
}
