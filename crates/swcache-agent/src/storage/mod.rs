//! Named cache stores.
//!
//! A [`CacheStorage`] is the registry of every named cache the agent owns.
//! Each named cache maps [`RequestKey`] to [`StoredResponse`]; entries are
//! replaced wholesale, never edited.

use async_trait::async_trait;

use crate::types::{RequestKey, StoredResponse};
use crate::Result;

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Registry of named caches.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a cache, creating it empty if absent. The only operation that
    /// creates a cache.
    async fn open(&self, name: &str) -> Result<()>;

    /// Check if a cache exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Names of all caches.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Delete a cache and all of its entries. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Look up an entry in one cache.
    async fn match_entry(&self, name: &str, key: &RequestKey) -> Result<Option<StoredResponse>>;

    /// Store an entry in an existing cache, replacing any previous snapshot.
    /// Returns `false` and stores nothing if the cache does not exist.
    async fn put(&self, name: &str, key: RequestKey, response: StoredResponse) -> Result<bool>;

    /// Keys stored in a cache, sorted. Empty if the cache does not exist.
    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>>;
}
