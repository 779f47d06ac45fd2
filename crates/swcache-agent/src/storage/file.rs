//! File-backed cache storage.
//!
//! Each named cache is one JSON document in the storage directory. The file
//! name is the URL-safe base64 of the cache name, so any cache name maps to a
//! valid file name. Writes go to a temporary file that is renamed over the
//! previous document, so readers never see a partial cache.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::memory::NamedCache;
use super::CacheStorage;
use crate::types::{RequestKey, StoredResponse};
use crate::{AgentError, Result};

const EXTENSION: &str = "json";

#[derive(Serialize, Deserialize)]
struct CacheFile {
    name: String,
    entries: Vec<FileEntry>,
}

#[derive(Serialize, Deserialize)]
struct FileEntry {
    key: RequestKey,
    response: StoredResponse,
}

/// Cache storage persisted under a directory.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    // Serializes read-modify-write cycles on cache files.
    lock: Mutex<()>,
}

impl FileStorage {
    /// Open storage rooted at `dir`, creating the directory if needed.
    pub async fn open_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "File storage ready");
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    /// Storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{EXTENSION}", URL_SAFE_NO_PAD.encode(name)))
    }

    async fn load(&self, name: &str) -> Result<Option<NamedCache>> {
        let raw = match fs::read(self.path_for(name)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: CacheFile = serde_json::from_slice(&raw)?;
        if file.name != name {
            return Err(AgentError::Storage(format!(
                "cache file for {name:?} names {:?}",
                file.name
            )));
        }

        Ok(Some(
            file.entries
                .into_iter()
                .map(|e| (e.key, e.response))
                .collect(),
        ))
    }

    async fn save(&self, name: &str, cache: NamedCache) -> Result<()> {
        let mut entries: Vec<FileEntry> = cache
            .into_entries()
            .map(|(key, response)| FileEntry { key, response })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let file = CacheFile {
            name: name.to_string(),
            entries,
        };
        let json = serde_json::to_vec_pretty(&file)?;

        let path = self.path_for(name);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for FileStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        if self.load(name).await?.is_none() {
            self.save(name, NamedCache::default()).await?;
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(fs::try_exists(self.path_for(name)).await?)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let decoded = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| URL_SAFE_NO_PAD.decode(s).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok());
            match decoded {
                Some(name) => names.push(name),
                None => warn!(path = %path.display(), "Skipping unrecognized cache file"),
            }
        }

        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        match fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn match_entry(&self, name: &str, key: &RequestKey) -> Result<Option<StoredResponse>> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load(name)
            .await?
            .and_then(|cache| cache.match_request(key).cloned()))
    }

    async fn put(&self, name: &str, key: RequestKey, response: StoredResponse) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let Some(mut cache) = self.load(name).await? else {
            return Ok(false);
        };
        cache.put(key, response);
        self.save(name, cache).await?;
        Ok(true)
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load(name)
            .await?
            .map(|cache| cache.keys())
            .unwrap_or_default())
    }
}
