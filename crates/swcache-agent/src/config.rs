//! Agent configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use swcache_common::{LogConfig, ResultExt, RetryConfig};
use url::Url;

use crate::notification::NotificationConfig;
use crate::types::CacheVersion;
use crate::{AgentError, Result};

/// Agent configuration, usually loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Current cache generation. Changing it purges older caches on activate.
    pub cache_version: String,

    /// Base URL of the application. Its origin is the agent's own origin and
    /// relative manifest entries resolve against it.
    pub scope: String,

    /// Resources fetched at install time, in order.
    pub manifest: Vec<String>,

    /// Cross-origin hosts whose requests are handled (exact host match).
    pub trusted_hosts: Vec<String>,

    /// Mutable data resources served stale-while-revalidate.
    pub revalidate: Vec<String>,

    /// Retry policy for each precache fetch.
    pub precache_retry: RetryConfig,

    /// Defaults for push notifications.
    pub notification: NotificationConfig,

    /// Directory for persisted caches.
    pub storage_dir: Option<PathBuf>,

    /// Logging settings.
    pub log: LogConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cache_version: "app-v1".to_string(),
            scope: "http://localhost:8080/".to_string(),
            manifest: vec![
                "./".to_string(),
                "./index.html".to_string(),
                "./products.json".to_string(),
                "./manifest.json".to_string(),
                "./icon-192.png".to_string(),
                "./icon-512.png".to_string(),
                "https://unpkg.com/vue@3/dist/vue.global.js".to_string(),
            ],
            trusted_hosts: vec!["unpkg.com".to_string()],
            revalidate: vec!["./products.json".to_string()],
            precache_retry: RetryConfig::none(),
            notification: NotificationConfig::default(),
            storage_dir: None,
            log: LogConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .context(format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .context(format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every URL resolves and the version is usable.
    pub fn validate(&self) -> Result<()> {
        if self.cache_version.trim().is_empty() {
            return Err(AgentError::Config("cache_version must not be empty".into()));
        }
        self.scope_url()?;
        self.manifest_urls()?;
        self.revalidate_urls()?;
        Ok(())
    }

    /// Current cache version.
    pub fn version(&self) -> CacheVersion {
        CacheVersion::new(self.cache_version.clone())
    }

    /// Parsed scope. Must be an absolute http(s) URL.
    pub fn scope_url(&self) -> Result<Url> {
        let scope = Url::parse(&self.scope)
            .map_err(|e| AgentError::Config(format!("scope {:?}: {e}", self.scope)))?;
        match scope.scheme() {
            "http" | "https" => Ok(scope),
            other => Err(AgentError::Config(format!(
                "scope must be http(s), got {other}"
            ))),
        }
    }

    /// Resolve a manifest-style identifier against the scope.
    pub fn resolve(&self, entry: &str) -> Result<Url> {
        let scope = self.scope_url()?;
        scope
            .join(entry)
            .map_err(|e| AgentError::Config(format!("entry {entry:?}: {e}")))
    }

    /// Manifest entries as absolute URLs, in manifest order.
    pub fn manifest_urls(&self) -> Result<Vec<Url>> {
        self.manifest.iter().map(|e| self.resolve(e)).collect()
    }

    /// Stale-while-revalidate resources as absolute URLs.
    pub fn revalidate_urls(&self) -> Result<Vec<Url>> {
        self.revalidate.iter().map(|e| self.resolve(e)).collect()
    }

    /// Storage directory, falling back to the platform cache directory.
    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("swcache")
        })
    }
}
