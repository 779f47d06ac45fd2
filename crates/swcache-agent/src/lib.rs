//! # swcache Agent
//!
//! Offline caching agent for a single-page application.
//!
//! ## Features
//!
//! - **Precache**: fetch a fixed manifest into a versioned cache on install
//! - **Garbage collection**: drop every cache whose version is not current
//! - **Routing**: only same-origin and trusted-host GET requests are handled
//! - **Resolution**: cache-first with network fallback, stale-while-revalidate
//!   for designated data files, offline document for failed navigations
//! - **Lifecycle**: install → activate → ready, with a control channel for
//!   `SKIP_WAITING` and `GET_VERSION`
//!
//! ## Architecture
//!
//! ```text
//! LifecycleController
//!     ├── PrecachePopulator ──┐
//!     ├── CacheGarbageCollector
//!     ├── RequestRouter       ├── CacheStorage (caches)
//!     │     └── ResolutionStrategy ┘    └── NamedCache
//!     │              └── Fetcher (network)        └── RequestKey → StoredResponse
//!     └── Clients
//! ```
//!
//! Platform events (install, activate, fetch, message, push, notification
//! click, sync) are plain async methods on [`LifecycleController`]; the host
//! shim is the only code that talks to a real event loop.

use swcache_common::CommonError;
use swcache_net::NetError;
use thiserror::Error;

pub mod clients;
pub mod config;
pub mod control;
pub mod gc;
pub mod lifecycle;
pub mod notification;
pub mod offline;
pub mod precache;
pub mod router;
pub mod storage;
pub mod strategy;
pub mod types;

pub use clients::{Client, ClientMatchOptions, ClientType, Clients};
pub use config::AgentConfig;
pub use control::{ControlMessage, ControlReply};
pub use gc::{CacheGarbageCollector, GcReport};
pub use lifecycle::{
    ActivateReport, AgentEvent, AgentState, FetchDisposition, InstallReport, LifecycleController,
};
pub use notification::{NotificationAction, NotificationConfig, NotificationRequest};
pub use precache::{PrecachePopulator, PrecacheReport};
pub use router::{RequestClassification, RequestRouter, TrustedHosts};
pub use storage::{CacheStorage, FileStorage, MemoryStorage};
pub use strategy::{Outcome, Resolution, ResolutionStrategy};
pub use types::{CacheVersion, RequestKey, StoredResponse};

/// Errors that can occur in agent operations.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Precache of {version} failed for {} entries", .failed.len())]
    Precache {
        version: CacheVersion,
        failed: Vec<String>,
    },

    #[error("State error: {0}")]
    State(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
