//! Install → activate → ready orchestration and platform event entry points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use swcache_net::{Fetcher, Request};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::clients::{Client, ClientMatchOptions, Clients};
use crate::config::AgentConfig;
use crate::control::{ControlMessage, ControlReply};
use crate::gc::CacheGarbageCollector;
use crate::notification::{NotificationConfig, NotificationRequest};
use crate::precache::PrecachePopulator;
use crate::router::{RequestRouter, TrustedHosts};
use crate::storage::CacheStorage;
use crate::strategy::{Resolution, ResolutionStrategy};
use crate::types::CacheVersion;
use crate::{AgentError, Result};

/// Tag of the background sync registration the app uses.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

/// Agent lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AgentState {
    /// Created, install not started.
    #[default]
    Parsed,
    /// Precaching the manifest.
    Installing,
    /// Installed, waiting for activation.
    Installed,
    /// Collecting old caches and claiming clients.
    Activating,
    /// Ready: handling fetches for its clients.
    Activated,
}

/// Events emitted for the host.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// State changed.
    StateChange {
        version: CacheVersion,
        state: AgentState,
    },
    /// A superseded cache was deleted.
    CacheDeleted { name: String },
    /// A client is now controlled by this version.
    ControllerChange { client_id: String },
    /// The host should display a notification.
    ShowNotification(NotificationRequest),
    /// The host should open a window.
    OpenWindow { client_id: String, url: Url },
}

/// What happened during install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Entries stored, when the precache succeeded.
    pub stored: Option<usize>,
    /// Entries that failed to precache.
    pub failed: Vec<String>,
    /// Whether install went straight on to activation.
    pub activated: bool,
}

/// What happened during activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    /// Old caches deleted.
    pub deleted: Vec<String>,
    /// Clients that switched to this version.
    pub claimed: Vec<String>,
}

/// Result of the fetch hook.
#[derive(Debug, Clone)]
pub enum FetchDisposition {
    /// Not handled; the platform performs its default fetch.
    Passthrough,
    /// Handled by the agent.
    Respond(Resolution),
}

/// Orchestrates the agent and exposes one method per platform event.
pub struct LifecycleController {
    version: CacheVersion,
    manifest: Vec<Url>,
    root: Url,
    state: RwLock<AgentState>,
    skip_waiting: AtomicBool,
    // Held across a whole install or activation so transitions never interleave.
    transition: Mutex<()>,
    precache: PrecachePopulator,
    gc: CacheGarbageCollector,
    router: RequestRouter,
    strategy: ResolutionStrategy,
    clients: RwLock<Clients>,
    notification: NotificationConfig,
    event_tx: mpsc::UnboundedSender<AgentEvent>,
}

impl LifecycleController {
    /// Build a controller from config, with injected storage and network.
    pub fn new(
        config: &AgentConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<AgentEvent>)> {
        config.validate()?;

        let version = config.version();
        let scope = config.scope_url()?;
        let root = scope.join("/")?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let controller = Self {
            manifest: config.manifest_urls()?,
            root,
            state: RwLock::new(AgentState::Parsed),
            skip_waiting: AtomicBool::new(false),
            transition: Mutex::new(()),
            precache: PrecachePopulator::new(
                Arc::clone(&storage),
                Arc::clone(&fetcher),
                config.precache_retry.clone(),
            ),
            gc: CacheGarbageCollector::new(Arc::clone(&storage)),
            router: RequestRouter::new(&scope, TrustedHosts::new(&config.trusted_hosts)),
            strategy: ResolutionStrategy::new(
                storage,
                fetcher,
                version.clone(),
                &config.revalidate_urls()?,
            ),
            clients: RwLock::new(Clients::new()),
            notification: config.notification.clone(),
            event_tx,
            version,
        };

        Ok((controller, event_rx))
    }

    /// Current cache version.
    pub fn version(&self) -> &CacheVersion {
        &self.version
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> AgentState {
        *self.state.read().await
    }

    async fn set_state(&self, state: AgentState) {
        *self.state.write().await = state;
        info!(version = %self.version, ?state, "Agent state changed");
        let _ = self.event_tx.send(AgentEvent::StateChange {
            version: self.version.clone(),
            state,
        });
    }

    // ==================== Install ====================

    /// Install event: precache the manifest.
    ///
    /// A precache failure is logged and install still completes, but the
    /// agent then waits for activation instead of skipping the wait. Install
    /// may be repeated while waiting to retry a failed precache.
    pub async fn install(&self) -> Result<InstallReport> {
        let guard = self.transition.lock().await;

        let state = self.state().await;
        if !matches!(state, AgentState::Parsed | AgentState::Installed) {
            return Err(AgentError::State(format!("cannot install while {state:?}")));
        }

        info!(version = %self.version, "Installing");
        self.set_state(AgentState::Installing).await;

        let mut report = InstallReport {
            stored: None,
            failed: Vec::new(),
            activated: false,
        };

        match self.precache.populate(&self.manifest, &self.version).await {
            Ok(precache) => {
                info!(version = %self.version, stored = precache.stored, "Installation complete");
                report.stored = Some(precache.stored);
                self.skip_waiting.store(true, Ordering::SeqCst);
            }
            Err(AgentError::Precache { failed, .. }) => {
                error!(version = %self.version, failed = failed.len(), "Installation failed to precache");
                report.failed = failed;
            }
            Err(e) => {
                error!(version = %self.version, error = %e, "Installation failed");
                report.failed = vec![e.to_string()];
            }
        }

        self.set_state(AgentState::Installed).await;
        drop(guard);

        if self.skip_waiting.load(Ordering::SeqCst) || !self.has_foreign_clients().await {
            self.activate().await?;
            report.activated = true;
        }

        Ok(report)
    }

    /// Force activation without waiting for existing clients to close.
    ///
    /// Safe at any time: before install finishes the request is remembered,
    /// once active it is a no-op.
    pub async fn skip_waiting(&self) -> Result<()> {
        self.skip_waiting.store(true, Ordering::SeqCst);
        if self.state().await == AgentState::Installed {
            self.activate().await?;
        }
        Ok(())
    }

    // ==================== Activate ====================

    /// Activate event: drop old caches, then claim every client.
    pub async fn activate(&self) -> Result<ActivateReport> {
        let _guard = self.transition.lock().await;

        match self.state().await {
            AgentState::Installed => {}
            AgentState::Activated => return Ok(ActivateReport::default()),
            state => {
                return Err(AgentError::State(format!("cannot activate while {state:?}")));
            }
        }

        info!(version = %self.version, "Activating");
        self.set_state(AgentState::Activating).await;

        let mut report = ActivateReport::default();
        match self.gc.collect(&self.version).await {
            Ok(gc) => {
                for name in &gc.deleted {
                    let _ = self.event_tx.send(AgentEvent::CacheDeleted { name: name.clone() });
                }
                report.deleted = gc.deleted;
            }
            Err(e) => error!(error = %e, "Could not list caches, old caches kept"),
        }

        report.claimed = self.clients.write().await.claim(&self.version);
        for client_id in &report.claimed {
            let _ = self.event_tx.send(AgentEvent::ControllerChange {
                client_id: client_id.clone(),
            });
        }

        self.set_state(AgentState::Activated).await;
        info!(
            version = %self.version,
            deleted = report.deleted.len(),
            claimed = report.claimed.len(),
            "Activation complete"
        );
        Ok(report)
    }

    // ==================== Clients ====================

    /// A page opened.
    pub async fn client_opened(&self, url: Url) -> Client {
        let mut client = Client::window(url);
        if self.state().await == AgentState::Activated {
            client.controller = Some(self.version.clone());
        }
        self.clients.write().await.add(client.clone());
        client
    }

    /// A page closed. When the agent is waiting and no page remains under an
    /// older version, it activates.
    pub async fn client_closed(&self, id: &str) -> Result<Option<Client>> {
        let removed = self.clients.write().await.remove(id);
        if self.state().await == AgentState::Installed && !self.has_foreign_clients().await {
            self.activate().await?;
        }
        Ok(removed)
    }

    /// Clients controlled by this version.
    pub async fn controlled_clients(&self) -> Vec<Client> {
        self.clients
            .read()
            .await
            .match_all(ClientMatchOptions::default(), &self.version)
            .into_iter()
            .cloned()
            .collect()
    }

    // Pages still served by an older version.
    async fn has_foreign_clients(&self) -> bool {
        self.clients
            .read()
            .await
            .match_all(ClientMatchOptions::all(), &self.version)
            .iter()
            .any(|c| c.controller.as_ref().is_some_and(|v| v != &self.version))
    }

    /// Register a page that an older version of the agent controls.
    pub async fn adopt_client(&self, url: Url, controller: CacheVersion) -> Client {
        let mut client = Client::window(url);
        client.controller = Some(controller);
        self.clients.write().await.add(client.clone());
        client
    }

    // ==================== Fetch ====================

    /// Fetch event. Requests are only intercepted once the agent is active.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchDisposition> {
        if self.state().await != AgentState::Activated {
            debug!(url = %request.url, "Agent not active, passing through");
            return Ok(FetchDisposition::Passthrough);
        }

        if !self.router.classify(request).is_eligible() {
            return Ok(FetchDisposition::Passthrough);
        }

        self.strategy
            .resolve(request)
            .await
            .map(FetchDisposition::Respond)
    }

    /// Wait for background cache refreshes started by fetches.
    pub async fn settle(&self) -> usize {
        self.strategy.settle().await
    }

    // ==================== Message ====================

    /// Message event from the control channel.
    pub async fn handle_message(
        &self,
        message: ControlMessage,
        reply: Option<oneshot::Sender<ControlReply>>,
    ) -> Result<()> {
        debug!(?message, "Received message");
        match message {
            ControlMessage::SkipWaiting => self.skip_waiting().await,
            ControlMessage::GetVersion => {
                let Some(reply) = reply else {
                    warn!("GET_VERSION without a reply port");
                    return Ok(());
                };
                let _ = reply.send(ControlReply {
                    version: self.version.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Message event carrying raw JSON. Unknown message types are ignored.
    pub async fn handle_message_json(
        &self,
        json: &str,
        reply: Option<oneshot::Sender<ControlReply>>,
    ) -> Result<()> {
        match ControlMessage::parse(json)? {
            Some(message) => self.handle_message(message, reply).await,
            None => {
                debug!(json, "Ignoring unknown message");
                Ok(())
            }
        }
    }

    // ==================== Pass-through hooks ====================

    /// Notification click: open a window at the root path.
    pub async fn handle_notification_click(&self) -> Client {
        info!("Notification click");
        let client = self.clients.write().await.open_window(self.root.clone());
        let _ = self.event_tx.send(AgentEvent::OpenWindow {
            client_id: client.id.clone(),
            url: client.url.clone(),
        });
        client
    }

    /// Push event: ask the host to show a notification.
    pub fn handle_push(&self, payload: Option<&str>) -> NotificationRequest {
        info!("Push received");
        let request = NotificationRequest::from_push(&self.notification, payload);
        let _ = self
            .event_tx
            .send(AgentEvent::ShowNotification(request.clone()));
        request
    }

    /// Background sync event. Returns whether the tag is one the agent
    /// knows; there is no queued work to replay.
    pub fn handle_sync(&self, tag: &str) -> bool {
        info!(tag, "Background sync");
        tag == BACKGROUND_SYNC_TAG
    }
}
