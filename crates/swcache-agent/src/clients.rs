//! Pages the agent can control.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use url::Url;

use crate::types::CacheVersion;

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
}

/// Filter for [`Clients::match_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientMatchOptions {
    /// Also match clients this agent does not control.
    pub include_uncontrolled: bool,
    /// Only match this type; `None` matches every type.
    pub client_type: Option<ClientType>,
}

impl ClientMatchOptions {
    /// Every client, controlled or not.
    pub fn all() -> Self {
        Self {
            include_uncontrolled: true,
            client_type: None,
        }
    }
}

/// A client (open page or worker).
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Client type.
    pub client_type: ClientType,

    /// Whether focused.
    pub focused: bool,

    /// Cache version of the agent controlling this client, if any.
    pub controller: Option<CacheVersion>,
}

impl Client {
    /// Create an uncontrolled window client.
    pub fn window(url: Url) -> Self {
        Self {
            id: next_client_id(),
            url,
            client_type: ClientType::Window,
            focused: false,
            controller: None,
        }
    }
}

/// Registry of known clients.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Match clients against `options`. Controlled means controlled by
    /// `version`.
    pub fn match_all(&self, options: ClientMatchOptions, version: &CacheVersion) -> Vec<&Client> {
        self.clients
            .values()
            .filter(|c| options.include_uncontrolled || c.controller.as_ref() == Some(version))
            .filter(|c| options.client_type.map_or(true, |t| c.client_type == t))
            .collect()
    }

    /// Open a focused, uncontrolled window at `url`.
    pub fn open_window(&mut self, url: Url) -> Client {
        let mut client = Client::window(url);
        client.focused = true;
        self.clients.insert(client.id.clone(), client.clone());
        client
    }

    /// Make `version` the controller of every client. Returns the IDs whose
    /// controller changed.
    pub fn claim(&mut self, version: &CacheVersion) -> Vec<String> {
        let mut changed: Vec<String> = self
            .clients
            .values_mut()
            .filter(|c| c.controller.as_ref() != Some(version))
            .map(|c| {
                c.controller = Some(version.clone());
                c.id.clone()
            })
            .collect();
        changed.sort();
        changed
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
