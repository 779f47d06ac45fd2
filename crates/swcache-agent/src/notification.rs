//! Push notification pass-through.
//!
//! The payload belongs to the push sender; the agent only fills in defaults
//! and hands the request to the host for display.

use serde::{Deserialize, Serialize};

/// A button shown on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Notification defaults from config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub title: String,
    /// Body used when a push carries no payload.
    pub default_body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "App update".to_string(),
            default_body: "New data is available".to_string(),
            icon: "./icon-192.png".to_string(),
            badge: "./icon-72.png".to_string(),
            tag: "app-update".to_string(),
            require_interaction: true,
            actions: vec![
                NotificationAction {
                    action: "view".to_string(),
                    title: "View update".to_string(),
                },
                NotificationAction {
                    action: "dismiss".to_string(),
                    title: "Later".to_string(),
                },
            ],
        }
    }
}

/// A notification the host should display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
}

impl NotificationRequest {
    /// Build a notification for a push event.
    pub fn from_push(config: &NotificationConfig, payload: Option<&str>) -> Self {
        let body = payload
            .filter(|text| !text.is_empty())
            .unwrap_or(&config.default_body)
            .to_string();

        Self {
            title: config.title.clone(),
            body,
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            tag: config.tag.clone(),
            require_interaction: config.require_interaction,
            actions: config.actions.clone(),
        }
    }
}
