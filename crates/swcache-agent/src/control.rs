//! Control channel between the host page and the agent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Message sent by the host page.
///
/// Wire form is `{"type": "SKIP_WAITING"}` or `{"type": "GET_VERSION"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate the installed version without waiting for clients to close.
    SkipWaiting,
    /// Ask for the current cache version.
    GetVersion,
}

impl ControlMessage {
    /// Parse a message from JSON.
    ///
    /// Malformed JSON is an error. Well-formed messages with an unknown or
    /// missing `type` yield `None` so the agent can ignore them.
    pub fn parse(json: &str) -> Result<Option<Self>> {
        let value: Value = serde_json::from_str(json)?;
        Ok(serde_json::from_value(value).ok())
    }
}

/// Reply to [`ControlMessage::GetVersion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlReply {
    pub version: String,
}
