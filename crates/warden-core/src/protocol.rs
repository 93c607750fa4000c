//! Inbound message protocol between front-end surfaces and the background
//!
//! Wire format:
//!
//! Front-end → background:
//!   { "origin": "click_to_play", "name": "processC2P", "message": { "action": "once", "app_ids": [1, 2] }, "messageId": "m-7" }
//!
//! Background → front-end (direct reply):
//!   { "type": "ok", "data": { ... } }
//!   { "type": "error", "data": "import failed: ..." }
//!
//! Background → front-end (follow-up, legacy platforms):
//!   { "destination": { "tab": 12 }, "name": "processC2P", "messageId": "m-7", "reply": { "type": "ok", "data": ... } }

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Front-end → background
// ---------------------------------------------------------------------------

/// A message sent by one of the front-end surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl InboundMessage {
    pub fn new(origin: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            origin: origin.map(String::from),
            name: name.into(),
            message: None,
            message_id: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.message = Some(payload);
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }
}

/// Where a message came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderContext {
    #[serde(default)]
    pub tab_id: Option<i64>,
    #[serde(default)]
    pub tab_url: Option<String>,
    /// Sender is a non-primary concurrent instance of the host.
    #[serde(default)]
    pub secondary_instance: bool,
}

impl SenderContext {
    pub fn tab(tab_id: i64, tab_url: impl Into<String>) -> Self {
        Self {
            tab_id: Some(tab_id),
            tab_url: Some(tab_url.into()),
            secondary_instance: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Background → front-end
// ---------------------------------------------------------------------------

/// Result delivered back to a sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Reply {
    Ok(Value),
    Error(String),
}

impl Reply {
    pub fn ok(value: Value) -> Self {
        Self::Ok(value)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Ok(v) => Some(v),
            Self::Error(_) => None,
        }
    }
}

/// Follow-up destination when a direct callback cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Tab(i64),
    Panel,
}

/// A reply re-addressed as an explicit message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUp {
    pub destination: Destination,
    pub name: String,
    pub message_id: String,
    pub reply: Reply,
}
