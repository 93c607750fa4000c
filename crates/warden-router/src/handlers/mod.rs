//! Route handlers, one module per origin

pub mod click_to_play;
pub mod page_overlay;
pub mod panel;
pub mod settings_io;
pub mod universal;

use serde::de::DeserializeOwned;
use serde_json::Value;
use warden_core::{Error, Result};

/// Decode a handler payload. A missing payload decodes as `null`.
pub(crate) fn parse_payload<T: DeserializeOwned>(payload: Option<Value>) -> Result<T> {
    serde_json::from_value(payload.unwrap_or(Value::Null))
        .map_err(|e| Error::InvalidMessage(e.to_string()))
}
