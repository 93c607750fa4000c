//! panel/exportSettings and panel/importSettings

use super::parse_payload;
use crate::context::RouterContext;
use serde_json::{json, Value};
use tracing::info;
use warden_core::{Result, SenderContext};
use warden_settings::{export, import, ExportPayload};

pub fn export_settings(
    ctx: &RouterContext,
    _payload: Option<Value>,
    _sender: &SenderContext,
) -> Result<Value> {
    let payload = export(ctx.store())?;
    Ok(serde_json::to_value(payload)?)
}

/// An invalid payload or hash leaves the store untouched and produces an
/// error reply.
pub fn import_settings(
    ctx: &RouterContext,
    payload: Option<Value>,
    _sender: &SenderContext,
) -> Result<Value> {
    let payload: ExportPayload = parse_payload(payload)?;
    let imported = import(ctx.store(), &payload)?;
    info!(imported, "settings imported");
    Ok(json!({ "imported": imported }))
}
