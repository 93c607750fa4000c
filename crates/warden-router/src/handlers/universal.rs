//! Handlers reachable from any origin

use super::parse_payload;
use crate::context::RouterContext;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use warden_core::{Error, ModuleId, Result, SenderContext};

pub fn ping(_ctx: &RouterContext, _payload: Option<Value>, _sender: &SenderContext) -> Result<Value> {
    Ok(Value::String("pong".into()))
}

#[derive(Debug, Deserialize)]
struct ModuleToggle {
    module: String,
    enabled: bool,
}

/// Write a module's enablement setting. The transition itself follows from
/// the change event.
pub fn set_module_enabled(
    ctx: &RouterContext,
    payload: Option<Value>,
    _sender: &SenderContext,
) -> Result<Value> {
    let toggle: ModuleToggle = parse_payload(payload)?;
    let id = ModuleId::from_str(&toggle.module)?;
    ctx.store().set(id.setting(), toggle.enabled)?;
    Ok(json!({ "module": id, "enabled": toggle.enabled }))
}

pub fn get_pipeline_status(
    ctx: &RouterContext,
    _payload: Option<Value>,
    _sender: &SenderContext,
) -> Result<Value> {
    Ok(serde_json::to_value(ctx.pipeline.status())?)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClosedTab {
    tab_id: Option<i64>,
}

/// Release per-tab state of `tab_id`, or of the sender's tab.
pub fn tab_closed(ctx: &RouterContext, payload: Option<Value>, sender: &SenderContext) -> Result<Value> {
    let closed: ClosedTab = match payload {
        Some(Value::Null) | None => ClosedTab::default(),
        Some(v) => parse_payload(Some(v))?,
    };
    let tab_id = closed
        .tab_id
        .or(sender.tab_id)
        .ok_or_else(|| Error::InvalidMessage("no tab to close".into()))?;
    let released = ctx.activity.close_tab(tab_id);
    Ok(json!({ "tab_id": tab_id, "released": released }))
}
