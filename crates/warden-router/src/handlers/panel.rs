//! panel/* handlers

use super::parse_payload;
use crate::context::RouterContext;
use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};
use warden_core::{ModuleId, Result, SenderContext, SettingKey, SettingValue};
use warden_modules::ModuleAction;

// ---------------------------------------------------------------------------
// getPanelData - everything the panel renders, in one reply
// ---------------------------------------------------------------------------

pub fn get_panel_data(
    ctx: Arc<RouterContext>,
    _payload: Option<Value>,
    sender: SenderContext,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let stats = match ctx.orchestrator.registry().get(ModuleId::AntiTracking) {
            Some(module) if module.is_enabled() => {
                module.is_ready().await?;
                module
                    .action(ModuleAction::AggregatedStats { tab_id: sender.tab_id })
                    .await?
            }
            _ => Value::Null,
        };

        let settings: BTreeMap<String, Value> = ctx
            .store()
            .watched_snapshot()
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_json()))
            .collect();
        let tab = sender.tab_id.and_then(|tab_id| ctx.activity.summary(tab_id));

        Ok(json!({
            "modules": module_states(&ctx),
            "settings": settings,
            "pipeline": ctx.pipeline.status(),
            "tab": tab,
            "antitracking": stats,
        }))
    })
}

// ---------------------------------------------------------------------------
// setPanelData - write several settings, all or nothing
// ---------------------------------------------------------------------------

pub fn set_panel_data(
    ctx: &RouterContext,
    payload: Option<Value>,
    _sender: &SenderContext,
) -> Result<Value> {
    let entries: Map<String, Value> = parse_payload(payload)?;

    let mut staged = Vec::with_capacity(entries.len());
    for (name, raw) in entries {
        let key = SettingKey::from_str(&name)?;
        let value = SettingValue::from_json(raw);
        key.validate(&value)?;
        staged.push((key, value));
    }

    let updated = staged.len();
    for (key, value) in staged {
        debug!(key = %key, "panel setting");
        ctx.store().set(key, value)?;
    }
    info!(updated, "panel settings written");
    Ok(json!({ "updated": updated }))
}

// ---------------------------------------------------------------------------
// getModuleStates
// ---------------------------------------------------------------------------

pub fn get_module_states(
    ctx: &RouterContext,
    _payload: Option<Value>,
    _sender: &SenderContext,
) -> Result<Value> {
    Ok(module_states(ctx))
}

fn module_states(ctx: &RouterContext) -> Value {
    let states: BTreeMap<&str, _> = ctx
        .orchestrator
        .states()
        .into_iter()
        .map(|(id, state)| (id.as_str(), state))
        .collect();
    json!(states)
}
