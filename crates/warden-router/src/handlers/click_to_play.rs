//! click_to_play/processC2P
//!
//! `always` adds the apps to the persistent click-to-play allowlist, `once`
//! allows them in the sender's tab only. The tab is reloaded either way so the
//! page picks the change up.

use super::parse_payload;
use crate::context::RouterContext;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;
use warden_core::{Error, Result, SenderContext, SettingKey};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum C2PAction {
    Always,
    Once,
}

#[derive(Debug, Deserialize)]
struct C2PRequest {
    action: C2PAction,
    #[serde(default)]
    app_ids: Vec<u64>,
}

pub fn process_c2p(
    ctx: Arc<RouterContext>,
    payload: Option<Value>,
    sender: SenderContext,
) -> BoxFuture<'static, Result<Value>> {
    Box::pin(async move {
        let request: C2PRequest = parse_payload(payload)?;

        match request.action {
            C2PAction::Always => {
                let mut allowed: BTreeSet<u64> = ctx
                    .store()
                    .get(SettingKey::ClickToPlayAllowlist)
                    .as_record()
                    .and_then(Value::as_array)
                    .map(|ids| ids.iter().filter_map(Value::as_u64).collect())
                    .unwrap_or_default();
                allowed.extend(request.app_ids.iter().copied());
                ctx.store().set(SettingKey::ClickToPlayAllowlist, json!(allowed))?;
            }
            C2PAction::Once => {
                let tab_id = sender
                    .tab_id
                    .ok_or_else(|| Error::InvalidMessage("processC2P once requires a tab".into()))?;
                ctx.activity.allow_once(tab_id, request.app_ids.iter().copied());
            }
        }

        let reloaded = match sender.tab_id {
            Some(tab_id) => {
                ctx.activity.reset_tab(tab_id);
                ctx.tabs.reload(tab_id).await?;
                true
            }
            None => false,
        };

        info!(action = ?request.action, apps = request.app_ids.len(), reloaded, "click-to-play processed");
        Ok(json!({
            "action": request.action,
            "app_ids": request.app_ids,
            "reloaded": reloaded,
        }))
    })
}
