//! page_overlay/* handlers

use super::parse_payload;
use crate::context::RouterContext;
use serde::Deserialize;
use serde_json::{json, Value};
use warden_core::{Error, Result, SenderContext, SettingKey};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AlertConf {
    show_alert: Option<bool>,
    alert_expanded: Option<bool>,
}

pub fn update_alert_conf(
    ctx: &RouterContext,
    payload: Option<Value>,
    _sender: &SenderContext,
) -> Result<Value> {
    let conf: AlertConf = parse_payload(payload)?;
    if conf.show_alert.is_none() && conf.alert_expanded.is_none() {
        return Err(Error::InvalidMessage(
            "expected show_alert or alert_expanded".into(),
        ));
    }
    if let Some(show) = conf.show_alert {
        ctx.store().set(SettingKey::ShowAlert, show)?;
    }
    if let Some(expanded) = conf.alert_expanded {
        ctx.store().set(SettingKey::AlertExpanded, expanded)?;
    }
    Ok(json!({
        "show_alert": ctx.store().get_bool(SettingKey::ShowAlert),
        "alert_expanded": ctx.store().get_bool(SettingKey::AlertExpanded),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TabQuery {
    tab_id: Option<i64>,
}

/// Summary of the sender's tab, or of `tab_id` when given.
pub fn get_tab_summary(
    ctx: &RouterContext,
    payload: Option<Value>,
    sender: &SenderContext,
) -> Result<Value> {
    let query: TabQuery = match payload {
        Some(Value::Null) | None => TabQuery::default(),
        Some(v) => parse_payload(Some(v))?,
    };
    let tab_id = query
        .tab_id
        .or(sender.tab_id)
        .ok_or_else(|| Error::InvalidMessage("no tab to summarize".into()))?;

    let summary = ctx.activity.summary(tab_id).unwrap_or_default();
    Ok(json!({
        "tab_id": tab_id,
        "summary": summary,
        "allowed_apps": ctx.activity.allowed_apps(tab_id),
    }))
}
