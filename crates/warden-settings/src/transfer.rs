//! Settings export and import
//!
//! An export carries the explicitly stored exportable settings and a
//! base64 SHA-256 digest of their canonical JSON. Import verifies the digest
//! and validates every entry before writing anything.

use crate::store::ConfigStore;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use ring::digest::{digest, SHA256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use warden_core::{Error, Result, SettingKey, SettingValue};

pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub settings: BTreeMap<String, SettingValue>,
    pub hash: String,
}

/// Digest of the canonical (key-sorted) JSON encoding of `settings`.
pub fn settings_digest(settings: &BTreeMap<String, SettingValue>) -> Result<String> {
    let canonical = serde_json::to_vec(settings)?;
    Ok(STANDARD.encode(digest(&SHA256, &canonical).as_ref()))
}

pub fn export(store: &ConfigStore) -> Result<ExportPayload> {
    let settings: BTreeMap<String, SettingValue> = store
        .snapshot()
        .into_iter()
        .filter(|(key, _)| key.is_exportable())
        .map(|(key, value)| (key.as_str().to_string(), value))
        .collect();
    let hash = settings_digest(&settings)?;
    Ok(ExportPayload {
        version: EXPORT_VERSION,
        exported_at: Utc::now(),
        settings,
        hash,
    })
}

/// Apply an exported payload. Returns the number of settings written.
///
/// On any error the store is left unchanged.
pub fn import(store: &ConfigStore, payload: &ExportPayload) -> Result<usize> {
    if payload.version != EXPORT_VERSION {
        return Err(Error::InvalidMessage(format!(
            "unsupported export version {}",
            payload.version
        )));
    }

    let actual = settings_digest(&payload.settings)?;
    if actual != payload.hash {
        return Err(Error::IntegrityMismatch {
            expected: payload.hash.clone(),
            actual,
        });
    }

    let mut staged = Vec::with_capacity(payload.settings.len());
    for (name, value) in &payload.settings {
        let key: SettingKey = name.parse()?;
        if !key.is_exportable() {
            return Err(Error::invalid_value(name, "setting cannot be imported"));
        }
        key.validate(value)?;
        staged.push((key, value.clone()));
    }

    let count = staged.len();
    for (key, value) in staged {
        store.set(key, value)?;
    }
    info!(count, "settings imported");
    Ok(count)
}
