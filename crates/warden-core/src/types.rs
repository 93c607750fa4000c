//! Core types for Warden

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

/// Host predicate used to exempt sites from filtering.
///
/// Injected into modules and interceptors at construction time; returns
/// `true` when the given host is allowlisted.
pub type AllowlistPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

// ---------------------------------------------------------------------------
// Setting keys
// ---------------------------------------------------------------------------

/// Every setting the configuration store knows about.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    EnableAdBlock,
    EnableAntiTracking,
    EnableHumanWeb,
    EnableMetrics,
    SiteAllowlist,
    SiteBlocklist,
    ClickToPlayAllowlist,
    ShowAlert,
    AlertExpanded,
    Language,
    SetupComplete,
    AbTestConfig,
    CmpData,
    LibraryManifest,
}

impl SettingKey {
    pub const ALL: [SettingKey; 14] = [
        SettingKey::EnableAdBlock,
        SettingKey::EnableAntiTracking,
        SettingKey::EnableHumanWeb,
        SettingKey::EnableMetrics,
        SettingKey::SiteAllowlist,
        SettingKey::SiteBlocklist,
        SettingKey::ClickToPlayAllowlist,
        SettingKey::ShowAlert,
        SettingKey::AlertExpanded,
        SettingKey::Language,
        SettingKey::SetupComplete,
        SettingKey::AbTestConfig,
        SettingKey::CmpData,
        SettingKey::LibraryManifest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::EnableAdBlock => "enable_ad_block",
            SettingKey::EnableAntiTracking => "enable_anti_tracking",
            SettingKey::EnableHumanWeb => "enable_human_web",
            SettingKey::EnableMetrics => "enable_metrics",
            SettingKey::SiteAllowlist => "site_allowlist",
            SettingKey::SiteBlocklist => "site_blocklist",
            SettingKey::ClickToPlayAllowlist => "click_to_play_allowlist",
            SettingKey::ShowAlert => "show_alert",
            SettingKey::AlertExpanded => "alert_expanded",
            SettingKey::Language => "language",
            SettingKey::SetupComplete => "setup_complete",
            SettingKey::AbTestConfig => "ab_test_config",
            SettingKey::CmpData => "cmp_data",
            SettingKey::LibraryManifest => "library_manifest",
        }
    }

    /// Writes to a watched key publish a change event.
    pub fn is_watched(&self) -> bool {
        matches!(
            self,
            SettingKey::EnableAdBlock
                | SettingKey::EnableAntiTracking
                | SettingKey::EnableHumanWeb
                | SettingKey::EnableMetrics
                | SettingKey::SiteAllowlist
                | SettingKey::SiteBlocklist
                | SettingKey::ShowAlert
                | SettingKey::AlertExpanded
                | SettingKey::AbTestConfig
        )
    }

    /// Remotely fetched data is never part of a settings export.
    pub fn is_exportable(&self) -> bool {
        !matches!(
            self,
            SettingKey::AbTestConfig | SettingKey::CmpData | SettingKey::LibraryManifest
        )
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            SettingKey::EnableAdBlock
            | SettingKey::EnableAntiTracking
            | SettingKey::EnableHumanWeb
            | SettingKey::EnableMetrics
            | SettingKey::ShowAlert
            | SettingKey::AlertExpanded
            | SettingKey::SetupComplete => ValueKind::Bool,
            SettingKey::Language => ValueKind::Text,
            SettingKey::SiteAllowlist
            | SettingKey::SiteBlocklist
            | SettingKey::ClickToPlayAllowlist
            | SettingKey::AbTestConfig
            | SettingKey::CmpData
            | SettingKey::LibraryManifest => ValueKind::Record,
        }
    }

    /// Value returned by the store when the key has never been written.
    pub fn default_value(&self) -> SettingValue {
        match self {
            SettingKey::EnableAdBlock | SettingKey::EnableAntiTracking | SettingKey::ShowAlert => {
                SettingValue::Bool(true)
            }
            SettingKey::EnableHumanWeb
            | SettingKey::EnableMetrics
            | SettingKey::AlertExpanded
            | SettingKey::SetupComplete => SettingValue::Bool(false),
            SettingKey::Language => SettingValue::Text("en".to_string()),
            SettingKey::SiteAllowlist
            | SettingKey::SiteBlocklist
            | SettingKey::ClickToPlayAllowlist
            | SettingKey::CmpData => SettingValue::Record(json!([])),
            SettingKey::AbTestConfig | SettingKey::LibraryManifest => {
                SettingValue::Record(json!({}))
            }
        }
    }

    /// Check that `value` has the kind this key stores.
    pub fn validate(&self, value: &SettingValue) -> Result<()> {
        if value.kind() == self.kind() {
            Ok(())
        } else {
            Err(Error::invalid_value(
                self.as_str(),
                format!("expected {:?}, got {:?}", self.kind(), value.kind()),
            ))
        }
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SettingKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::UnknownSetting(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Setting values
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Number,
    Text,
    Record,
}

/// A typed setting value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Record(Value),
}

impl SettingValue {
    /// Convert an arbitrary JSON value, keeping scalars typed.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => Self::Number(f),
                None => Self::Record(Value::Number(n)),
            },
            Value::String(s) => Self::Text(s),
            other => Self::Record(other),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => json!(n),
            Self::Text(s) => Value::String(s.clone()),
            Self::Record(v) => v.clone(),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Number(_) => ValueKind::Number,
            Self::Text(_) => ValueKind::Text,
            Self::Record(_) => ValueKind::Record,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Value> {
        match self {
            Self::Record(v) => Some(v),
            _ => None,
        }
    }

    /// String entries of a record array; other shapes yield an empty list.
    pub fn string_list(&self) -> Vec<String> {
        self.as_record()
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl From<bool> for SettingValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for SettingValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Value> for SettingValue {
    fn from(v: Value) -> Self {
        Self::from_json(v)
    }
}

// ---------------------------------------------------------------------------
// Capability modules
// ---------------------------------------------------------------------------

/// Capability modules driven by the orchestrator.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum ModuleId {
    #[serde(rename = "adblocker")]
    AdBlocker,
    #[serde(rename = "antitracking")]
    AntiTracking,
    #[serde(rename = "human-web")]
    HumanWeb,
}

impl ModuleId {
    pub const ALL: [ModuleId; 3] = [ModuleId::AdBlocker, ModuleId::AntiTracking, ModuleId::HumanWeb];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleId::AdBlocker => "adblocker",
            ModuleId::AntiTracking => "antitracking",
            ModuleId::HumanWeb => "human-web",
        }
    }

    /// The boolean setting that drives this module's enablement.
    pub fn setting(&self) -> SettingKey {
        match self {
            ModuleId::AdBlocker => SettingKey::EnableAdBlock,
            ModuleId::AntiTracking => SettingKey::EnableAntiTracking,
            ModuleId::HumanWeb => SettingKey::EnableHumanWeb,
        }
    }

    pub fn for_setting(key: SettingKey) -> Option<Self> {
        ModuleId::ALL.iter().copied().find(|m| m.setting() == key)
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ModuleId::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::ModuleNotFound(s.to_string()))
    }
}
