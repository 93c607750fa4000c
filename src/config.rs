//! Warden configuration
//!
//! Loaded from TOML at startup. Every section falls back to its defaults, and
//! a missing or unparsable file yields the default configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};
use warden_core::{SettingKey, SettingValue};
use warden_router::RouterConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub scheduler: SchedulerConfig,
    pub orchestrator: OrchestratorConfig,
    pub router: RouterConfig,
    pub logging: LoggingConfig,
    /// Initial setting values, keyed by setting name.
    pub settings: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between refresh cycles.
    pub interval_secs: u64,
    /// Per-request timeout for remote refreshes, in seconds.
    pub request_timeout_secs: u64,
    /// A/B test configuration endpoint.
    pub ab_tests_url: Option<String>,
    /// Consent management data endpoint.
    pub cmp_url: Option<String>,
    /// Library version manifest endpoint.
    pub library_url: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30 * 60,
            request_timeout_secs: 30,
            ab_tests_url: None,
            cmp_url: None,
            library_url: None,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Debounce window for site allowlist updates.
    pub allowlist_debounce_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            allowlist_debounce_ms: 250,
        }
    }
}

impl OrchestratorConfig {
    pub fn allowlist_debounce(&self) -> Duration {
        Duration::from_millis(self.allowlist_debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`.
    pub filter: String,
    pub json: bool,
    /// Directory for daily log files. Stderr only when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warden=info".to_string(),
            json: false,
            directory: None,
        }
    }
}

/// Where the effective config came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Missing(PathBuf),
    Invalid { path: PathBuf, error: String },
}

impl ConfigSource {
    pub fn report(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded config from {}", path.display()),
            ConfigSource::Missing(path) => info!("No config at {}, using defaults", path.display()),
            ConfigSource::Invalid { path, error } => {
                warn!("Failed to parse {}: {}, using defaults", path.display(), error)
            }
        }
    }
}

impl WardenConfig {
    /// Load from `path` and log where the config came from.
    pub fn load(path: &Path) -> Self {
        let (config, source) = Self::read(path);
        source.report();
        config
    }

    /// Load from `path` without logging. Callers that read the config before
    /// logging is initialized report the returned source afterwards.
    pub fn read(path: &Path) -> (Self, ConfigSource) {
        let path = path.to_path_buf();
        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => (config, ConfigSource::File(path)),
                Err(e) => (
                    Self::default(),
                    ConfigSource::Invalid {
                        path,
                        error: e.to_string(),
                    },
                ),
            },
            Err(_) => (Self::default(), ConfigSource::Missing(path)),
        }
    }

    /// Render the effective config as TOML.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Typed initial settings. Unknown names and values of the wrong kind
    /// are logged and skipped.
    pub fn initial_settings(&self) -> Vec<(SettingKey, SettingValue)> {
        let mut entries = Vec::with_capacity(self.settings.len());
        for (name, raw) in &self.settings {
            let key = match SettingKey::from_str(name) {
                Ok(key) => key,
                Err(e) => {
                    warn!(setting = %name, error = %e, "ignoring configured setting");
                    continue;
                }
            };
            let value = SettingValue::from_json(raw.clone());
            if let Err(e) = key.validate(&value) {
                warn!(setting = %name, error = %e, "ignoring configured setting");
                continue;
            }
            entries.push((key, value));
        }
        entries
    }
}
