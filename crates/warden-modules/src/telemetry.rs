//! Telemetry bundle recomputation
//!
//! The anti-tracking module carries two options derived from the data
//! collection settings. They are recomputed whenever one of the inputs
//! changes, after a transition of a dependent module, and on every
//! scheduler tick.

use crate::module::ModuleAction;
use serde::Serialize;
use serde_json::Value;
use warden_core::{ModuleId, SettingKey};
use warden_settings::ConfigStore;

/// Module that receives the bundle.
pub const TELEMETRY_TARGET: ModuleId = ModuleId::AntiTracking;

/// Settings whose change forces a recomputation.
pub const TELEMETRY_INPUTS: [SettingKey; 2] = [SettingKey::EnableHumanWeb, SettingKey::EnableMetrics];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryBundle {
    /// 0 = off, 1 = metrics only, 2 = metrics and human-web.
    pub telemetry_mode: u8,
    pub send_metrics: bool,
}

impl TelemetryBundle {
    pub fn compute(store: &ConfigStore) -> Self {
        let metrics = store.get_bool(SettingKey::EnableMetrics);
        let human_web = store.get_bool(SettingKey::EnableHumanWeb);
        let telemetry_mode = match (metrics, human_web) {
            (false, _) => 0,
            (true, false) => 1,
            (true, true) => 2,
        };
        Self {
            telemetry_mode,
            send_metrics: metrics,
        }
    }

    pub fn actions(&self) -> Vec<ModuleAction> {
        vec![
            ModuleAction::set_option("telemetryMode", Value::from(self.telemetry_mode)),
            ModuleAction::set_option("sendMetrics", Value::Bool(self.send_metrics)),
        ]
    }
}

/// Whether a finished transition of `id` invalidates the bundle.
pub fn depends_on(id: ModuleId) -> bool {
    matches!(id, ModuleId::HumanWeb | ModuleId::AntiTracking)
}
