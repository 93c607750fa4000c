//! Step ordering
//!
//! Which module contributes which step to which stage is declared once in
//! [`KNOWN_STEPS`]. The position of Warden's own steps is then a pure
//! function of the set of modules enabled at insertion time.

use crate::step::Stage;
use serde::Serialize;
use std::collections::BTreeSet;
use warden_core::ModuleId;

/// Owner name of Warden's direct listeners and prefix of its step names.
pub const OWNER: &str = "warden";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepRegistration {
    pub module: ModuleId,
    pub step: &'static str,
    pub stage: Stage,
}

pub const KNOWN_STEPS: [StepRegistration; 3] = [
    StepRegistration {
        module: ModuleId::AntiTracking,
        step: "antitracking.onBeforeRequest",
        stage: Stage::PreSend,
    },
    StepRegistration {
        module: ModuleId::AntiTracking,
        step: "antitracking.onHeadersReceived",
        stage: Stage::HeadersReceived,
    },
    StepRegistration {
        module: ModuleId::AdBlocker,
        step: "adblocker",
        stage: Stage::PreSend,
    },
];

pub fn own_step_name(stage: Stage) -> String {
    format!("{}.{}", OWNER, stage.as_str())
}

/// Steps of enabled modules at `stage`, in registration order.
pub fn predecessors(
    registrations: &[StepRegistration],
    enabled: &BTreeSet<ModuleId>,
    stage: Stage,
) -> Vec<String> {
    registrations
        .iter()
        .filter(|r| r.stage == stage && enabled.contains(&r.module))
        .map(|r| r.step.to_string())
        .collect()
}

/// The `before` list of each stage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OrderingPlan {
    pub pre_send: Vec<String>,
    pub headers_received: Vec<String>,
}

impl OrderingPlan {
    pub fn before(&self, stage: Stage) -> &[String] {
        match stage {
            Stage::PreSend => &self.pre_send,
            Stage::HeadersReceived => &self.headers_received,
        }
    }
}

pub fn plan(registrations: &[StepRegistration], enabled: &BTreeSet<ModuleId>) -> OrderingPlan {
    OrderingPlan {
        pre_send: predecessors(registrations, enabled, Stage::PreSend),
        headers_received: predecessors(registrations, enabled, Stage::HeadersReceived),
    }
}
