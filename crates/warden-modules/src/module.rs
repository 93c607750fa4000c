//! Capability module contract
//!
//! Modules are owned by the filtering engine. The orchestrator only requests
//! transitions and observes their outcome through this trait; what a module
//! does with a request is opaque.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use warden_core::{ModuleId, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Enabled,
    Disabled,
}

/// Listener for module lifecycle events.
pub type LifecycleListener = Arc<dyn Fn(ModuleId, LifecycleEvent) + Send + Sync>;

/// Module-specific operations.
#[derive(Clone, Debug, PartialEq)]
pub enum ModuleAction {
    SetConfigOption { name: String, value: Value },
    AggregatedStats { tab_id: Option<i64> },
    IsAllowlisted { host: String },
}

impl ModuleAction {
    pub fn set_option(name: impl Into<String>, value: Value) -> Self {
        Self::SetConfigOption {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SetConfigOption { .. } => "setConfigOption",
            Self::AggregatedStats { .. } => "aggregatedStats",
            Self::IsAllowlisted { .. } => "isAllowlisted",
        }
    }
}

/// The contract every capability module satisfies.
#[async_trait]
pub trait CapabilityModule: Send + Sync {
    fn id(&self) -> ModuleId;

    fn is_enabled(&self) -> bool;

    fn is_disabled(&self) -> bool {
        !self.is_enabled()
    }

    /// Enable the module. Resolves immediately if already enabled.
    async fn enable(&self) -> Result<()>;

    /// Disable the module. Resolves immediately if already disabled.
    async fn disable(&self) -> Result<()>;

    /// Resolves once any in-flight start-up has finished.
    async fn is_ready(&self) -> Result<()>;

    /// Register a lifecycle listener.
    fn on(&self, listener: LifecycleListener);

    async fn action(&self, action: ModuleAction) -> Result<Value>;
}
