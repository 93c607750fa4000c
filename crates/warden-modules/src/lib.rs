//! Warden Modules - capability module contract and the module orchestrator

pub mod allowlist;
pub mod local;
pub mod module;
pub mod orchestrator;
pub mod registry;
pub mod telemetry;

pub use allowlist::SiteAllowlist;
pub use local::InProcessModule;
pub use module::{CapabilityModule, LifecycleEvent, LifecycleListener, ModuleAction};
pub use orchestrator::{
    Lifecycle, ModuleOrchestrator, ModuleState, OrchestratorContext, ReconcileReport,
    TransitionGuard,
};
pub use registry::ModuleRegistry;
pub use telemetry::TelemetryBundle;
