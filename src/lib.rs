//! Warden - request-filtering orchestration daemon
//!
//! Wires the settings store, module orchestrator, interception pipeline and
//! message router together, and runs the periodic refresh scheduler.

pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod scheduler;
pub mod stdio;

pub use bootstrap::{boot, BootReport, Collaborators, Runtime};
pub use config::{ConfigSource, WardenConfig};
pub use scheduler::{RemoteRefresh, ScheduledTask, Scheduler, TelemetryRefresh};
