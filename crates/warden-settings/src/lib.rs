//! Warden Settings - configuration store, change dispatcher, and settings transfer

pub mod backend;
pub mod dispatcher;
pub mod store;
pub mod transfer;

pub use backend::{MemoryBackend, SettingsBackend};
pub use dispatcher::{ChangeDispatcher, ChangeHandler};
pub use store::ConfigStore;
pub use transfer::{export, import, settings_digest, ExportPayload, EXPORT_VERSION};
