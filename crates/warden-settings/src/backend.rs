//! Persistence seam for settings
//!
//! Durable storage is an external collaborator. The store queues every write
//! for the backend in order without waiting for it; notifications never
//! depend on it.

use async_trait::async_trait;
use dashmap::DashMap;
use warden_core::{Result, SettingKey, SettingValue};

#[async_trait]
pub trait SettingsBackend: Send + Sync {
    /// Every persisted setting, read once at startup.
    async fn load(&self) -> Result<Vec<(SettingKey, SettingValue)>>;

    /// Persist one setting.
    async fn save(&self, key: SettingKey, value: SettingValue) -> Result<()>;
}

/// Backend that keeps settings in process memory.
#[derive(Default)]
pub struct MemoryBackend {
    entries: DashMap<SettingKey, SettingValue>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(entries: impl IntoIterator<Item = (SettingKey, SettingValue)>) -> Self {
        let backend = Self::new();
        for (key, value) in entries {
            backend.entries.insert(key, value);
        }
        backend
    }

    pub fn get(&self, key: SettingKey) -> Option<SettingValue> {
        self.entries.get(&key).map(|v| v.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SettingsBackend for MemoryBackend {
    async fn load(&self) -> Result<Vec<(SettingKey, SettingValue)>> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        entries.sort_by_key(|(k, _)| *k);
        Ok(entries)
    }

    async fn save(&self, key: SettingKey, value: SettingValue) -> Result<()> {
        self.entries.insert(key, value);
        Ok(())
    }
}
