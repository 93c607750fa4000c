//! Configuration store with change notification
//!
//! `set` on a watched key publishes the new value to the dispatcher before it
//! returns. Persistence goes through a single writer task that saves in write
//! order; it is not awaited.

use crate::backend::SettingsBackend;
use crate::dispatcher::ChangeDispatcher;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use warden_core::{Result, SettingKey, SettingValue};

pub struct ConfigStore {
    values: DashMap<SettingKey, SettingValue>,
    dispatcher: Arc<ChangeDispatcher>,
    backend: Option<Arc<dyn SettingsBackend>>,
    writer: OnceLock<mpsc::UnboundedSender<(SettingKey, SettingValue)>>,
}

impl ConfigStore {
    pub fn new(dispatcher: Arc<ChangeDispatcher>) -> Self {
        Self {
            values: DashMap::new(),
            dispatcher,
            backend: None,
            writer: OnceLock::new(),
        }
    }

    pub fn with_backend(dispatcher: Arc<ChangeDispatcher>, backend: Arc<dyn SettingsBackend>) -> Self {
        Self {
            values: DashMap::new(),
            dispatcher,
            backend: Some(backend),
            writer: OnceLock::new(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<ChangeDispatcher> {
        &self.dispatcher
    }

    /// Current value, or the key's default when never written.
    pub fn get(&self, key: SettingKey) -> SettingValue {
        self.values
            .get(&key)
            .map(|v| v.value().clone())
            .unwrap_or_else(|| key.default_value())
    }

    pub fn get_bool(&self, key: SettingKey) -> bool {
        self.get(key).as_bool().unwrap_or(false)
    }

    pub fn get_list(&self, key: SettingKey) -> Vec<String> {
        self.get(key).string_list()
    }

    /// Whether the key holds an explicitly written value.
    pub fn is_set(&self, key: SettingKey) -> bool {
        self.values.contains_key(&key)
    }

    /// Store `value` under `key`, then notify subscribers if the key is watched.
    pub fn set(&self, key: SettingKey, value: impl Into<SettingValue>) -> Result<()> {
        let value = value.into();
        key.validate(&value)?;

        self.values.insert(key, value.clone());
        self.persist(key, &value);

        if key.is_watched() {
            let delivered = self.dispatcher.publish(key, &value);
            debug!(key = %key, delivered, "setting changed");
        }
        Ok(())
    }

    /// Bulk-load values without publishing change events.
    ///
    /// Values of the wrong kind are skipped. Returns the number loaded.
    pub fn load(&self, entries: impl IntoIterator<Item = (SettingKey, SettingValue)>) -> usize {
        let mut loaded = 0;
        for (key, value) in entries {
            if let Err(e) = key.validate(&value) {
                warn!(key = %key, error = %e, "skipping persisted setting");
                continue;
            }
            self.values.insert(key, value);
            loaded += 1;
        }
        loaded
    }

    /// Load every persisted setting from the backend, if one is attached.
    pub async fn load_from_backend(&self) -> Result<usize> {
        let Some(backend) = &self.backend else {
            return Ok(0);
        };
        let entries = backend.load().await?;
        let loaded = self.load(entries);
        info!(loaded, "settings loaded from backend");
        Ok(loaded)
    }

    /// Explicitly written values, sorted by key.
    pub fn snapshot(&self) -> BTreeMap<SettingKey, SettingValue> {
        self.values
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    /// Current value of every watched key, defaults included.
    pub fn watched_snapshot(&self) -> BTreeMap<SettingKey, SettingValue> {
        SettingKey::ALL
            .iter()
            .filter(|k| k.is_watched())
            .map(|k| (*k, self.get(*k)))
            .collect()
    }

    fn persist(&self, key: SettingKey, value: &SettingValue) {
        let Some(backend) = &self.backend else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(key = %key, "no runtime; setting not persisted");
            return;
        };
        let writer = self
            .writer
            .get_or_init(|| spawn_writer(&handle, backend.clone()));
        if writer.send((key, value.clone())).is_err() {
            warn!(key = %key, "settings writer stopped; setting not persisted");
        }
    }
}

/// Saves queued writes one at a time so the backend ends on the latest value.
fn spawn_writer(
    handle: &tokio::runtime::Handle,
    backend: Arc<dyn SettingsBackend>,
) -> mpsc::UnboundedSender<(SettingKey, SettingValue)> {
    let (tx, mut rx) = mpsc::unbounded_channel::<(SettingKey, SettingValue)>();
    handle.spawn(async move {
        while let Some((key, value)) = rx.recv().await {
            if let Err(e) = backend.save(key, value).await {
                warn!(key = %key, error = %e, "failed to persist setting");
            }
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn store() -> ConfigStore {
        ConfigStore::new(Arc::new(ChangeDispatcher::new()))
    }

    #[test]
    fn get_returns_default_until_written() {
        let store = store();
        assert_eq!(store.get(SettingKey::Language), SettingValue::Text("en".into()));
        assert!(!store.is_set(SettingKey::Language));
        store.set(SettingKey::Language, "fr").unwrap();
        assert_eq!(store.get(SettingKey::Language).as_text(), Some("fr"));
        assert!(store.is_set(SettingKey::Language));
    }

    #[test]
    fn wrong_kind_is_rejected_and_store_untouched() {
        let store = store();
        assert!(store.set(SettingKey::EnableAdBlock, "on").is_err());
        assert!(!store.is_set(SettingKey::EnableAdBlock));
    }

    #[test]
    fn watched_write_notifies_before_returning() {
        let store = store();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        store.dispatcher().subscribe(SettingKey::EnableAdBlock, move |v| {
            *sink.lock().unwrap() = v.as_bool();
            Ok(())
        });
        store.set(SettingKey::EnableAdBlock, false).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(false));
    }

    #[test]
    fn unwatched_write_is_silent() {
        let store = store();
        let fired = Arc::new(Mutex::new(false));
        let sink = fired.clone();
        store.dispatcher().subscribe(SettingKey::Language, move |_| {
            *sink.lock().unwrap() = true;
            Ok(())
        });
        store.set(SettingKey::Language, "de").unwrap();
        assert!(!*fired.lock().unwrap());
    }

    #[test]
    fn load_skips_invalid_and_does_not_notify() {
        let store = store();
        let fired = Arc::new(Mutex::new(0));
        let sink = fired.clone();
        store.dispatcher().subscribe(SettingKey::EnableAdBlock, move |_| {
            *sink.lock().unwrap() += 1;
            Ok(())
        });
        let loaded = store.load(vec![
            (SettingKey::EnableAdBlock, SettingValue::Bool(false)),
            (SettingKey::SiteAllowlist, SettingValue::Bool(true)),
        ]);
        assert_eq!(loaded, 1);
        assert_eq!(*fired.lock().unwrap(), 0);
        assert!(!store.get_bool(SettingKey::EnableAdBlock));
        assert_eq!(store.get(SettingKey::SiteAllowlist).as_record(), Some(&json!([])));
    }

    #[test]
    fn watched_snapshot_includes_defaults() {
        let store = store();
        let snapshot = store.watched_snapshot();
        assert_eq!(snapshot.get(&SettingKey::EnableAdBlock), Some(&SettingValue::Bool(true)));
        assert!(!snapshot.contains_key(&SettingKey::Language));
    }
}
