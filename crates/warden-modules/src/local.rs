//! In-process capability module
//!
//! A module with the full lifecycle contract and no filtering logic of its
//! own. Used when the daemon runs without an attached filtering engine.

use crate::module::{CapabilityModule, LifecycleEvent, LifecycleListener, ModuleAction};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use warden_core::{AllowlistPredicate, Error, ModuleId, Result};

pub struct InProcessModule {
    id: ModuleId,
    enabled: AtomicBool,
    /// `false` while a start-up is in flight.
    ready: watch::Sender<bool>,
    listeners: Mutex<Vec<LifecycleListener>>,
    options: DashMap<String, Value>,
    allowlist: Option<AllowlistPredicate>,
    startup_delay: Duration,
    enable_calls: AtomicUsize,
    disable_calls: AtomicUsize,
}

impl InProcessModule {
    pub fn new(id: ModuleId) -> Self {
        let (ready, _) = watch::channel(true);
        Self {
            id,
            enabled: AtomicBool::new(false),
            ready,
            listeners: Mutex::new(Vec::new()),
            options: DashMap::new(),
            allowlist: None,
            startup_delay: Duration::ZERO,
            enable_calls: AtomicUsize::new(0),
            disable_calls: AtomicUsize::new(0),
        }
    }

    /// Simulated start-up time between `enable` and readiness.
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn with_allowlist(mut self, predicate: AllowlistPredicate) -> Self {
        self.allowlist = Some(predicate);
        self
    }

    pub fn config_option(&self, name: &str) -> Option<Value> {
        self.options.get(name).map(|v| v.value().clone())
    }

    pub fn is_allowlisted(&self, host: &str) -> bool {
        self.allowlist.as_ref().is_some_and(|allowed| allowed(host))
    }

    /// Number of `enable` calls that actually started the module.
    pub fn enable_calls(&self) -> usize {
        self.enable_calls.load(Ordering::SeqCst)
    }

    pub fn disable_calls(&self) -> usize {
        self.disable_calls.load(Ordering::SeqCst)
    }

    fn emit(&self, event: LifecycleEvent) {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(self.id, event);
        }
    }
}

#[async_trait]
impl CapabilityModule for InProcessModule {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn enable(&self) -> Result<()> {
        if self.is_enabled() {
            return Ok(());
        }
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        self.ready.send_replace(false);
        if !self.startup_delay.is_zero() {
            tokio::time::sleep(self.startup_delay).await;
        }
        self.enabled.store(true, Ordering::SeqCst);
        self.ready.send_replace(true);
        info!(module = %self.id, "module enabled");
        self.emit(LifecycleEvent::Enabled);
        Ok(())
    }

    async fn disable(&self) -> Result<()> {
        if self.is_disabled() {
            return Ok(());
        }
        self.disable_calls.fetch_add(1, Ordering::SeqCst);
        self.enabled.store(false, Ordering::SeqCst);
        info!(module = %self.id, "module disabled");
        self.emit(LifecycleEvent::Disabled);
        Ok(())
    }

    async fn is_ready(&self) -> Result<()> {
        let mut rx = self.ready.subscribe();
        rx.wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| Error::Internal(format!("{} readiness channel closed", self.id)))
    }

    fn on(&self, listener: LifecycleListener) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    async fn action(&self, action: ModuleAction) -> Result<Value> {
        match action {
            ModuleAction::SetConfigOption { name, value } => {
                self.options.insert(name, value);
                Ok(Value::Null)
            }
            ModuleAction::AggregatedStats { tab_id } => Ok(json!({
                "module": self.id,
                "tab_id": tab_id,
                "enabled": self.is_enabled(),
                "options": self.options.len(),
            })),
            ModuleAction::IsAllowlisted { host } => Ok(Value::Bool(self.is_allowlisted(&host))),
        }
    }
}
