//! Module orchestrator
//!
//! Drives capability modules through enable/disable transitions in response to
//! changes of their `enable_*` settings, and writes the state modules report
//! back into the configuration store.
//!
//! Two pieces of state shape every decision, both held in an
//! [`OrchestratorContext`]:
//!
//! - the process [`Lifecycle`]. While `Bootstrapping`, enablement changes are
//!   recorded by the store but start no transition. [`ModuleOrchestrator::finish_bootstrap`]
//!   reconciles once at the end.
//! - one [`TransitionGuard`] per module. A request that arrives while the
//!   module's guard is `Transitioning` is dropped, not queued. The guard is
//!   cleared only after the transition completes, on every path.

use crate::module::{CapabilityModule, LifecycleEvent};
use crate::registry::ModuleRegistry;
use crate::telemetry::{self, TelemetryBundle, TELEMETRY_INPUTS, TELEMETRY_TARGET};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warden_core::{Error, ModuleId, Result, SettingValue};
use warden_settings::ConfigStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Bootstrapping,
    Running,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransitionGuard {
    #[default]
    Idle,
    Transitioning,
}

/// Externally visible state of a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    Disabled,
    Pending,
    Enabled,
}

pub struct OrchestratorContext {
    lifecycle: watch::Sender<Lifecycle>,
    guards: DashMap<ModuleId, TransitionGuard>,
}

impl Default for OrchestratorContext {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorContext {
    pub fn new() -> Self {
        let (lifecycle, _) = watch::channel(Lifecycle::Bootstrapping);
        Self {
            lifecycle,
            guards: DashMap::new(),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.borrow()
    }

    pub fn is_loading(&self) -> bool {
        self.lifecycle() == Lifecycle::Bootstrapping
    }

    pub fn mark_running(&self) {
        self.lifecycle.send_replace(Lifecycle::Running);
    }

    /// Receiver that observes the switch to `Running`.
    pub fn subscribe(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle.subscribe()
    }

    pub fn guard(&self, id: ModuleId) -> TransitionGuard {
        self.guards.get(&id).map(|g| *g).unwrap_or_default()
    }

    /// Set the guard for `id`. Returns false when it was already set.
    pub fn try_begin(&self, id: ModuleId) -> bool {
        let mut guard = self.guards.entry(id).or_default();
        if *guard == TransitionGuard::Transitioning {
            return false;
        }
        *guard = TransitionGuard::Transitioning;
        true
    }

    pub fn finish(&self, id: ModuleId) {
        self.guards.insert(id, TransitionGuard::Idle);
    }
}

/// Outcome of the end-of-bootstrap reconciliation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub transitioned: Vec<ModuleId>,
    pub failed: Vec<ModuleId>,
}

pub struct ModuleOrchestrator {
    ctx: Arc<OrchestratorContext>,
    registry: Arc<ModuleRegistry>,
    store: Arc<ConfigStore>,
}

impl ModuleOrchestrator {
    pub fn new(
        ctx: Arc<OrchestratorContext>,
        registry: Arc<ModuleRegistry>,
        store: Arc<ConfigStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            registry,
            store,
        })
    }

    pub fn context(&self) -> &Arc<OrchestratorContext> {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Subscribe to enablement and telemetry settings and listen to module
    /// lifecycle events. Call once, before any setting is written.
    pub fn attach(self: &Arc<Self>) {
        let dispatcher = self.store.dispatcher();

        for module in self.registry.modules() {
            let id = module.id();

            let weak = Arc::downgrade(self);
            dispatcher.subscribe(id.setting(), move |value| match weak.upgrade() {
                Some(orchestrator) => orchestrator.on_enablement_changed(id, value),
                None => Ok(()),
            });

            let weak: Weak<Self> = Arc::downgrade(self);
            module.on(Arc::new(move |id: ModuleId, event: LifecycleEvent| {
                if let Some(orchestrator) = weak.upgrade() {
                    orchestrator.observe(id, event);
                }
            }));
        }

        for key in TELEMETRY_INPUTS {
            let weak = Arc::downgrade(self);
            dispatcher.subscribe(key, move |_| {
                if let Some(orchestrator) = weak.upgrade() {
                    orchestrator.schedule_telemetry();
                }
                Ok(())
            });
        }
        debug!(modules = self.registry.len(), "orchestrator attached");
    }

    /// Change handler for a module's `enable_*` setting.
    pub fn on_enablement_changed(self: &Arc<Self>, id: ModuleId, value: &SettingValue) -> Result<()> {
        let enabled = value
            .as_bool()
            .ok_or_else(|| Error::invalid_value(id.setting().as_str(), "expected a boolean"))?;
        if self.ctx.is_loading() {
            debug!(module = %id, enabled, "bootstrapping, transition deferred");
            return Ok(());
        }
        self.request_transition(id, enabled)?;
        Ok(())
    }

    /// Start a transition of `id` towards `enabled`.
    ///
    /// Returns `None` when the request was dropped, either because the
    /// process is still bootstrapping or because a transition of the same
    /// module is in flight. Must be called from within a Tokio runtime.
    pub fn request_transition(
        self: &Arc<Self>,
        id: ModuleId,
        enabled: bool,
    ) -> Result<Option<JoinHandle<Result<()>>>> {
        let module = self
            .registry
            .get(id)
            .ok_or_else(|| Error::ModuleNotFound(id.to_string()))?;

        if self.ctx.is_loading() {
            return Ok(None);
        }
        if !self.ctx.try_begin(id) {
            debug!(module = %id, enabled, "transition in flight, request dropped");
            return Ok(None);
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                self.ctx.finish(id);
                return Err(Error::Internal(format!("no runtime for transition: {}", e)));
            }
        };

        let this = Arc::clone(self);
        Ok(Some(runtime.spawn(async move { this.run_transition(module, enabled).await })))
    }

    async fn run_transition(&self, module: Arc<dyn CapabilityModule>, enabled: bool) -> Result<()> {
        let id = module.id();
        let outcome = drive(module.as_ref(), enabled).await;
        self.ctx.finish(id);

        match &outcome {
            Ok(()) => {
                info!(module = %id, enabled, "module transition complete");
                if telemetry::depends_on(id) {
                    if let Err(e) = self.recompute_telemetry().await {
                        warn!(module = %id, error = %e, "telemetry recomputation failed");
                    }
                }
            }
            Err(e) => {
                warn!(module = %id, enabled, error = %e, "module transition failed, configuration left unreconciled");
            }
        }
        outcome
    }

    /// Write the state a module reports into its setting when they differ.
    fn observe(&self, id: ModuleId, event: LifecycleEvent) {
        let observed = event == LifecycleEvent::Enabled;
        let key = id.setting();
        if self.store.get_bool(key) == observed {
            return;
        }
        debug!(module = %id, observed, "reconciling setting with module state");
        if let Err(e) = self.store.set(key, observed) {
            warn!(module = %id, error = %e, "failed to reconcile module setting");
        }
    }

    fn schedule_telemetry(self: &Arc<Self>) {
        if self.ctx.is_loading() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let this = Arc::clone(self);
                runtime.spawn(async move {
                    if let Err(e) = this.recompute_telemetry().await {
                        warn!(error = %e, "telemetry recomputation failed");
                    }
                });
            }
            Err(_) => debug!("no runtime, telemetry recomputation skipped"),
        }
    }

    /// Recompute the telemetry bundle and push it into the target module.
    ///
    /// Returns `None` when the target is absent or disabled.
    pub async fn recompute_telemetry(&self) -> Result<Option<TelemetryBundle>> {
        let Some(module) = self.registry.get(TELEMETRY_TARGET) else {
            return Ok(None);
        };
        if !module.is_enabled() {
            debug!(module = %TELEMETRY_TARGET, "target disabled, telemetry not pushed");
            return Ok(None);
        }
        module.is_ready().await?;

        let bundle = TelemetryBundle::compute(&self.store);
        for action in bundle.actions() {
            module.action(action).await?;
        }
        debug!(
            telemetry_mode = bundle.telemetry_mode,
            send_metrics = bundle.send_metrics,
            "telemetry bundle pushed"
        );
        Ok(Some(bundle))
    }

    /// Enable every module whose setting is true, bypassing guards and change
    /// flow. Only acts while bootstrapping. Returns the number enabled.
    pub async fn boot_modules(&self) -> usize {
        if !self.ctx.is_loading() {
            warn!("boot_modules called after bootstrap, ignored");
            return 0;
        }
        let mut enabled = 0;
        for module in self.registry.modules() {
            let id = module.id();
            if !self.store.get_bool(id.setting()) || module.is_enabled() {
                continue;
            }
            match module.enable().await {
                Ok(()) => enabled += 1,
                Err(e) => warn!(module = %id, error = %e, "module failed to start"),
            }
        }
        info!(enabled, "modules booted");
        enabled
    }

    /// Leave the loading phase and drive every module whose state differs
    /// from its setting through the guarded transition path.
    pub async fn finish_bootstrap(self: &Arc<Self>) -> ReconcileReport {
        self.ctx.mark_running();

        let mut report = ReconcileReport::default();
        let mut pending = Vec::new();
        for module in self.registry.modules() {
            let id = module.id();
            let wanted = self.store.get_bool(id.setting());
            if module.is_enabled() == wanted {
                continue;
            }
            match self.request_transition(id, wanted) {
                Ok(Some(handle)) => pending.push((id, handle)),
                Ok(None) => {}
                Err(e) => {
                    warn!(module = %id, error = %e, "reconciliation not started");
                    report.failed.push(id);
                }
            }
        }

        for (id, handle) in pending {
            match handle.await {
                Ok(Ok(())) => report.transitioned.push(id),
                Ok(Err(_)) => report.failed.push(id),
                Err(e) => {
                    warn!(module = %id, error = %e, "transition task aborted");
                    report.failed.push(id);
                }
            }
        }

        if let Err(e) = self.recompute_telemetry().await {
            warn!(error = %e, "telemetry recomputation failed");
        }
        info!(
            transitioned = report.transitioned.len(),
            failed = report.failed.len(),
            "bootstrap finished"
        );
        report
    }

    pub fn state(&self, id: ModuleId) -> Option<ModuleState> {
        let module = self.registry.get(id)?;
        Some(if self.ctx.guard(id) == TransitionGuard::Transitioning {
            ModuleState::Pending
        } else if module.is_enabled() {
            ModuleState::Enabled
        } else {
            ModuleState::Disabled
        })
    }

    pub fn states(&self) -> BTreeMap<ModuleId, ModuleState> {
        self.registry
            .ids()
            .into_iter()
            .filter_map(|id| self.state(id).map(|s| (id, s)))
            .collect()
    }
}

/// Move one module towards `enabled`. Already in that state is a no-op.
async fn drive(module: &dyn CapabilityModule, enabled: bool) -> Result<()> {
    let id = module.id();
    if enabled {
        if module.is_enabled() {
            return Ok(());
        }
        module
            .enable()
            .await
            .map_err(|e| Error::transition(id.as_str(), e.to_string()))
    } else {
        // Never race an in-flight enable.
        module
            .is_ready()
            .await
            .map_err(|e| Error::transition(id.as_str(), e.to_string()))?;
        if module.is_disabled() {
            return Ok(());
        }
        module
            .disable()
            .await
            .map_err(|e| Error::transition(id.as_str(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_is_exclusive() {
        let ctx = OrchestratorContext::new();
        assert!(ctx.try_begin(ModuleId::AdBlocker));
        assert!(!ctx.try_begin(ModuleId::AdBlocker));
        assert!(ctx.try_begin(ModuleId::HumanWeb));
        ctx.finish(ModuleId::AdBlocker);
        assert_eq!(ctx.guard(ModuleId::AdBlocker), TransitionGuard::Idle);
        assert!(ctx.try_begin(ModuleId::AdBlocker));
    }

    #[test]
    fn lifecycle_starts_bootstrapping() {
        let ctx = OrchestratorContext::new();
        assert!(ctx.is_loading());
        let rx = ctx.subscribe();
        ctx.mark_running();
        assert_eq!(*rx.borrow(), Lifecycle::Running);
        assert!(!ctx.is_loading());
    }
}
