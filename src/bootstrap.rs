//! Startup sequence
//!
//! 1. load persisted settings
//! 2. build modules with the site allowlist injected
//! 3. attach the orchestrator and start the configured modules
//! 4. insert the interception steps (degraded on failure)
//! 5. leave the loading phase and reconcile module states
//!
//! Setting changes made before step 5 are recorded but start no transition.

use crate::config::WardenConfig;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use warden_core::{AllowlistPredicate, ModuleId, Result};
use warden_modules::{
    CapabilityModule, InProcessModule, ModuleOrchestrator, ModuleRegistry, OrchestratorContext,
    ReconcileReport, SiteAllowlist,
};
use warden_pipeline::{
    BlockPredicate, DirectListeners, PipelineFacility, PipelineInserter, PipelineStatus,
    RequestInterceptor, RequestPipeline, TabActivity,
};
use warden_router::{FollowUpSink, MessageRouter, NoopTabs, RouterContext, TabControl};
use warden_settings::{ChangeDispatcher, ConfigStore, MemoryBackend, SettingsBackend};

/// Builds the capability modules, given the allowlist predicate to inject.
pub type ModuleFactory = Box<dyn FnOnce(AllowlistPredicate) -> Vec<Arc<dyn CapabilityModule>> + Send>;

/// External collaborators the runtime is wired to.
pub struct Collaborators {
    pub backend: Arc<dyn SettingsBackend>,
    pub facility: Arc<dyn PipelineFacility>,
    pub listeners: Arc<dyn DirectListeners>,
    pub tabs: Arc<dyn TabControl>,
    pub follow_ups: Option<Arc<dyn FollowUpSink>>,
    pub blocker: Option<BlockPredicate>,
    pub modules: ModuleFactory,
}

impl Collaborators {
    /// In-process modules, the in-memory pipeline and a settings backend
    /// seeded from the config's `[settings]` table.
    pub fn in_process(config: &WardenConfig) -> (Self, Arc<RequestPipeline>) {
        let pipeline = Arc::new(RequestPipeline::new());
        let collaborators = Self {
            backend: Arc::new(MemoryBackend::seeded(config.initial_settings())),
            facility: pipeline.clone(),
            listeners: pipeline.clone(),
            tabs: Arc::new(NoopTabs),
            follow_ups: None,
            blocker: None,
            modules: Box::new(in_process_modules),
        };
        (collaborators, pipeline)
    }
}

pub fn in_process_modules(allowlist: AllowlistPredicate) -> Vec<Arc<dyn CapabilityModule>> {
    ModuleId::ALL
        .iter()
        .map(|id| {
            Arc::new(InProcessModule::new(*id).with_allowlist(allowlist.clone()))
                as Arc<dyn CapabilityModule>
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct BootReport {
    pub settings_loaded: usize,
    pub modules_started: usize,
    pub pipeline: PipelineStatus,
    pub reconcile: ReconcileReport,
}

pub struct Runtime {
    pub store: Arc<ConfigStore>,
    pub allowlist: Arc<SiteAllowlist>,
    pub orchestrator: Arc<ModuleOrchestrator>,
    pub activity: Arc<TabActivity>,
    pub inserter: Arc<PipelineInserter>,
    pub router: MessageRouter,
    pub report: BootReport,
}

pub async fn boot(config: &WardenConfig, collaborators: Collaborators) -> Result<Runtime> {
    let Collaborators {
        backend,
        facility,
        listeners,
        tabs,
        follow_ups,
        blocker,
        modules,
    } = collaborators;

    let store = Arc::new(ConfigStore::with_backend(Arc::new(ChangeDispatcher::new()), backend));
    let settings_loaded = store.load_from_backend().await?;

    let allowlist = SiteAllowlist::new();
    allowlist.attach(&store, config.orchestrator.allowlist_debounce());

    let registry = Arc::new(modules(allowlist.predicate()).into_iter().collect::<ModuleRegistry>());
    let orchestrator = ModuleOrchestrator::new(
        Arc::new(OrchestratorContext::new()),
        registry.clone(),
        store.clone(),
    );
    orchestrator.attach();
    let modules_started = orchestrator.boot_modules().await;

    let mut activity = TabActivity::new().with_allowlist(allowlist.predicate());
    if let Some(blocker) = blocker {
        activity = activity.with_blocker(blocker);
    }
    let activity = Arc::new(activity);
    let interceptor: Arc<dyn RequestInterceptor> = activity.clone();

    let inserter = Arc::new(PipelineInserter::new(facility, listeners));
    inserter.register_direct(&interceptor);
    if let Err(e) = inserter.insert(&registry, interceptor).await {
        error!(error = %e, "pipeline insertion failed, continuing with direct listeners");
    }

    let reconcile = orchestrator.finish_bootstrap().await;

    let ctx = RouterContext {
        orchestrator: orchestrator.clone(),
        activity: activity.clone(),
        pipeline: inserter.clone(),
        tabs,
    };
    let mut router = MessageRouter::new(Arc::new(ctx), config.router.clone());
    if let Some(sink) = follow_ups {
        router = router.with_follow_ups(sink);
    }

    let report = BootReport {
        settings_loaded,
        modules_started,
        pipeline: inserter.status(),
        reconcile,
    };
    info!(
        settings = report.settings_loaded,
        modules = report.modules_started,
        pipeline = ?report.pipeline,
        "warden ready"
    );

    Ok(Runtime {
        store,
        allowlist,
        orchestrator,
        activity,
        inserter,
        router,
        report,
    })
}
