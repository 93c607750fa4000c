//! Pipeline step inserter
//!
//! Runs once at startup, after module bootstrap. Steps:
//!
//! 1. read which modules are enabled
//! 2. compute the `before` list of each stage from [`KNOWN_STEPS`](crate::KNOWN_STEPS)
//! 3. remove Warden's direct listener of the stage
//! 4. add Warden's step to the stage
//!
//! An unavailable facility fails the whole insertion before any listener is
//! touched. A stage whose insertion fails gets its direct listener back, so
//! interception continues unordered.

use crate::facility::{DirectListeners, PipelineFacility};
use crate::interceptor::{stage_descriptor, stage_handler, RequestInterceptor};
use crate::ordering::{self, OrderingPlan, StepRegistration, KNOWN_STEPS, OWNER};
use crate::step::Stage;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info, warn};
use warden_core::{Error, Result};
use warden_modules::ModuleRegistry;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum PipelineStatus {
    Pending,
    Pipelined,
    Degraded(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InsertionReport {
    pub plan: OrderingPlan,
    /// Stages whose direct listener was removed.
    pub replaced_listeners: Vec<Stage>,
}

pub struct PipelineInserter {
    facility: Arc<dyn PipelineFacility>,
    listeners: Arc<dyn DirectListeners>,
    registrations: Vec<StepRegistration>,
    started: AtomicBool,
    status: RwLock<PipelineStatus>,
}

impl PipelineInserter {
    pub fn new(facility: Arc<dyn PipelineFacility>, listeners: Arc<dyn DirectListeners>) -> Self {
        Self {
            facility,
            listeners,
            registrations: KNOWN_STEPS.to_vec(),
            started: AtomicBool::new(false),
            status: RwLock::new(PipelineStatus::Pending),
        }
    }

    pub fn with_registrations(mut self, registrations: Vec<StepRegistration>) -> Self {
        self.registrations = registrations;
        self
    }

    pub fn status(&self) -> PipelineStatus {
        self.status.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_status(&self, status: PipelineStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Register `interceptor` as direct listeners on both stages. Used until
    /// insertion moves it into the ordered pipeline.
    pub fn register_direct(&self, interceptor: &Arc<dyn RequestInterceptor>) {
        for stage in Stage::ALL {
            self.listeners
                .add_listener(stage, OWNER, stage_handler(interceptor.clone(), stage));
        }
    }

    /// Insert Warden's steps. Resolves once both stages succeed.
    pub async fn insert(
        &self,
        registry: &ModuleRegistry,
        interceptor: Arc<dyn RequestInterceptor>,
    ) -> Result<InsertionReport> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::pipeline_step("all", "pipeline steps already inserted"));
        }

        let enabled = registry.enabled_set();
        let plan = ordering::plan(&self.registrations, &enabled);

        if !self.facility.is_available() {
            error!("request pipeline unavailable, staying on direct listeners");
            self.set_status(PipelineStatus::Degraded(Error::PipelineUnavailable.to_string()));
            return Err(Error::PipelineUnavailable);
        }

        let mut replaced_listeners = Vec::new();
        for stage in Stage::ALL {
            let removed = self.listeners.remove_listener(stage, OWNER);
            if removed {
                replaced_listeners.push(stage);
            }

            let descriptor = stage_descriptor(interceptor.clone(), stage, plan.before(stage).to_vec());
            if let Err(e) = self.facility.add_pipeline_step(stage, descriptor).await {
                if removed {
                    self.listeners
                        .add_listener(stage, OWNER, stage_handler(interceptor.clone(), stage));
                }
                warn!(stage = %stage, error = %e, "pipeline insertion failed");
                self.set_status(PipelineStatus::Degraded(e.to_string()));
                return Err(e);
            }
        }

        info!(
            pre_send = ?plan.pre_send,
            headers_received = ?plan.headers_received,
            "pipeline steps inserted"
        );
        self.set_status(PipelineStatus::Pipelined);
        Ok(InsertionReport {
            plan,
            replaced_listeners,
        })
    }
}
