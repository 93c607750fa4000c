//! Pipeline facility contracts and the in-memory request pipeline

use crate::step::{BlockingResponse, RequestState, Stage, StepDescriptor, StepHandler};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, trace};
use warden_core::{Error, Result};

/// The ordered step facility of the host.
#[async_trait]
pub trait PipelineFacility: Send + Sync {
    fn is_available(&self) -> bool;

    async fn add_pipeline_step(&self, stage: Stage, step: StepDescriptor) -> Result<()>;
}

/// Plain, unordered listeners registered outside the pipeline.
pub trait DirectListeners: Send + Sync {
    fn add_listener(&self, stage: Stage, owner: &str, handler: StepHandler);

    /// Returns whether a listener was registered.
    fn remove_listener(&self, stage: Stage, owner: &str) -> bool;

    fn has_listener(&self, stage: Stage, owner: &str) -> bool;
}

/// In-memory pipeline with direct listener support.
///
/// A new step is placed right after the last step of its `before` list that
/// is already present, or appended when none is. Direct listeners run after
/// the ordered steps.
pub struct RequestPipeline {
    available: AtomicBool,
    steps: RwLock<BTreeMap<Stage, Vec<StepDescriptor>>>,
    listeners: DashMap<(Stage, String), StepHandler>,
}

impl Default for RequestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestPipeline {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            steps: RwLock::new(BTreeMap::new()),
            listeners: DashMap::new(),
        }
    }

    /// A pipeline whose ordered facility is switched off.
    pub fn unavailable() -> Self {
        let pipeline = Self::new();
        pipeline.set_available(false);
        pipeline
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn step_names(&self, stage: Stage) -> Vec<String> {
        self.steps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&stage)
            .map(|steps| steps.iter().map(|s| s.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn listener_owners(&self, stage: Stage) -> Vec<String> {
        let mut owners: Vec<String> = self
            .listeners
            .iter()
            .filter(|e| e.key().0 == stage)
            .map(|e| e.key().1.clone())
            .collect();
        owners.sort();
        owners
    }

    fn handlers(&self, stage: Stage) -> Vec<(String, StepHandler)> {
        let mut handlers: Vec<(String, StepHandler)> = self
            .steps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&stage)
            .map(|steps| {
                steps
                    .iter()
                    .map(|s| (s.name.clone(), s.handler.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let mut direct: Vec<(String, StepHandler)> = self
            .listeners
            .iter()
            .filter(|e| e.key().0 == stage)
            .map(|e| (e.key().1.clone(), e.value().clone()))
            .collect();
        direct.sort_by(|a, b| a.0.cmp(&b.0));
        handlers.extend(direct);
        handlers
    }

    /// Run every pre-send step in order until one asks to stop.
    pub fn run_pre_send(&self, state: &mut RequestState) -> BlockingResponse {
        let mut response = BlockingResponse::default();
        for (name, handler) in self.handlers(Stage::PreSend) {
            let proceed = match handler {
                StepHandler::Blocking(f) => f(state, &mut response),
                StepHandler::Collect(f) => {
                    f(state);
                    true
                }
            };
            if !proceed {
                trace!(step = %name, url = %state.url, "pipeline stopped");
                break;
            }
        }
        response
    }

    /// Run every headers-received step. Blocking handlers see a scratch
    /// response that is discarded.
    pub fn run_headers_received(&self, state: &RequestState) {
        for (name, handler) in self.handlers(Stage::HeadersReceived) {
            match handler {
                StepHandler::Collect(f) => f(state),
                StepHandler::Blocking(f) => {
                    let mut scratch = state.clone();
                    if !f(&mut scratch, &mut BlockingResponse::default()) {
                        trace!(step = %name, "pipeline stopped");
                        break;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl PipelineFacility for RequestPipeline {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn add_pipeline_step(&self, stage: Stage, step: StepDescriptor) -> Result<()> {
        if !self.is_available() {
            return Err(Error::PipelineUnavailable);
        }

        let mut steps = self.steps.write().unwrap_or_else(PoisonError::into_inner);
        let stage_steps = steps.entry(stage).or_default();
        if stage_steps.iter().any(|s| s.name == step.name) {
            return Err(Error::pipeline_step(
                stage.as_str(),
                format!("step {} already registered", step.name),
            ));
        }

        let position = stage_steps
            .iter()
            .rposition(|s| step.before.contains(&s.name))
            .map(|i| i + 1)
            .unwrap_or(stage_steps.len());
        debug!(stage = %stage, step = %step.name, position, "pipeline step added");
        stage_steps.insert(position, step);
        Ok(())
    }
}

impl DirectListeners for RequestPipeline {
    fn add_listener(&self, stage: Stage, owner: &str, handler: StepHandler) {
        self.listeners.insert((stage, owner.to_string()), handler);
    }

    fn remove_listener(&self, stage: Stage, owner: &str) -> bool {
        self.listeners.remove(&(stage, owner.to_string())).is_some()
    }

    fn has_listener(&self, stage: Stage, owner: &str) -> bool {
        self.listeners.contains_key(&(stage, owner.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn trace_step(name: &str, log: &Arc<Mutex<Vec<String>>>, before: &[&str]) -> StepDescriptor {
        let log = log.clone();
        let label = name.to_string();
        StepDescriptor::collect(
            name,
            before.iter().map(|s| s.to_string()).collect(),
            move |_| log.lock().unwrap().push(label.clone()),
        )
    }

    #[tokio::test]
    async fn step_lands_after_its_last_predecessor() {
        let pipeline = RequestPipeline::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        pipeline.add_pipeline_step(Stage::PreSend, trace_step("a", &log, &[])).await.unwrap();
        pipeline.add_pipeline_step(Stage::PreSend, trace_step("b", &log, &[])).await.unwrap();
        pipeline.add_pipeline_step(Stage::PreSend, trace_step("c", &log, &[])).await.unwrap();
        pipeline.add_pipeline_step(Stage::PreSend, trace_step("own", &log, &["a"])).await.unwrap();

        assert_eq!(pipeline.step_names(Stage::PreSend), vec!["a", "own", "b", "c"]);
        pipeline.run_pre_send(&mut RequestState::new(Some(1), "https://x.test/"));
        assert_eq!(*log.lock().unwrap(), vec!["a", "own", "b", "c"]);
    }

    #[tokio::test]
    async fn duplicate_step_is_rejected() {
        let pipeline = RequestPipeline::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        pipeline.add_pipeline_step(Stage::PreSend, trace_step("a", &log, &[])).await.unwrap();
        let err = pipeline
            .add_pipeline_step(Stage::PreSend, trace_step("a", &log, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PipelineStep { .. }));
    }

    #[tokio::test]
    async fn unavailable_pipeline_refuses_steps() {
        let pipeline = RequestPipeline::unavailable();
        let log = Arc::new(Mutex::new(Vec::new()));
        let err = pipeline
            .add_pipeline_step(Stage::HeadersReceived, trace_step("a", &log, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PipelineUnavailable));
    }

    #[test]
    fn blocking_step_can_stop_the_pipeline() {
        let pipeline = RequestPipeline::new();
        pipeline.add_listener(
            Stage::PreSend,
            "blocker",
            StepHandler::Blocking(Arc::new(|_, response| {
                response.cancel = true;
                false
            })),
        );
        let reached = Arc::new(Mutex::new(false));
        let flag = reached.clone();
        pipeline.add_listener(
            Stage::PreSend,
            "observer",
            StepHandler::Collect(Arc::new(move |_| *flag.lock().unwrap() = true)),
        );

        let response = pipeline.run_pre_send(&mut RequestState::new(None, "https://ads.test/"));
        assert!(response.cancel);
        assert!(!*reached.lock().unwrap());
    }

    #[test]
    fn direct_listeners_add_and_remove() {
        let pipeline = RequestPipeline::new();
        pipeline.add_listener(Stage::HeadersReceived, "warden", StepHandler::Collect(Arc::new(|_| {})));
        assert!(pipeline.has_listener(Stage::HeadersReceived, "warden"));
        assert!(!pipeline.has_listener(Stage::PreSend, "warden"));
        assert!(pipeline.remove_listener(Stage::HeadersReceived, "warden"));
        assert!(!pipeline.remove_listener(Stage::HeadersReceived, "warden"));
    }
}
