//! Periodic refresh scheduler
//!
//! Each task gets its own interval loop. A tick spawns a run and does not
//! wait for the previous one, and missed ticks are skipped rather than
//! replayed. A run is abandoned once it has taken a full period, so a hung
//! run never outlives the next one. Failures are logged and retried on the
//! next tick.

use crate::config::SchedulerConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_core::{Error, Result, SettingKey, SettingValue};
use warden_modules::ModuleOrchestrator;
use warden_settings::ConfigStore;

#[async_trait]
pub trait ScheduledTask: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

/// Fetch a JSON document and store it under a setting.
pub struct RemoteRefresh {
    name: String,
    url: String,
    key: SettingKey,
    client: reqwest::Client,
    store: Arc<ConfigStore>,
}

impl RemoteRefresh {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        key: SettingKey,
        client: reqwest::Client,
        store: Arc<ConfigStore>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            key,
            client,
            store,
        }
    }

    fn failure(&self, e: impl std::fmt::Display) -> Error {
        Error::scheduled_task(&self.name, format!("{}: {}", self.url, e))
    }
}

#[async_trait]
impl ScheduledTask for RemoteRefresh {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<()> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.failure(e))?;
        let body: serde_json::Value = response.json().await.map_err(|e| self.failure(e))?;
        self.store.set(self.key, SettingValue::Record(body))?;
        debug!(task = %self.name, key = %self.key, "remote data refreshed");
        Ok(())
    }
}

/// Periodic re-evaluation of the telemetry bundle.
pub struct TelemetryRefresh {
    orchestrator: Arc<ModuleOrchestrator>,
}

impl TelemetryRefresh {
    pub fn new(orchestrator: Arc<ModuleOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl ScheduledTask for TelemetryRefresh {
    fn name(&self) -> &str {
        "telemetry"
    }

    async fn run(&self) -> Result<()> {
        self.orchestrator.recompute_telemetry().await?;
        Ok(())
    }
}

pub struct Scheduler {
    period: Duration,
    tasks: Vec<Arc<dyn ScheduledTask>>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            tasks: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Telemetry refresh plus one remote refresh per configured URL.
    pub fn from_config(
        config: &SchedulerConfig,
        store: Arc<ConfigStore>,
        orchestrator: Arc<ModuleOrchestrator>,
    ) -> Self {
        let mut scheduler = Self::new(config.interval());
        scheduler.add(Arc::new(TelemetryRefresh::new(orchestrator)));

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build http client; using defaults");
                reqwest::Client::new()
            });
        let remotes = [
            ("ab-tests", &config.ab_tests_url, SettingKey::AbTestConfig),
            ("cmp", &config.cmp_url, SettingKey::CmpData),
            ("library", &config.library_url, SettingKey::LibraryManifest),
        ];
        for (name, url, key) in remotes {
            if let Some(url) = url {
                scheduler.add(Arc::new(RemoteRefresh::new(
                    name,
                    url.as_str(),
                    key,
                    client.clone(),
                    store.clone(),
                )));
            }
        }
        scheduler
    }

    pub fn add(&mut self, task: Arc<dyn ScheduledTask>) {
        self.tasks.push(task);
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn one loop per task. The first run happens immediately.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        info!(tasks = self.tasks.len(), period_secs = self.period.as_secs(), "scheduler started");
        self.tasks
            .iter()
            .map(|task| tokio::spawn(run_loop(task.clone(), self.period, self.cancel.clone())))
            .collect()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

async fn run_loop(task: Arc<dyn ScheduledTask>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(task = %task.name(), "scheduled task stopped");
                return;
            }
            _ = ticker.tick() => {
                let task = task.clone();
                tokio::spawn(async move {
                    match tokio::time::timeout(period, task.run()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!(task = %task.name(), error = %e, "scheduled task failed"),
                        Err(_) => warn!(task = %task.name(), "scheduled task timed out"),
                    }
                });
            }
        }
    }
}
