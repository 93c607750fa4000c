//! State shared by message handlers

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use warden_core::Result;
use warden_modules::ModuleOrchestrator;
use warden_pipeline::{PipelineInserter, TabActivity};
use warden_settings::ConfigStore;

/// Tab operations of the host.
#[async_trait]
pub trait TabControl: Send + Sync {
    async fn reload(&self, tab_id: i64) -> Result<()>;
}

/// Tab control for hosts without tabs.
pub struct NoopTabs;

#[async_trait]
impl TabControl for NoopTabs {
    async fn reload(&self, tab_id: i64) -> Result<()> {
        debug!(tab_id, "tab reload requested, no tab host attached");
        Ok(())
    }
}

pub struct RouterContext {
    pub orchestrator: Arc<ModuleOrchestrator>,
    pub activity: Arc<TabActivity>,
    pub pipeline: Arc<PipelineInserter>,
    pub tabs: Arc<dyn TabControl>,
}

impl RouterContext {
    pub fn store(&self) -> &Arc<ConfigStore> {
        self.orchestrator.store()
    }
}
