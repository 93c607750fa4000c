//! Handler table
//!
//! Built once when the router is created and never mutated afterwards.

use crate::context::RouterContext;
use crate::handlers::{click_to_play, page_overlay, panel, settings_io, universal};
use crate::route::{ResponseMode, Route};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use warden_core::{Result, SenderContext};

pub type SyncHandler = fn(&RouterContext, Option<Value>, &SenderContext) -> Result<Value>;
pub type AsyncHandler =
    fn(Arc<RouterContext>, Option<Value>, SenderContext) -> BoxFuture<'static, Result<Value>>;

#[derive(Clone, Copy)]
pub enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

impl Handler {
    pub fn mode(&self) -> ResponseMode {
        match self {
            Handler::Sync(_) => ResponseMode::Sync,
            Handler::Async(_) => ResponseMode::Async,
        }
    }
}

pub struct HandlerTable {
    handlers: HashMap<Route, Handler>,
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl HandlerTable {
    pub fn standard() -> Self {
        let handlers = HashMap::from([
            (Route::ProcessC2P, Handler::Async(click_to_play::process_c2p)),
            (Route::GetPanelData, Handler::Async(panel::get_panel_data)),
            (Route::SetPanelData, Handler::Sync(panel::set_panel_data)),
            (Route::GetModuleStates, Handler::Sync(panel::get_module_states)),
            (Route::ExportSettings, Handler::Sync(settings_io::export_settings)),
            (Route::ImportSettings, Handler::Sync(settings_io::import_settings)),
            (Route::UpdateAlertConf, Handler::Sync(page_overlay::update_alert_conf)),
            (Route::GetTabSummary, Handler::Sync(page_overlay::get_tab_summary)),
            (Route::Ping, Handler::Sync(universal::ping)),
            (Route::SetModuleEnabled, Handler::Sync(universal::set_module_enabled)),
            (Route::GetPipelineStatus, Handler::Sync(universal::get_pipeline_status)),
            (Route::TabClosed, Handler::Sync(universal::tab_closed)),
        ]);
        Self { handlers }
    }

    pub fn get(&self, route: Route) -> Option<Handler> {
        self.handlers.get(&route).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
