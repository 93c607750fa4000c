//! Known origins and routes

use serde::Serialize;
use std::fmt;

/// Front-end surface a message comes from.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    ClickToPlay,
    Panel,
    PageOverlay,
}

impl Origin {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "click_to_play" => Some(Origin::ClickToPlay),
            "panel" => Some(Origin::Panel),
            "page_overlay" => Some(Origin::PageOverlay),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::ClickToPlay => "click_to_play",
            Origin::Panel => "panel",
            Origin::PageOverlay => "page_overlay",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseMode {
    /// Reply produced before `dispatch` returns.
    Sync,
    /// Reply delivered later through the responder.
    Async,
}

/// Every `(origin, name)` pair the router understands.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Route {
    ProcessC2P,
    GetPanelData,
    SetPanelData,
    GetModuleStates,
    ExportSettings,
    ImportSettings,
    UpdateAlertConf,
    GetTabSummary,
    Ping,
    SetModuleEnabled,
    GetPipelineStatus,
    TabClosed,
    Unhandled,
}

impl Route {
    /// Resolve a message. A known origin only matches its own names; an
    /// absent or unknown origin falls through to the universal names.
    pub fn resolve(origin: Option<&str>, name: &str) -> Route {
        match origin.and_then(Origin::from_tag) {
            Some(Origin::ClickToPlay) => match name {
                "processC2P" => Route::ProcessC2P,
                _ => Route::Unhandled,
            },
            Some(Origin::Panel) => match name {
                "getPanelData" => Route::GetPanelData,
                "setPanelData" => Route::SetPanelData,
                "getModuleStates" => Route::GetModuleStates,
                "exportSettings" => Route::ExportSettings,
                "importSettings" => Route::ImportSettings,
                _ => Route::Unhandled,
            },
            Some(Origin::PageOverlay) => match name {
                "updateAlertConf" => Route::UpdateAlertConf,
                "getTabSummary" => Route::GetTabSummary,
                _ => Route::Unhandled,
            },
            None => match name {
                "ping" => Route::Ping,
                "setModuleEnabled" => Route::SetModuleEnabled,
                "getPipelineStatus" => Route::GetPipelineStatus,
                "tabClosed" => Route::TabClosed,
                _ => Route::Unhandled,
            },
        }
    }

    pub fn origin(&self) -> Option<Origin> {
        match self {
            Route::ProcessC2P => Some(Origin::ClickToPlay),
            Route::GetPanelData
            | Route::SetPanelData
            | Route::GetModuleStates
            | Route::ExportSettings
            | Route::ImportSettings => Some(Origin::Panel),
            Route::UpdateAlertConf | Route::GetTabSummary => Some(Origin::PageOverlay),
            Route::Ping
            | Route::SetModuleEnabled
            | Route::GetPipelineStatus
            | Route::TabClosed
            | Route::Unhandled => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Route::ProcessC2P => "processC2P",
            Route::GetPanelData => "getPanelData",
            Route::SetPanelData => "setPanelData",
            Route::GetModuleStates => "getModuleStates",
            Route::ExportSettings => "exportSettings",
            Route::ImportSettings => "importSettings",
            Route::UpdateAlertConf => "updateAlertConf",
            Route::GetTabSummary => "getTabSummary",
            Route::Ping => "ping",
            Route::SetModuleEnabled => "setModuleEnabled",
            Route::GetPipelineStatus => "getPipelineStatus",
            Route::TabClosed => "tabClosed",
            Route::Unhandled => "unhandled",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin() {
            Some(origin) => write!(f, "{}/{}", origin.as_str(), self.name()),
            None => f.write_str(self.name()),
        }
    }
}
