//! Pipeline step types

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Interception stage of a request.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Stage {
    #[serde(rename = "onBeforeRequest")]
    PreSend,
    #[serde(rename = "onHeadersReceived")]
    HeadersReceived,
}

impl Stage {
    pub const ALL: [Stage; 2] = [Stage::PreSend, Stage::HeadersReceived];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PreSend => "onBeforeRequest",
            Stage::HeadersReceived => "onHeadersReceived",
        }
    }

    /// Execution mode of Warden's own step at this stage.
    pub fn own_mode(&self) -> ExecutionMode {
        match self {
            Stage::PreSend => ExecutionMode::Blocking,
            Stage::HeadersReceived => ExecutionMode::Collect,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// May cancel or redirect the request.
    Blocking,
    /// Observe only.
    Collect,
}

/// What a step sees of the request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestState {
    pub tab_id: Option<i64>,
    pub url: String,
    pub host: String,
    pub status_code: Option<u16>,
}

impl RequestState {
    pub fn new(tab_id: Option<i64>, url: impl Into<String>) -> Self {
        let url = url.into();
        let host = host_of(&url);
        Self {
            tab_id,
            url,
            host,
            status_code: None,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

/// Lowercased host portion of a URL, without credentials or port.
pub fn host_of(url: &str) -> String {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit_once('@').map(|(_, h)| h).unwrap_or(authority);
    let host = if host.starts_with('[') {
        host.split_inclusive(']').next().unwrap_or(host)
    } else {
        host.split(':').next().unwrap_or(host)
    };
    host.to_ascii_lowercase()
}

/// Mutable response a blocking step may fill in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingResponse {
    pub cancel: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl BlockingResponse {
    pub fn is_empty(&self) -> bool {
        !self.cancel && self.redirect_url.is_none()
    }
}

/// Returns whether later steps should still run.
pub type BlockingFn = Arc<dyn Fn(&mut RequestState, &mut BlockingResponse) -> bool + Send + Sync>;
pub type CollectFn = Arc<dyn Fn(&RequestState) + Send + Sync>;

#[derive(Clone)]
pub enum StepHandler {
    Blocking(BlockingFn),
    Collect(CollectFn),
}

impl StepHandler {
    pub fn mode(&self) -> ExecutionMode {
        match self {
            StepHandler::Blocking(_) => ExecutionMode::Blocking,
            StepHandler::Collect(_) => ExecutionMode::Collect,
        }
    }
}

impl fmt::Debug for StepHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StepHandler::{:?}", self.mode())
    }
}

#[derive(Clone, Debug)]
pub struct StepDescriptor {
    pub name: String,
    /// Steps that must have run before this one.
    pub before: Vec<String>,
    pub handler: StepHandler,
}

impl StepDescriptor {
    pub fn new(name: impl Into<String>, before: Vec<String>, handler: StepHandler) -> Self {
        Self {
            name: name.into(),
            before,
            handler,
        }
    }

    pub fn blocking<F>(name: impl Into<String>, before: Vec<String>, f: F) -> Self
    where
        F: Fn(&mut RequestState, &mut BlockingResponse) -> bool + Send + Sync + 'static,
    {
        Self::new(name, before, StepHandler::Blocking(Arc::new(f)))
    }

    pub fn collect<F>(name: impl Into<String>, before: Vec<String>, f: F) -> Self
    where
        F: Fn(&RequestState) + Send + Sync + 'static,
    {
        Self::new(name, before, StepHandler::Collect(Arc::new(f)))
    }

    pub fn mode(&self) -> ExecutionMode {
        self.handler.mode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_extraction() {
        assert_eq!(host_of("https://Ads.Example.com/path?q=1"), "ads.example.com");
        assert_eq!(host_of("http://user:pw@tracker.net:8080/x"), "tracker.net");
        assert_eq!(host_of("example.org"), "example.org");
        assert_eq!(host_of("http://[::1]:80/"), "[::1]");
    }

    #[test]
    fn descriptor_mode_follows_handler() {
        let step = StepDescriptor::collect("x", vec![], |_| {});
        assert_eq!(step.mode(), ExecutionMode::Collect);
        let step = StepDescriptor::blocking("y", vec![], |_, _| true);
        assert_eq!(step.mode(), ExecutionMode::Blocking);
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::PreSend.to_string(), "onBeforeRequest");
        assert_eq!(Stage::HeadersReceived.own_mode(), ExecutionMode::Collect);
    }
}
