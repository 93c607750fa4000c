//! Warden's own request interceptor
//!
//! [`TabActivity`] counts requests per tab and cancels the ones an injected
//! [`BlockPredicate`] rejects, unless the page host is allowlisted. It also
//! holds the per-tab click-to-play allowances granted with "once" and hands
//! them to the predicate with every request of that tab.

use crate::ordering::own_step_name;
use crate::step::{BlockingResponse, RequestState, Stage, StepDescriptor, StepHandler};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::trace;
use warden_core::AllowlistPredicate;

/// Decides whether a request should be cancelled, given the click-to-play
/// apps allowed once in the request's tab.
pub type BlockPredicate = Arc<dyn Fn(&RequestState, &BTreeSet<u64>) -> bool + Send + Sync>;

pub trait RequestInterceptor: Send + Sync {
    /// Returns whether later steps should still run.
    fn on_before_request(&self, state: &mut RequestState, response: &mut BlockingResponse) -> bool;

    fn on_headers_received(&self, state: &RequestState);
}

/// Handler that forwards `stage` to `interceptor`.
pub fn stage_handler(interceptor: Arc<dyn RequestInterceptor>, stage: Stage) -> StepHandler {
    match stage {
        Stage::PreSend => StepHandler::Blocking(Arc::new(move |state, response| {
            interceptor.on_before_request(state, response)
        })),
        Stage::HeadersReceived => {
            StepHandler::Collect(Arc::new(move |state| interceptor.on_headers_received(state)))
        }
    }
}

pub fn stage_descriptor(
    interceptor: Arc<dyn RequestInterceptor>,
    stage: Stage,
    before: Vec<String>,
) -> StepDescriptor {
    StepDescriptor::new(own_step_name(stage), before, stage_handler(interceptor, stage))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TabSummary {
    pub observed: u64,
    pub blocked: u64,
    pub responses: u64,
}

#[derive(Default)]
pub struct TabActivity {
    tabs: DashMap<i64, TabSummary>,
    allowed_apps: DashMap<i64, BTreeSet<u64>>,
    allowlist: Option<AllowlistPredicate>,
    blocker: Option<BlockPredicate>,
}

impl TabActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allowlist(mut self, allowlist: AllowlistPredicate) -> Self {
        self.allowlist = Some(allowlist);
        self
    }

    pub fn with_blocker(mut self, blocker: BlockPredicate) -> Self {
        self.blocker = Some(blocker);
        self
    }

    pub fn summary(&self, tab_id: i64) -> Option<TabSummary> {
        self.tabs.get(&tab_id).map(|s| *s)
    }

    pub fn summaries(&self) -> BTreeMap<i64, TabSummary> {
        self.tabs.iter().map(|e| (*e.key(), *e.value())).collect()
    }

    /// Forget the counters of a tab, e.g. on reload. Allowances survive.
    pub fn reset_tab(&self, tab_id: i64) {
        self.tabs.remove(&tab_id);
    }

    /// Allow the given click-to-play apps in `tab_id` until the tab closes.
    pub fn allow_once(&self, tab_id: i64, app_ids: impl IntoIterator<Item = u64>) {
        self.allowed_apps.entry(tab_id).or_default().extend(app_ids);
    }

    pub fn allowed_apps(&self, tab_id: i64) -> BTreeSet<u64> {
        self.allowed_apps
            .get(&tab_id)
            .map(|apps| apps.clone())
            .unwrap_or_default()
    }

    /// Drop everything held for a closed tab. Returns whether anything was held.
    pub fn close_tab(&self, tab_id: i64) -> bool {
        let counters = self.tabs.remove(&tab_id).is_some();
        let allowances = self.allowed_apps.remove(&tab_id).is_some();
        counters || allowances
    }

    /// Number of tabs with counters or allowances.
    pub fn tracked_tabs(&self) -> usize {
        let mut ids: BTreeSet<i64> = self.tabs.iter().map(|e| *e.key()).collect();
        ids.extend(self.allowed_apps.iter().map(|e| *e.key()));
        ids.len()
    }

    fn record(&self, tab_id: Option<i64>, update: impl FnOnce(&mut TabSummary)) {
        if let Some(tab_id) = tab_id {
            let mut entry = self.tabs.entry(tab_id).or_default();
            update(entry.value_mut());
        }
    }

    fn is_allowlisted(&self, host: &str) -> bool {
        self.allowlist.as_ref().is_some_and(|allowed| allowed(host))
    }
}

impl RequestInterceptor for TabActivity {
    fn on_before_request(&self, state: &mut RequestState, response: &mut BlockingResponse) -> bool {
        self.record(state.tab_id, |s| s.observed += 1);
        if self.is_allowlisted(&state.host) {
            return true;
        }
        let Some(blocks) = &self.blocker else {
            return true;
        };
        let allowed = state.tab_id.map(|tab| self.allowed_apps(tab)).unwrap_or_default();
        if !blocks(state, &allowed) {
            return true;
        }
        trace!(url = %state.url, "request cancelled");
        response.cancel = true;
        self.record(state.tab_id, |s| s.blocked += 1);
        false
    }

    fn on_headers_received(&self, state: &RequestState) {
        self.record(state.tab_id, |s| s.responses += 1);
    }
}
