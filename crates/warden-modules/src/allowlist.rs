//! Site allowlist predicate
//!
//! Hosts the user trusts. Fed by a debounced subscription on
//! `site_allowlist` and handed out as an [`AllowlistPredicate`] to modules and
//! to the request interceptor at construction time.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;
use warden_core::{AllowlistPredicate, SettingKey};
use warden_settings::ConfigStore;

#[derive(Debug, Default)]
pub struct SiteAllowlist {
    hosts: RwLock<BTreeSet<String>>,
}

impl SiteAllowlist {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed from the store's current value and follow later changes,
    /// coalescing bursts shorter than `window`.
    pub fn attach(self: &Arc<Self>, store: &ConfigStore, window: Duration) {
        self.replace(store.get_list(SettingKey::SiteAllowlist));

        let weak = Arc::downgrade(self);
        store
            .dispatcher()
            .debounced_subscribe(SettingKey::SiteAllowlist, window, move |value| {
                if let Some(allowlist) = weak.upgrade() {
                    allowlist.replace(value.string_list());
                }
                Ok(())
            });
    }

    pub fn replace(&self, hosts: impl IntoIterator<Item = String>) {
        let normalized: BTreeSet<String> = hosts
            .into_iter()
            .map(|h| normalize(&h))
            .filter(|h| !h.is_empty())
            .collect();
        debug!(hosts = normalized.len(), "site allowlist updated");
        *self.hosts.write().unwrap_or_else(PoisonError::into_inner) = normalized;
    }

    /// True when `host` equals an entry or is a subdomain of one.
    pub fn contains(&self, host: &str) -> bool {
        let host = normalize(host);
        if host.is_empty() {
            return false;
        }
        let hosts = self.hosts.read().unwrap_or_else(PoisonError::into_inner);
        if hosts.contains(&host) {
            return true;
        }
        let mut rest = host.as_str();
        while let Some((_, parent)) = rest.split_once('.') {
            if hosts.contains(parent) {
                return true;
            }
            rest = parent;
        }
        false
    }

    pub fn predicate(self: &Arc<Self>) -> AllowlistPredicate {
        let allowlist = Arc::clone(self);
        Arc::new(move |host: &str| allowlist.contains(host))
    }

    pub fn len(&self) -> usize {
        self.hosts.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}
