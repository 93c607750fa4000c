//! Change dispatcher: per-setting fan-out of change events
//!
//! Handlers subscribed to a setting run synchronously, in subscription order,
//! on the same turn as the `set` that triggered them. A handler that fails or
//! panics is logged and the remaining handlers still run.

use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use warden_core::{Error, Result, SettingKey, SettingValue};

/// Callback invoked with the new value of a setting.
pub type ChangeHandler = Arc<dyn Fn(&SettingValue) -> Result<()> + Send + Sync>;

#[derive(Default)]
pub struct ChangeDispatcher {
    handlers: DashMap<SettingKey, Vec<ChangeHandler>>,
}

impl ChangeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `topic`. Handlers run in registration order.
    pub fn subscribe<F>(&self, topic: SettingKey, handler: F)
    where
        F: Fn(&SettingValue) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers.entry(topic).or_default().push(Arc::new(handler));
    }

    /// Register a trailing-debounced handler.
    ///
    /// Changes arriving less than `window` apart are coalesced; the handler
    /// sees only the last value of the burst, once the window has elapsed
    /// without a further change. Must be called from within a Tokio runtime.
    pub fn debounced_subscribe<F>(&self, topic: SettingKey, window: Duration, handler: F)
    where
        F: Fn(&SettingValue) -> Result<()> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<SettingValue>();
        tokio::spawn(run_debounced(topic, window, rx, handler));
        self.subscribe(topic, move |value| {
            tx.send(value.clone())
                .map_err(|_| Error::Internal(format!("debounce worker for {} stopped", topic)))
        });
    }

    /// Deliver `value` to every handler of `topic`. Returns how many handlers
    /// completed without error.
    pub fn publish(&self, topic: SettingKey, value: &SettingValue) -> usize {
        // Clone the list out so handlers may subscribe or publish re-entrantly.
        let handlers = match self.handlers.get(&topic) {
            Some(entry) => entry.value().clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for (index, handler) in handlers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler(value))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(key = %topic, handler = index, error = %e, "change handler failed")
                }
                Err(_) => warn!(key = %topic, handler = index, "change handler panicked"),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: SettingKey) -> usize {
        self.handlers.get(&topic).map(|h| h.len()).unwrap_or(0)
    }
}

async fn run_debounced<F>(
    topic: SettingKey,
    window: Duration,
    mut rx: mpsc::UnboundedReceiver<SettingValue>,
    handler: F,
) where
    F: Fn(&SettingValue) -> Result<()>,
{
    while let Some(first) = rx.recv().await {
        let mut latest = first;
        let mut closed = false;
        loop {
            match tokio::time::timeout(window, rx.recv()).await {
                Ok(Some(next)) => latest = next,
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        debug!(key = %topic, "delivering debounced change");
        if let Err(e) = handler(&latest) {
            warn!(key = %topic, error = %e, "debounced change handler failed");
        }
        if closed {
            return;
        }
    }
}
