//! Message router
//!
//! `dispatch` returns whether the caller must keep its response channel open:
//! `true` only for an async handler when a responder was supplied. Sync
//! handlers reply before `dispatch` returns.
//!
//! On legacy platforms a secondary host instance cannot rely on the callback.
//! When such a sender supplies a `messageId`, the reply is re-addressed as a
//! [`FollowUp`] to the sender's tab, or to the panel when there is no tab.

use crate::context::RouterContext;
use crate::route::Route;
use crate::table::{Handler, HandlerTable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use warden_core::{Destination, FollowUp, InboundMessage, Reply, Result, SenderContext};

/// Callback that delivers a reply to the sender.
pub type Responder = Box<dyn FnOnce(Reply) + Send>;

/// Outbound channel for follow-up messages.
pub trait FollowUpSink: Send + Sync {
    fn send(&self, follow_up: FollowUp);
}

/// Follow-up sink backed by an unbounded channel.
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<FollowUp>,
}

impl OutboundQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FollowUp>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FollowUpSink for OutboundQueue {
    fn send(&self, follow_up: FollowUp) {
        if self.tx.send(follow_up).is_err() {
            warn!("follow-up receiver dropped");
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Host platform cannot deliver callbacks to secondary instances.
    pub legacy_platform: bool,
}

pub struct MessageRouter {
    ctx: Arc<RouterContext>,
    table: HandlerTable,
    config: RouterConfig,
    follow_ups: Option<Arc<dyn FollowUpSink>>,
}

impl MessageRouter {
    pub fn new(ctx: Arc<RouterContext>, config: RouterConfig) -> Self {
        Self {
            ctx,
            table: HandlerTable::standard(),
            config,
            follow_ups: None,
        }
    }

    pub fn with_follow_ups(mut self, sink: Arc<dyn FollowUpSink>) -> Self {
        self.follow_ups = Some(sink);
        self
    }

    pub fn context(&self) -> &Arc<RouterContext> {
        &self.ctx
    }

    fn follow_up_responder(&self, message: &InboundMessage, sender: &SenderContext) -> Option<Responder> {
        if !self.config.legacy_platform || !sender.secondary_instance {
            return None;
        }
        let message_id = message.message_id.clone()?;
        let Some(sink) = self.follow_ups.clone() else {
            warn!(name = %message.name, "follow-up required but no sink attached");
            return None;
        };
        let destination = match sender.tab_id {
            Some(tab_id) => Destination::Tab(tab_id),
            None => Destination::Panel,
        };
        let name = message.name.clone();
        Some(Box::new(move |reply| {
            sink.send(FollowUp {
                destination,
                name,
                message_id,
                reply,
            })
        }))
    }

    /// Route one message. See the module docs for the return value.
    pub fn dispatch(
        &self,
        message: InboundMessage,
        sender: SenderContext,
        respond: Option<Responder>,
    ) -> bool {
        let route = Route::resolve(message.origin.as_deref(), &message.name);
        let Some(handler) = self.table.get(route) else {
            debug!(origin = ?message.origin, name = %message.name, "unhandled message");
            return false;
        };

        let (respond, follow_up) = match self.follow_up_responder(&message, &sender) {
            Some(responder) => (Some(responder), true),
            None => (respond, false),
        };
        debug!(route = %route, follow_up, "dispatching message");

        let payload = message.message;
        match handler {
            Handler::Sync(handle) => {
                let reply = to_reply(route, handle(&self.ctx, payload, &sender));
                if let Some(respond) = respond {
                    respond(reply);
                }
                false
            }
            Handler::Async(handle) => {
                let runtime = match tokio::runtime::Handle::try_current() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        warn!(route = %route, error = %e, "no runtime for async handler");
                        if let Some(respond) = respond {
                            respond(Reply::error("background runtime unavailable"));
                        }
                        return false;
                    }
                };
                let pending = respond.is_some() && !follow_up;
                let future = handle(self.ctx.clone(), payload, sender);
                runtime.spawn(async move {
                    let reply = to_reply(route, future.await);
                    if let Some(respond) = respond {
                        respond(reply);
                    }
                });
                pending
            }
        }
    }
}

fn to_reply(route: Route, result: Result<serde_json::Value>) -> Reply {
    match result {
        Ok(value) => Reply::ok(value),
        Err(e) => {
            warn!(route = %route, error = %e, "handler failed");
            Reply::error(e.to_string())
        }
    }
}
