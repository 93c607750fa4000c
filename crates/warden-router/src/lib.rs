//! Warden Router - inbound message dispatch
//!
//! Messages from front-end surfaces are resolved to a closed [`Route`] by
//! `(origin, name)` and handed to the handler registered for that route.

pub mod context;
pub mod handlers;
pub mod route;
pub mod router;
pub mod table;

pub use context::{NoopTabs, RouterContext, TabControl};
pub use route::{Origin, ResponseMode, Route};
pub use router::{FollowUpSink, MessageRouter, OutboundQueue, Responder, RouterConfig};
pub use table::{Handler, HandlerTable};
