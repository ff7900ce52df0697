//! # routed_events
//!
//! An in-process publish/subscribe event dispatch engine. Components talk
//! through name-addressed events; each dispatch is delivered by one of three
//! policies:
//!
//! - a synchronous call of the in-process listeners,
//! - fire-and-forget execution on a bounded worker pool,
//! - forwarding to an external broker through a [`bus::Publisher`].
//!
//! A pattern [`router::Router`] decides the policy per event name unless
//! the caller forces one with [`DispatchOptions`].
//!
//! ## Quick start
//!
//! ```
//! use chrono::{DateTime, Utc};
//! use routed_events::bus::InMemoryBus;
//! use routed_events::router::RouteConfig;
//! use routed_events::{Context, DispatchOptions, Dispatcher, Event, ListenerResult, SubscribeOptions};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize, Event)]
//! #[event(name = "order.created")]
//! struct OrderCreated {
//!     order_id: String,
//!     occurred_at: DateTime<Utc>,
//! }
//!
//! let bus = InMemoryBus::new();
//! let dispatcher = Dispatcher::builder()
//!     .route("order.*", RouteConfig::external("orders"))
//!     .publisher(bus.clone())
//!     .build()
//!     .unwrap();
//!
//! dispatcher.on_with("order.created", SubscribeOptions::new().priority(-1), |_ctx, event| -> ListenerResult {
//!     assert_eq!(event.name(), "order.created");
//!     Ok(())
//! });
//!
//! let ctx = Context::background().with_trace_id("req-42");
//! let order = || OrderCreated { order_id: "o-1".into(), occurred_at: Utc::now() };
//!
//! // Routed to the broker.
//! dispatcher.dispatch(&ctx, order()).unwrap();
//! assert_eq!(bus.topics(), vec!["orders"]);
//!
//! // Forced in-process, the route is ignored.
//! dispatcher.dispatch_with(&ctx, order(), DispatchOptions::new().memory()).unwrap();
//! assert_eq!(bus.len(), 1);
//!
//! dispatcher.shutdown();
//! ```
//!
//! ## Modules
//!
//! - [`dispatcher`]: subscribe, interceptors, dispatch, worker pool
//! - [`router`]: pattern routes (`order.created`, `order.*`, `*`)
//! - [`interceptor`]: wrappers around in-process delivery
//! - [`codec`]: wire envelope and type registry
//! - [`bus`]: publisher/subscriber traits, in-memory bus, log publisher
//! - [`consumer`]: background thread redelivering broker messages in-process
//! - [`config`]: dispatcher configuration from JSON, TOML and the environment

extern crate self as routed_events;

pub mod bus;
pub mod codec;
pub mod config;
pub mod consumer;
mod context;
pub mod dispatcher;
mod error;
mod event;
pub mod interceptor;
mod listener;
pub mod router;

pub use context::{CancelHandle, Context, TRACE_ID};
pub use error::{DispatchError, ListenerError, ListenerResult};
pub use event::{Event, SharedEvent, TypedEvent};
pub use listener::{Listener, SubscribeOptions};

pub use codec::{Envelope, RawEvent, TypeRegistry};
pub use config::{ConfigError, DispatcherConfig};
pub use consumer::{ConsumerStats, ConsumerThread};
pub use dispatcher::{
    DispatchOptions, DispatchPlan, Dispatcher, DispatcherBuilder, PoolError, PoolStats,
    Subscription,
};
pub use interceptor::{Interceptor, Next};
pub use router::{Driver, RouteConfig, Router};

// Derive macro for `Event` + `TypedEvent`
pub use routed_events_macros::Event;

#[doc(hidden)]
pub mod __private {
    pub use chrono::{DateTime, Utc};
    pub use serde_json;
    pub use serde_json::value::RawValue;
}
