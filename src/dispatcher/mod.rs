//! Dispatcher - subscribe listeners and deliver events.
//!
//! Each dispatch is resolved to one of four plans:
//!
//! ```text
//!                         ┌─ memory ─── sync ──▶ interceptors ▶ listeners (caller thread)
//! dispatch ─▶ resolve ────┤           └ async ─▶ pool ▶ interceptors ▶ listeners
//!  (options, route)       └─ external ─ sync ──▶ seal ▶ publisher (caller thread)
//!                                     └ async ─▶ seal ▶ pool ▶ publisher
//! ```
//!
//! Synchronous failures are returned to the caller. Everything that runs on
//! the pool only logs its failures.
//!
//! ## Example
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! use chrono::{DateTime, Utc};
//! use routed_events::{Context, Dispatcher, Event, ListenerResult};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize, Event)]
//! #[event(name = "order.created")]
//! struct OrderCreated {
//!     order_id: String,
//!     occurred_at: DateTime<Utc>,
//! }
//!
//! let dispatcher = Dispatcher::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&seen);
//! dispatcher.on("order.created", move |_ctx, _event| -> ListenerResult {
//!     counter.fetch_add(1, Ordering::SeqCst);
//!     Ok(())
//! });
//!
//! let event = OrderCreated { order_id: "o-1".into(), occurred_at: Utc::now() };
//! dispatcher.dispatch(&Context::background(), event).unwrap();
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! dispatcher.shutdown();
//! ```

mod listeners;
mod options;
mod pool;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::bus::{Message, Publisher};
use crate::codec::{Envelope, RawEvent, RegistryError, TypeRegistry};
use crate::config::{ConfigError, DispatcherConfig};
use crate::context::{Context, TRACE_ID};
use crate::error::{DispatchError, ListenerError, ListenerResult};
use crate::event::{Event, SharedEvent, TypedEvent};
use crate::interceptor::{run_chain, Interceptor, Next};
use crate::listener::{Listener, SubscribeOptions};
use crate::router::{Driver, RouteConfig, Router};

use listeners::{ListenerEntry, Registry};
use pool::WorkerPool;

pub use listeners::Subscription;
pub use options::{resolve, DispatchOptions, DispatchPlan};
pub use pool::{PoolError, PoolStats};

struct Inner {
    registry: Arc<RwLock<Registry>>,
    next_id: AtomicU64,
    router: Router,
    types: TypeRegistry,
    publisher: Option<Arc<dyn Publisher>>,
    pool: WorkerPool,
    force_sync: bool,
}

/// The event dispatcher.
///
/// Cloning is cheap; clones share listeners, routes, type registry and the
/// worker pool.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

/// Builder for a [`Dispatcher`].
///
/// ```
/// use routed_events::bus::InMemoryBus;
/// use routed_events::router::RouteConfig;
/// use routed_events::Dispatcher;
///
/// let dispatcher = Dispatcher::builder()
///     .pool_size(4)
///     .route("audit:*", RouteConfig::external("audit"))
///     .publisher(InMemoryBus::new())
///     .build()
///     .unwrap();
/// assert!(dispatcher.has_publisher());
/// dispatcher.shutdown();
/// ```
#[derive(Default)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    publisher: Option<Arc<dyn Publisher>>,
}

impl DispatcherBuilder {
    /// Replace every setting with `config`.
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.config.pool_size = pool_size;
        self
    }

    pub fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.config.queue_capacity = queue_capacity;
        self
    }

    /// Run async listeners on the dispatching thread. Their errors are still
    /// only logged. `dispatch_async` and async publishes keep using the pool.
    pub fn force_sync(mut self, force_sync: bool) -> Self {
        self.config.force_sync = force_sync;
        self
    }

    pub fn route(mut self, pattern: impl Into<String>, route: RouteConfig) -> Self {
        self.config.routes.insert(pattern.into(), route);
        self
    }

    pub fn publisher<P: Publisher + 'static>(self, publisher: P) -> Self {
        self.shared_publisher(Arc::new(publisher))
    }

    pub fn shared_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn build(self) -> Result<Dispatcher, ConfigError> {
        let DispatcherBuilder { config, publisher } = self;
        config.validate()?;

        let pool = WorkerPool::new(config.pool_size, config.queue_capacity);

        tracing::debug!(
            pool_size = pool.size(),
            force_sync = config.force_sync,
            routes = config.routes.len(),
            publisher = publisher.is_some(),
            "dispatcher started"
        );

        Ok(Dispatcher {
            inner: Arc::new(Inner {
                registry: Arc::new(RwLock::new(Registry::default())),
                next_id: AtomicU64::new(0),
                router: Router::with_routes(config.routes),
                types: TypeRegistry::new(),
                publisher,
                pool,
                force_sync: config.force_sync,
            }),
        })
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// A dispatcher with the default configuration and no publisher.
    pub fn new() -> Self {
        Self::with_pool(WorkerPool::new(
            crate::config::DEFAULT_POOL_SIZE,
            crate::config::DEFAULT_QUEUE_CAPACITY,
        ))
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn from_config(config: DispatcherConfig) -> Result<Self, ConfigError> {
        Self::builder().config(config).build()
    }

    fn with_pool(pool: WorkerPool) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Arc::new(RwLock::new(Registry::default())),
                next_id: AtomicU64::new(0),
                router: Router::new(),
                types: TypeRegistry::new(),
                publisher: None,
                pool,
                force_sync: false,
            }),
        }
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Register `listener` for events named `event_name`.
    ///
    /// An empty name registers nothing and returns a no-op handle.
    pub fn subscribe(
        &self,
        event_name: &str,
        listener: Arc<dyn Listener>,
        options: SubscribeOptions,
    ) -> Subscription {
        if event_name.is_empty() {
            tracing::warn!("ignoring subscription with an empty event name");
            return Subscription::noop();
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event_name, ListenerEntry::new(id, listener, options));

        tracing::trace!(event = event_name, id, priority = options.priority, "subscribed");
        Subscription::new(event_name, id, &self.inner.registry)
    }

    /// Register a closure with default options.
    pub fn on<F>(&self, event_name: &str, listener: F) -> Subscription
    where
        F: Fn(&Context, &dyn Event) -> ListenerResult + Send + Sync + 'static,
    {
        self.subscribe(event_name, Arc::new(listener), SubscribeOptions::default())
    }

    /// Register a closure with explicit options.
    pub fn on_with<F>(&self, event_name: &str, options: SubscribeOptions, listener: F) -> Subscription
    where
        F: Fn(&Context, &dyn Event) -> ListenerResult + Send + Sync + 'static,
    {
        self.subscribe(event_name, Arc::new(listener), options)
    }

    /// Register a closure that receives the concrete event type `T`.
    ///
    /// Events decoded from the broker without a registered type arrive as
    /// [`RawEvent`] and are decoded into `T` on the way in. Any other type
    /// under `T::NAME` is rejected.
    pub fn on_typed<T, F>(&self, options: SubscribeOptions, listener: F) -> Subscription
    where
        T: TypedEvent,
        F: Fn(&Context, &T) -> ListenerResult + Send + Sync + 'static,
    {
        self.on_with(T::NAME, options, move |ctx, event| -> ListenerResult {
            if let Some(typed) = event.downcast_ref::<T>() {
                return listener(ctx, typed);
            }
            match event.downcast_ref::<RawEvent>() {
                Some(raw) => listener(ctx, &raw.decode::<T>()?),
                None => Err(ListenerError::Rejected(format!(
                    "{} is not a {}",
                    event.name(),
                    std::any::type_name::<T>()
                ))),
            }
        })
    }

    /// Listeners currently registered for `event_name`.
    pub fn listener_count(&self, event_name: &str) -> usize {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .count(event_name)
    }

    pub fn has_listeners(&self, event_name: &str) -> bool {
        self.listener_count(event_name) > 0
    }

    /// Names with at least one listener, sorted.
    pub fn event_names(&self) -> Vec<String> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names()
    }

    /// Append an interceptor. The first registered runs outermost.
    pub fn use_interceptor(&self, interceptor: Arc<dyn Interceptor>) {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push_interceptor(interceptor);
    }

    /// Append a closure interceptor.
    pub fn use_fn<F>(&self, interceptor: F)
    where
        F: Fn(&Context, &dyn Event, Next<'_>) -> ListenerResult + Send + Sync + 'static,
    {
        self.use_interceptor(Arc::new(interceptor));
    }

    // ========================================================================
    // Routing and types
    // ========================================================================

    /// Replace the route table.
    pub fn load_routes(&self, routes: std::collections::HashMap<String, RouteConfig>) {
        self.inner.router.load_routes(routes);
    }

    /// Reload the route table from `config`. Pool settings are fixed at
    /// construction and are ignored here.
    pub fn apply_config(&self, config: &DispatcherConfig) -> Result<(), ConfigError> {
        config.validate()?;
        if config.pool_size != self.inner.pool.size() || config.force_sync != self.inner.force_sync {
            tracing::info!(
                current = self.inner.pool.size(),
                requested = config.pool_size,
                force_sync = config.force_sync,
                "pool settings require a new dispatcher"
            );
        }
        self.inner.router.load_routes(config.routes.clone());
        Ok(())
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Make `T` decodable from broker messages.
    pub fn register_type<T: TypedEvent>(&self) -> Result<(), RegistryError> {
        self.inner.types.register::<T>()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.inner.types
    }

    pub fn has_publisher(&self) -> bool {
        self.inner.publisher.is_some()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// Release the worker pool. Queued jobs finish; later asynchronous work
    /// is dropped with a warning. Synchronous dispatch keeps working.
    pub fn shutdown(&self) {
        self.inner.pool.shutdown();
        tracing::debug!("dispatcher shut down");
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Deliver `event` with default options.
    pub fn dispatch<E: Event>(&self, ctx: &Context, event: E) -> Result<(), DispatchError> {
        self.dispatch_with(ctx, event, DispatchOptions::default())
    }

    pub fn dispatch_with<E: Event>(
        &self,
        ctx: &Context,
        event: E,
        options: DispatchOptions,
    ) -> Result<(), DispatchError> {
        self.dispatch_shared(ctx, Some(Arc::new(event)), options)
    }

    /// Deliver on the worker pool and return immediately.
    pub fn dispatch_async<E: Event>(&self, ctx: &Context, event: E) -> Result<(), DispatchError> {
        self.dispatch_with(ctx, event, DispatchOptions::default().asynchronous())
    }

    /// Deliver an already shared event. `None` is a no-op.
    pub fn dispatch_shared(
        &self,
        ctx: &Context,
        event: Option<SharedEvent>,
        options: DispatchOptions,
    ) -> Result<(), DispatchError> {
        let Some(event) = event else {
            return Ok(());
        };

        let route = match options.explicit_driver() {
            Some(_) => None,
            None => self.inner.router.match_route(event.name()),
        };
        let plan = resolve(event.name(), options, route)?;

        let ctx = match &plan.trace_id {
            Some(trace_id) => ctx.with_trace_id(trace_id.clone()),
            None => ctx.clone(),
        };

        match (plan.driver, plan.asynchronous) {
            (Driver::Memory, false) => self.deliver_in_process(&ctx, &event),
            (Driver::Memory, true) => {
                let dispatcher = self.clone();
                let name = event.name().to_string();
                self.spawn(&name, "dispatch", move || {
                    if let Err(e) = dispatcher.deliver_in_process(&ctx, &event) {
                        tracing::error!(event = %event.name(), error = %e, "async dispatch failed");
                    }
                });
                Ok(())
            }
            (Driver::External, _) => self.deliver_external(&ctx, &*event, plan),
        }
    }

    /// Rebuild the event in `envelope` and deliver it in-process.
    ///
    /// The memory driver is forced so a consumed message is never routed
    /// back to the broker. The envelope's trace id is attached to the
    /// context unless the context already has one.
    pub fn dispatch_envelope(&self, ctx: &Context, envelope: &Envelope) -> Result<(), DispatchError> {
        let decoded = self
            .inner
            .types
            .decode(envelope)
            .map_err(DispatchError::Decode)?;
        let ctx = match (&decoded.trace_id, ctx.trace_id()) {
            (Some(trace_id), None) => ctx.with_trace_id(trace_id.clone()),
            _ => ctx.clone(),
        };
        self.dispatch_shared(&ctx, Some(decoded.event), DispatchOptions::new().memory())
    }

    /// Decode wire bytes into an envelope and deliver it in-process.
    pub fn receive(&self, ctx: &Context, bytes: &[u8]) -> Result<(), DispatchError> {
        let envelope = Envelope::from_slice(bytes).map_err(DispatchError::Decode)?;
        self.dispatch_envelope(ctx, &envelope)
    }

    fn deliver_in_process(&self, ctx: &Context, event: &SharedEvent) -> Result<(), DispatchError> {
        let name = event.name();
        let (listeners, interceptors) = self
            .inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot(name);

        let terminal = |ctx: &Context, current: &dyn Event| -> ListenerResult {
            for entry in &listeners {
                if !entry.claim() {
                    continue;
                }
                if entry.options.asynchronous {
                    self.spawn_listener(ctx, entry, event);
                    continue;
                }
                entry.listener.handle(ctx, current)?;
            }
            Ok(())
        };

        let result = run_chain(&interceptors, &terminal, ctx, &**event);

        let spent: Vec<u64> = listeners
            .iter()
            .filter(|entry| entry.is_spent())
            .map(|entry| entry.id)
            .collect();
        if !spent.is_empty() {
            self.inner
                .registry
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove_all(name, &spent);
        }

        match result {
            Ok(()) | Err(ListenerError::StopPropagation) => Ok(()),
            Err(source) => Err(DispatchError::Listener {
                event: name.to_string(),
                source,
            }),
        }
    }

    /// Run an async listener off the caller's chain.
    ///
    /// The listener gets the dispatched event itself, not the value an
    /// interceptor passed down: only an owned `SharedEvent` can outlive the
    /// chain. A rejected submission hands a `once` claim back so the entry
    /// stays registered for the next dispatch.
    fn spawn_listener(&self, ctx: &Context, entry: &ListenerEntry, event: &SharedEvent) {
        if self.inner.force_sync {
            log_async_failure(entry.id, &**event, entry.listener.handle(ctx, &**event));
            return;
        }

        let listener = Arc::clone(&entry.listener);
        let id = entry.id;
        let ctx = ctx.clone();
        let event = Arc::clone(event);
        let name = event.name().to_string();

        let submitted = self.spawn(&name, "listener", move || {
            log_async_failure(id, &*event, listener.handle(&ctx, &*event));
        });
        if !submitted {
            entry.release();
        }
    }

    fn deliver_external(
        &self,
        ctx: &Context,
        event: &dyn Event,
        plan: DispatchPlan,
    ) -> Result<(), DispatchError> {
        let Some(publisher) = self.inner.publisher.clone() else {
            return Err(DispatchError::PublisherMissing {
                event: event.name().to_string(),
            });
        };
        let Some(topic) = plan.topic else {
            return Err(DispatchError::TopicRequired {
                event: event.name().to_string(),
            });
        };

        let trace_id = plan.trace_id.as_deref().or(ctx.trace_id());
        let envelope = Envelope::seal(event, trace_id)?;
        let mut message = Message::new(topic, plan.key, event.name(), envelope.to_bytes()?);
        if let Some(trace_id) = &envelope.trace_id {
            message = message.with_header(TRACE_ID, trace_id.clone());
        }

        if !plan.asynchronous {
            return publisher.publish(ctx, message).map_err(DispatchError::from);
        }

        let ctx = ctx.clone();
        self.spawn(event.name(), "publish", move || {
            let name = message.event_name.clone();
            let topic = message.topic.clone();
            if let Err(e) = publisher.publish(&ctx, message) {
                tracing::error!(event = %name, topic = %topic, error = %e, "async publish failed");
            }
        });
        Ok(())
    }

    /// Hand `job` to the pool. Submission failures are logged and dropped;
    /// returns whether the job was accepted.
    fn spawn<F>(&self, event_name: &str, kind: &'static str, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.inner.pool.submit(Box::new(job)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(event = event_name, kind, error = %e, "async work dropped");
                false
            }
        }
    }
}

fn log_async_failure(id: u64, event: &dyn Event, result: ListenerResult) {
    match result {
        Ok(()) | Err(ListenerError::StopPropagation) => {}
        Err(e) => tracing::error!(event = %event.name(), id, error = %e, "async listener failed"),
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("events", &self.event_names())
            .field("routes", &self.inner.router.len())
            .field("publisher", &self.has_publisher())
            .field("pool_size", &self.inner.pool.size())
            .field("force_sync", &self.inner.force_sync)
            .finish()
    }
}
