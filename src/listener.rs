//! Listener contract and subscribe-time options.

use crate::context::Context;
use crate::error::ListenerResult;
use crate::event::Event;

/// A handler subscribed to events of one name.
///
/// Closures of the shape `Fn(&Context, &dyn Event) -> ListenerResult`
/// implement this trait, so most callers never name it. Register closures
/// through `Dispatcher::on` so their argument types are inferred.
pub trait Listener: Send + Sync {
    fn handle(&self, ctx: &Context, event: &dyn Event) -> ListenerResult;
}

impl<F> Listener for F
where
    F: Fn(&Context, &dyn Event) -> ListenerResult + Send + Sync,
{
    fn handle(&self, ctx: &Context, event: &dyn Event) -> ListenerResult {
        self(ctx, event)
    }
}

/// Subscribe-time options.
///
/// ```
/// use routed_events::SubscribeOptions;
///
/// let opts = SubscribeOptions::new().priority(-10).once();
/// assert_eq!(opts.priority, -10);
/// assert!(opts.once);
/// assert!(!opts.asynchronous);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Lower runs earlier. Ties keep subscription order.
    pub priority: i32,
    /// Run on the worker pool even during a synchronous dispatch. Errors are
    /// logged, never returned to the caller.
    pub asynchronous: bool,
    /// Remove the listener after its first invocation, whatever it returned.
    pub once: bool,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.asynchronous = true;
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}
