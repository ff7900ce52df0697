//! Interceptors - cross-cutting wrappers around in-process listener execution.
//!
//! The chain is plain function composition. The first interceptor registered
//! is the outermost; the innermost step runs the listeners.
//!
//! ```text
//! dispatch ─▶ interceptor[0] ─▶ interceptor[1] ─▶ ... ─▶ listeners
//!                 │ next.run()      │ next.run()
//!                 ◀─────────────────◀──────────────────── result
//! ```
//!
//! An interceptor may skip `next.run` (listeners do not run), inspect or
//! replace the result, or pass straight through.

mod builtin;

use std::sync::Arc;

use crate::context::Context;
use crate::error::ListenerResult;
use crate::event::Event;

pub use builtin::{
    DispatchOutcome, FilterInterceptor, LoggingInterceptor, MetricsInterceptor, MetricsRecorder,
};

/// A wrapper around listener execution.
pub trait Interceptor: Send + Sync {
    fn intercept(&self, ctx: &Context, event: &dyn Event, next: Next<'_>) -> ListenerResult;
}

impl<F> Interceptor for F
where
    F: Fn(&Context, &dyn Event, Next<'_>) -> ListenerResult + Send + Sync,
{
    fn intercept(&self, ctx: &Context, event: &dyn Event, next: Next<'_>) -> ListenerResult {
        self(ctx, event, next)
    }
}

/// The rest of the chain, handed to each interceptor.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Interceptor>],
    terminal: &'a dyn Fn(&Context, &dyn Event) -> ListenerResult,
}

impl<'a> Next<'a> {
    /// Continue with the next interceptor, or the listeners when none is left.
    pub fn run(self, ctx: &Context, event: &dyn Event) -> ListenerResult {
        run_chain(self.rest, self.terminal, ctx, event)
    }
}

/// Run `interceptors` around `terminal`, outermost first.
pub(crate) fn run_chain(
    interceptors: &[Arc<dyn Interceptor>],
    terminal: &dyn Fn(&Context, &dyn Event) -> ListenerResult,
    ctx: &Context,
    event: &dyn Event,
) -> ListenerResult {
    match interceptors.split_first() {
        Some((first, rest)) => first.intercept(ctx, event, Next { rest, terminal }),
        None => terminal(ctx, event),
    }
}
