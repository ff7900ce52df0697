//! Built-in interceptors: logging, filtering, metrics.

use std::fmt;
use std::time::{Duration, Instant};

use super::{Interceptor, Next};
use crate::context::Context;
use crate::error::{ListenerError, ListenerResult};
use crate::event::Event;

/// Logs every in-process dispatch with its duration.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingInterceptor;

impl LoggingInterceptor {
    pub fn new() -> Self {
        Self
    }
}

impl Interceptor for LoggingInterceptor {
    fn intercept(&self, ctx: &Context, event: &dyn Event, next: Next<'_>) -> ListenerResult {
        let started = Instant::now();
        tracing::debug!(
            event = event.name(),
            trace_id = ctx.trace_id().unwrap_or_default(),
            "dispatching"
        );

        let result = next.run(ctx, event);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => tracing::debug!(event = event.name(), elapsed_ms, "dispatched"),
            Err(ListenerError::StopPropagation) => {
                tracing::debug!(event = event.name(), elapsed_ms, "propagation stopped")
            }
            Err(e) => tracing::warn!(event = event.name(), elapsed_ms, error = %e, "dispatch failed"),
        }
        result
    }
}

/// Only lets events through when the predicate holds. Rejected events are
/// dropped silently: listeners do not run and the dispatch succeeds.
pub struct FilterInterceptor<F> {
    predicate: F,
}

impl<F> FilterInterceptor<F>
where
    F: Fn(&Context, &dyn Event) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> Interceptor for FilterInterceptor<F>
where
    F: Fn(&Context, &dyn Event) -> bool + Send + Sync,
{
    fn intercept(&self, ctx: &Context, event: &dyn Event, next: Next<'_>) -> ListenerResult {
        if (self.predicate)(ctx, event) {
            next.run(ctx, event)
        } else {
            tracing::trace!(event = event.name(), "filtered out");
            Ok(())
        }
    }
}

/// How an in-process dispatch ended, as seen by an interceptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
    Succeeded,
    Stopped,
    Failed,
}

impl DispatchOutcome {
    fn of(result: &ListenerResult) -> Self {
        match result {
            Ok(()) => DispatchOutcome::Succeeded,
            Err(ListenerError::StopPropagation) => DispatchOutcome::Stopped,
            Err(_) => DispatchOutcome::Failed,
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Succeeded => write!(f, "succeeded"),
            DispatchOutcome::Stopped => write!(f, "stopped"),
            DispatchOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Receives counts and durations. Implemented by the host's metrics backend.
pub trait MetricsRecorder: Send + Sync {
    fn record(&self, event_name: &str, outcome: DispatchOutcome, elapsed: Duration);
}

/// Reports every in-process dispatch to a [`MetricsRecorder`].
pub struct MetricsInterceptor<R> {
    recorder: R,
}

impl<R: MetricsRecorder> MetricsInterceptor<R> {
    pub fn new(recorder: R) -> Self {
        Self { recorder }
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }
}

impl<R: MetricsRecorder> Interceptor for MetricsInterceptor<R> {
    fn intercept(&self, ctx: &Context, event: &dyn Event, next: Next<'_>) -> ListenerResult {
        let started = Instant::now();
        let result = next.run(ctx, event);
        self.recorder
            .record(event.name(), DispatchOutcome::of(&result), started.elapsed());
        result
    }
}
