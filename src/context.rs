//! Context passed to listeners, interceptors and publishers.
//!
//! Carries a cancellation signal, an optional deadline and string values
//! (trace id, tenant, ...). The dispatcher threads the caller's context
//! through every invocation but never interprets it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Well-known value key for the trace / correlation id.
pub const TRACE_ID: &str = "trace_id";

/// The context passed to every listener invocation.
///
/// Cloning is cheap and clones share the same cancellation signal, so a
/// context handed to the worker pool still observes `cancel()` from the
/// caller.
///
/// ## Example
///
/// ```
/// use routed_events::Context;
///
/// let (ctx, cancel) = Context::background().with_trace_id("req-1").with_cancel();
/// assert_eq!(ctx.trace_id(), Some("req-1"));
/// assert!(!ctx.is_cancelled());
///
/// cancel.cancel();
/// assert!(ctx.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Context {
    cancel_flags: Vec<Arc<AtomicBool>>,
    deadline: Option<Instant>,
    values: Arc<HashMap<String, String>>,
}

/// Cancels every clone of the context it was created with.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl Context {
    /// An empty context that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a cancellable context. The child also observes the parent's
    /// cancellation; cancelling the child does not affect the parent.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let flag = Arc::new(AtomicBool::new(false));
        let mut cancel_flags = self.cancel_flags.clone();
        cancel_flags.push(Arc::clone(&flag));
        let ctx = Self {
            cancel_flags,
            deadline: self.deadline,
            values: Arc::clone(&self.values),
        };
        (ctx, CancelHandle { flag })
    }

    /// Derive a context that reports cancellation once `timeout` has elapsed.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context with a deadline. An earlier existing deadline is kept.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            cancel_flags: self.cancel_flags.clone(),
            deadline: Some(deadline),
            values: Arc::clone(&self.values),
        }
    }

    /// Derive a context carrying an extra value.
    pub fn with_value(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut values = (*self.values).clone();
        values.insert(key.into(), value.into());
        Self {
            cancel_flags: self.cancel_flags.clone(),
            deadline: self.deadline,
            values: Arc::new(values),
        }
    }

    /// Derive a context carrying a trace id.
    pub fn with_trace_id(&self, trace_id: impl Into<String>) -> Self {
        self.with_value(TRACE_ID, trace_id)
    }

    /// True once the cancel handle fired or the deadline passed.
    pub fn is_cancelled(&self) -> bool {
        let flagged = self
            .cancel_flags
            .iter()
            .any(|flag| flag.load(Ordering::SeqCst));
        flagged || self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Get a value by key.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Get the trace id, if set and non-empty.
    pub fn trace_id(&self) -> Option<&str> {
        self.value(TRACE_ID).filter(|id| !id.is_empty())
    }
}
