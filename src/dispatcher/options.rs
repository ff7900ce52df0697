//! Per-call dispatch options and the resolver that turns them into a plan.

use crate::error::DispatchError;
use crate::router::{Driver, RouteConfig};

/// Per-call overrides.
///
/// Choosing a driver marks it explicit: the call's choice then beats any
/// route. Everything left unset falls back to the matched route, then to
/// the default (memory driver, synchronous).
///
/// ```
/// use routed_events::{DispatchOptions, Driver};
///
/// let opts = DispatchOptions::new().external("audit").key("tenant-7").asynchronous();
/// assert_eq!(opts.explicit_driver(), Some(Driver::External));
/// assert!(opts.is_asynchronous());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    driver: Option<Driver>,
    topic: Option<String>,
    key: Option<String>,
    asynchronous: bool,
    trace_id: Option<String>,
}

impl DispatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a driver, overriding any route.
    pub fn driver(mut self, driver: Driver) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Force in-process delivery.
    pub fn memory(self) -> Self {
        self.driver(Driver::Memory)
    }

    /// Force external delivery to `topic`.
    pub fn external(self, topic: impl Into<String>) -> Self {
        self.driver(Driver::External).topic(topic)
    }

    /// Destination topic for external delivery.
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Partition / grouping key. Defaults to the event name.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Return immediately and deliver on the worker pool.
    pub fn asynchronous(mut self) -> Self {
        self.asynchronous = true;
        self
    }

    pub fn synchronous(mut self) -> Self {
        self.asynchronous = false;
        self
    }

    /// Trace id stamped on the envelope. Defaults to the context's trace id.
    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn explicit_driver(&self) -> Option<Driver> {
        self.driver
    }

    pub fn is_asynchronous(&self) -> bool {
        self.asynchronous
    }
}

/// The concrete delivery plan for one dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchPlan {
    pub driver: Driver,
    /// Always set when `driver` is external.
    pub topic: Option<String>,
    pub key: String,
    pub asynchronous: bool,
    pub trace_id: Option<String>,
}

/// Merge the caller's options with the matched route.
///
/// Precedence: explicit driver, then route, then the memory default. An
/// external plan without a topic is a configuration error, never a silent
/// fallback to in-process delivery. `route` is ignored when the caller
/// chose a driver.
pub fn resolve(
    event_name: &str,
    options: DispatchOptions,
    route: Option<RouteConfig>,
) -> Result<DispatchPlan, DispatchError> {
    let DispatchOptions {
        driver,
        topic,
        key,
        asynchronous,
        trace_id,
    } = options;

    let (driver, topic) = match (driver, route) {
        (Some(driver), _) => (driver, topic),
        (None, Some(route)) => (route.driver, topic.or(route.topic)),
        (None, None) => (Driver::default(), topic),
    };

    let topic = topic.filter(|t| !t.is_empty());
    if driver == Driver::External && topic.is_none() {
        return Err(DispatchError::TopicRequired {
            event: event_name.to_string(),
        });
    }

    Ok(DispatchPlan {
        driver,
        topic,
        key: key
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| event_name.to_string()),
        asynchronous,
        trace_id: trace_id.filter(|t| !t.is_empty()),
    })
}
