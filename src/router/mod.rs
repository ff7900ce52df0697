//! Router - maps event-name patterns to a delivery decision.
//!
//! The route table is compiled and sorted once per reload and swapped in
//! under its own reader/writer lock, independent of the listener registry.
//!
//! ```
//! use std::collections::HashMap;
//! use routed_events::router::{Driver, RouteConfig, Router};
//!
//! let router = Router::new();
//! router.load_routes(HashMap::from([
//!     ("*".to_string(), RouteConfig::external("topic_all")),
//!     ("order.*".to_string(), RouteConfig::external("topic_order")),
//!     ("order.created".to_string(), RouteConfig::external("topic_created")),
//! ]));
//!
//! let route = router.match_route("order.updated").unwrap();
//! assert_eq!(route.driver, Driver::External);
//! assert_eq!(route.topic.as_deref(), Some("topic_order"));
//! ```

mod pattern;

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

pub use pattern::{normalize, Pattern, EXTERNAL_SEPARATOR, SEPARATOR};

/// Delivery mechanism for a dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// Call listeners in-process.
    #[default]
    Memory,
    /// Seal the event and hand it to the external publisher.
    #[serde(alias = "kafka", alias = "broker")]
    External,
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Driver::Memory => write!(f, "memory"),
            Driver::External => write!(f, "external"),
        }
    }
}

/// Delivery decision attached to a route pattern.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default)]
    pub driver: Driver,
    /// Destination topic; required for the external driver unless the
    /// caller supplies one.
    #[serde(default, alias = "destination", skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl RouteConfig {
    /// Route to in-process listeners.
    pub fn memory() -> Self {
        Self {
            driver: Driver::Memory,
            topic: None,
        }
    }

    /// Route to the external publisher on `topic`.
    pub fn external(topic: impl Into<String>) -> Self {
        Self {
            driver: Driver::External,
            topic: Some(topic.into()),
        }
    }
}

#[derive(Clone, Debug)]
struct CompiledRoute {
    pattern: Pattern,
    config: RouteConfig,
}

/// Pattern table deciding the driver for each event name.
#[derive(Debug, Default)]
pub struct Router {
    table: RwLock<Vec<CompiledRoute>>,
}

impl Router {
    /// An empty router. Every lookup yields no decision.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routes(routes: HashMap<String, RouteConfig>) -> Self {
        let router = Self::new();
        router.load_routes(routes);
        router
    }

    /// Replace the whole route table. Safe to call while other threads match.
    /// Empty patterns are skipped.
    pub fn load_routes(&self, routes: HashMap<String, RouteConfig>) {
        let mut compiled: Vec<CompiledRoute> = routes
            .into_iter()
            .filter_map(|(source, config)| match Pattern::compile(&source) {
                Some(pattern) => Some(CompiledRoute { pattern, config }),
                None => {
                    tracing::warn!(pattern = %source, "skipping empty route pattern");
                    None
                }
            })
            .collect();
        compiled.sort_by(|a, b| a.pattern.cmp(&b.pattern));

        tracing::debug!(routes = compiled.len(), "route table loaded");
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = compiled;
    }

    /// The highest-precedence route matching `event_name`, if any.
    ///
    /// `None` is not an error: the dispatcher falls back to its default driver.
    pub fn match_route(&self, event_name: &str) -> Option<RouteConfig> {
        let name = normalize(event_name);
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|route| route.pattern.matches(&name))
            .map(|route| route.config.clone())
    }

    /// All routes in precedence order, keyed by their configured pattern.
    pub fn routes(&self) -> Vec<(String, RouteConfig)> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|route| (route.pattern.source().to_string(), route.config.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
