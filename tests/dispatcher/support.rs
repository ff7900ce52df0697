//! Test domain: order and user events, plus helpers shared by the suites.

#![allow(dead_code)]

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use routed_events::bus::InMemoryBus;
use routed_events::router::RouteConfig;
use routed_events::{Dispatcher, Event, ListenerResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
#[event(name = "order.created")]
pub struct OrderCreated {
    pub order_id: String,
    pub total_cents: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
#[event(name = "order.updated")]
pub struct OrderUpdated {
    pub order_id: String,
    pub status: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Event)]
#[event(name = "user.login")]
pub struct UserLogin {
    pub user_id: String,
    #[event(timestamp)]
    pub at: DateTime<Utc>,
}

pub fn order_created(order_id: &str) -> OrderCreated {
    OrderCreated {
        order_id: order_id.to_string(),
        total_cents: 4200,
        occurred_at: Utc::now(),
    }
}

pub fn order_updated(order_id: &str) -> OrderUpdated {
    OrderUpdated {
        order_id: order_id.to_string(),
        status: "shipped".to_string(),
        occurred_at: Utc::now(),
    }
}

pub fn user_login(user_id: &str) -> UserLogin {
    UserLogin {
        user_id: user_id.to_string(),
        at: Utc::now(),
    }
}

/// Shared call log for asserting listener order.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// A listener that appends `label` and succeeds.
    pub fn recorder(
        &self,
        label: &'static str,
    ) -> impl Fn(&routed_events::Context, &dyn Event) -> ListenerResult + Send + Sync + 'static {
        let log = self.clone();
        move |_: &routed_events::Context, _: &dyn Event| -> ListenerResult {
            log.push(label);
            Ok(())
        }
    }
}

/// Async work runs inline on the dispatching thread.
pub fn sync_dispatcher() -> Dispatcher {
    Dispatcher::builder().force_sync(true).build().unwrap()
}

/// Routes from the precedence example, publishing to `bus`.
pub fn routed_dispatcher(bus: &InMemoryBus) -> Dispatcher {
    Dispatcher::builder()
        .force_sync(true)
        .route("*", RouteConfig::external("topic_all"))
        .route("order.*", RouteConfig::external("topic_order"))
        .route("order.created", RouteConfig::external("topic_created"))
        .publisher(bus.clone())
        .build()
        .unwrap()
}

pub fn recv<T>(rx: &Receiver<T>) -> T {
    rx.recv_timeout(Duration::from_secs(2))
        .expect("timed out waiting for async work")
}
