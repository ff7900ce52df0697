//! Event contracts.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;

/// A named, timestamped occurrence handed to the dispatcher.
///
/// Usually derived:
///
/// ```ignore
/// #[derive(Event, Serialize, Deserialize)]
/// #[event(name = "order.created")]
/// struct OrderCreated {
///     order_id: String,
///     occurred_at: DateTime<Utc>,
/// }
/// ```
pub trait Event: Send + Sync + 'static {
    /// Addressing key, e.g. `"order.created"`.
    fn name(&self) -> &str;

    /// When the event happened.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Serialize the event body for the wire.
    fn encode_body(&self) -> Result<Box<RawValue>, serde_json::Error>;

    fn as_any(&self) -> &dyn Any;
}

/// An event type with a compile-time name that can be rebuilt from its
/// wire body. This is what the type registry stores.
pub trait TypedEvent: Event + Serialize + DeserializeOwned {
    const NAME: &'static str;
}

/// Shared handle to a type-erased event.
pub type SharedEvent = Arc<dyn Event>;

impl<'a> dyn Event + 'a {
    /// Downcast to a concrete event type.
    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Event>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

impl<'a> fmt::Debug for dyn Event + 'a {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name())
            .field("occurred_at", &self.occurred_at())
            .finish()
    }
}
