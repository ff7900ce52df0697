use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use thiserror::Error;

use super::Envelope;
use crate::event::{Event, SharedEvent, TypedEvent};

type DecodeFn = fn(&RawValue) -> Result<SharedEvent, serde_json::Error>;

struct Registration {
    type_id: TypeId,
    type_name: &'static str,
    decode: DecodeFn,
}

fn decode_as<T: TypedEvent>(raw: &RawValue) -> Result<SharedEvent, serde_json::Error> {
    let event: T = serde_json::from_str(raw.get())?;
    Ok(Arc::new(event))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Another type already claimed this event name.
    #[error("event name {name} is already registered to {existing}, cannot register {incoming}")]
    NameConflict {
        name: String,
        existing: &'static str,
        incoming: &'static str,
    },
}

/// Maps event names to the concrete types a consumer rebuilds them as.
///
/// Populate it at startup with every type the process consumes from the
/// broker. Lookups take a read lock; registration takes the write lock.
///
/// ```
/// use routed_events::codec::TypeRegistry;
///
/// let registry = TypeRegistry::new();
/// assert!(!registry.is_registered("order.created"));
/// ```
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Registration>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `T::NAME`.
    ///
    /// Registering the same type twice is a no-op. A different type under a
    /// name that is already taken is rejected.
    pub fn register<T: TypedEvent>(&self) -> Result<(), RegistryError> {
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        let incoming = TypeId::of::<T>();

        if let Some(existing) = types.get(T::NAME) {
            if existing.type_id == incoming {
                return Ok(());
            }
            return Err(RegistryError::NameConflict {
                name: T::NAME.to_string(),
                existing: existing.type_name,
                incoming: std::any::type_name::<T>(),
            });
        }

        types.insert(
            T::NAME.to_string(),
            Registration {
                type_id: incoming,
                type_name: std::any::type_name::<T>(),
                decode: decode_as::<T>,
            },
        );
        Ok(())
    }

    pub fn is_registered(&self, event_name: &str) -> bool {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(event_name)
    }

    /// Registered event names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Rebuild the event carried by `envelope`.
    ///
    /// Registered names decode into their concrete type. Unknown names come
    /// back as a [`RawEvent`] holding the body unchanged.
    pub fn decode(&self, envelope: &Envelope) -> Result<DecodedEvent, serde_json::Error> {
        let decode = self
            .types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&envelope.event_name)
            .map(|registration| registration.decode);

        let event = match decode {
            Some(decode) => decode(&*envelope.payload)?,
            None => Arc::new(RawEvent::from_envelope(envelope)),
        };

        Ok(DecodedEvent {
            event,
            trace_id: envelope.trace_id.clone(),
            timestamp: envelope.timestamp,
        })
    }
}

/// An event rebuilt from an envelope, with the envelope's metadata.
#[derive(Clone, Debug)]
pub struct DecodedEvent {
    pub event: SharedEvent,
    pub trace_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Pass-through event for names with no registered type.
#[derive(Clone, Debug)]
pub struct RawEvent {
    name: String,
    payload: Box<RawValue>,
    timestamp: DateTime<Utc>,
    trace_id: Option<String>,
}

impl RawEvent {
    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            name: envelope.event_name.clone(),
            payload: envelope.payload.clone(),
            timestamp: envelope.timestamp,
            trace_id: envelope.trace_id.clone(),
        }
    }

    /// The body exactly as received.
    pub fn payload(&self) -> &RawValue {
        &self.payload
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// Decode the body into any deserializable type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(self.payload.get())
    }
}

impl Event for RawEvent {
    fn name(&self) -> &str {
        &self.name
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn encode_body(&self) -> Result<Box<RawValue>, serde_json::Error> {
        Ok(self.payload.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
