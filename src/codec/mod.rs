//! Wire envelope for events leaving or entering the process.
//!
//! The envelope is JSON. The event body is embedded as raw JSON and kept
//! byte-for-byte, so a consumer without the concrete type still holds the
//! exact payload the producer sent.

mod registry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::event::Event;

pub use registry::{DecodedEvent, RawEvent, RegistryError, TypeRegistry};

/// Serialized form of an event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub event_name: String,
    pub payload: Box<RawValue>,
    /// When the envelope was sealed.
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl Envelope {
    /// Serialize `event` into an envelope stamped with the current time.
    /// An empty trace id is treated as absent.
    pub fn seal(event: &dyn Event, trace_id: Option<&str>) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_name: event.name().to_string(),
            payload: event.encode_body()?,
            timestamp: Utc::now(),
            trace_id: trace_id.filter(|id| !id.is_empty()).map(str::to_string),
        })
    }

    /// Encode the envelope for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode an envelope received from the wire.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let mut envelope: Envelope = serde_json::from_slice(bytes)?;
        if envelope.trace_id.as_deref() == Some("") {
            envelope.trace_id = None;
        }
        Ok(envelope)
    }

    /// The raw event body.
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.get().as_bytes()
    }
}
