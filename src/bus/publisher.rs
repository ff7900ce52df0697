//! Core publisher trait for the external broker boundary.

use std::error::Error;

use thiserror::Error;

use crate::context::Context;

/// A message handed to an external broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Unique identifier for this message
    pub id: String,
    /// Destination topic
    pub topic: String,
    /// Partition / grouping key
    pub key: String,
    /// Name of the event carried in the payload
    pub event_name: String,
    /// Serialized envelope
    pub payload: Vec<u8>,
    /// Headers (trace ids, content type, ...)
    pub headers: Vec<(String, String)>,
}

impl Message {
    /// Create a new message with a generated id.
    pub fn new(
        topic: impl Into<String>,
        key: impl Into<String>,
        event_name: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.into(),
            key: key.into(),
            event_name: event_name.into(),
            payload,
            headers: Vec::new(),
        }
    }

    /// Add a header to the message.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Get a header value by key.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Error type for publish operations.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Connection to the broker failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// Serialization of the message failed
    #[error("serialization failed: {0}")]
    SerializationFailed(String),
    /// The broker rejected the message
    #[error("message rejected: {0}")]
    Rejected(String),
    /// Timeout waiting for acknowledgment
    #[error("publish timeout")]
    Timeout,
    /// Other error
    #[error("publish error: {0}")]
    Other(#[source] Box<dyn Error + Send + Sync>),
}

/// Trait for handing messages to an external broker.
///
/// The dispatcher makes exactly one `publish` call per external dispatch.
/// Retries, batching and delivery confirmation belong to the implementation.
///
/// Implementations might include:
/// - `InMemoryBus` - For testing and single-process scenarios
/// - `LogPublisher` - Writes each message to the log
/// - Kafka, NATS or RabbitMQ clients living outside this crate
pub trait Publisher: Send + Sync {
    fn publish(&self, ctx: &Context, message: Message) -> Result<(), PublishError>;
}
