//! Core subscriber trait for consuming from the external broker.

use super::publisher::{Message, PublishError};

/// Trait for pulling messages back out of a broker.
///
/// Used by `ConsumerThread` to feed broker messages into the in-process
/// dispatcher.
pub trait Subscriber: Send + Sync {
    /// Poll for the next message, blocking until one is available or timeout.
    fn poll(&self, timeout_ms: u64) -> Result<Option<Message>, PublishError>;

    /// Acknowledge that a message has been processed.
    fn ack(&self, message_id: &str) -> Result<(), PublishError>;

    /// Reject a message (redelivery or dead-lettering is up to the broker).
    fn nack(&self, message_id: &str, reason: &str) -> Result<(), PublishError>;
}
