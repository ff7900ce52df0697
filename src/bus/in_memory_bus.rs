//! In-memory broker for testing and single-process scenarios.
//!
//! This module provides a thread-safe in-memory log that implements
//! both `Publisher` and `Subscriber`, useful for:
//! - Unit and integration testing without a real broker
//! - Single-process applications
//! - Development and prototyping

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use super::{Message, PublishError, Publisher, Subscriber};
use crate::context::Context;

/// In-memory broker for testing and single-process scenarios.
///
/// Features:
/// - Thread-safe (can be shared across threads via `Clone`)
/// - Supports multiple subscribers via `new_subscriber()` / `topic_subscriber()`
/// - Messages are stored in an append-only log
/// - Each subscriber tracks its own read position
/// - Publishing can be made to fail, to exercise error paths
///
/// ## Example
///
/// ```
/// use routed_events::bus::{InMemoryBus, Message, Publisher, Subscriber};
/// use routed_events::Context;
///
/// let bus = InMemoryBus::new();
/// let ctx = Context::background();
///
/// bus.publish(&ctx, Message::new("orders", "o-1", "order.created", b"{}".to_vec())).unwrap();
///
/// let message = bus.poll(100).unwrap().unwrap();
/// assert_eq!(message.topic, "orders");
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    /// Shared message log
    log: Arc<RwLock<Vec<Message>>>,
    /// Shared failure switch
    failure: Arc<Mutex<Option<String>>>,
    /// Per-subscriber read position
    position: Arc<Mutex<usize>>,
    /// Per-subscriber topic filter
    topic: Option<String>,
    /// Acknowledged message IDs
    acked: Arc<Mutex<Vec<String>>>,
    /// Rejected message IDs with reasons
    nacked: Arc<Mutex<Vec<(String, String)>>>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    /// Create a new in-memory bus.
    pub fn new() -> Self {
        Self {
            log: Arc::new(RwLock::new(Vec::new())),
            failure: Arc::new(Mutex::new(None)),
            position: Arc::new(Mutex::new(0)),
            topic: None,
            acked: Arc::new(Mutex::new(Vec::new())),
            nacked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a new subscriber that shares the same log but has its own position.
    pub fn new_subscriber(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
            failure: Arc::clone(&self.failure),
            position: Arc::new(Mutex::new(0)),
            topic: None,
            acked: Arc::new(Mutex::new(Vec::new())),
            nacked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a subscriber that only sees messages published to `topic`.
    pub fn topic_subscriber(&self, topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..self.new_subscriber()
        }
    }

    /// Make every following publish fail with `PublishError::Rejected(reason)`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    /// Let publishes succeed again.
    pub fn recover(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Get all messages in the log.
    pub fn messages(&self) -> Vec<Message> {
        self.read_log().clone()
    }

    /// Get the topic of every message, in publish order.
    pub fn topics(&self) -> Vec<String> {
        self.read_log().iter().map(|m| m.topic.clone()).collect()
    }

    /// Get the total number of messages in the log.
    pub fn len(&self) -> usize {
        self.read_log().len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.read_log().is_empty()
    }

    /// Find all messages published to a topic.
    pub fn find_by_topic(&self, topic: &str) -> Vec<Message> {
        self.read_log()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Find the first message carrying an event name.
    pub fn find_by_event(&self, event_name: &str) -> Option<Message> {
        self.read_log()
            .iter()
            .find(|m| m.event_name == event_name)
            .cloned()
    }

    /// Get acknowledged message IDs.
    pub fn acknowledged(&self) -> Vec<String> {
        self.acked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get rejected message IDs with their reasons.
    pub fn rejected(&self) -> Vec<(String, String)> {
        self.nacked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get the current subscriber position.
    pub fn current_position(&self) -> usize {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear all messages from the log (useful for test cleanup).
    pub fn clear(&self) {
        self.log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.position.lock().unwrap_or_else(PoisonError::into_inner) = 0;
        self.acked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.nacked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn read_log(&self) -> std::sync::RwLockReadGuard<'_, Vec<Message>> {
        self.log.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_message(&self) -> Option<Message> {
        let log = self.read_log();
        let mut pos = self.position.lock().unwrap_or_else(PoisonError::into_inner);

        while *pos < log.len() {
            let message = &log[*pos];
            *pos += 1;
            let wanted = self
                .topic
                .as_deref()
                .map(|topic| topic == message.topic)
                .unwrap_or(true);
            if wanted {
                return Some(message.clone());
            }
        }
        None
    }
}

impl Publisher for InMemoryBus {
    fn publish(&self, _ctx: &Context, message: Message) -> Result<(), PublishError> {
        if let Some(reason) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(PublishError::Rejected(reason));
        }
        self.log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        Ok(())
    }
}

impl Subscriber for InMemoryBus {
    fn poll(&self, timeout_ms: u64) -> Result<Option<Message>, PublishError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            if let Some(message) = self.next_message() {
                return Ok(Some(message));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            // Small sleep to avoid busy-waiting
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn ack(&self, message_id: &str) -> Result<(), PublishError> {
        self.acked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message_id.to_string());
        Ok(())
    }

    fn nack(&self, message_id: &str, reason: &str) -> Result<(), PublishError> {
        // No redelivery; the message stays in the log
        self.nacked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((message_id.to_string(), reason.to_string()));
        Ok(())
    }
}
