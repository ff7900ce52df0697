use std::sync::{Arc, Mutex, PoisonError};

use super::{Message, PublishError, Publisher};
use crate::context::Context;

/// A publisher that writes each message to the log, or to a buffer.
///
/// Handy as the external driver in development setups where no broker runs.
#[derive(Clone, Default)]
pub struct LogPublisher {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl LogPublisher {
    pub fn new() -> Self {
        LogPublisher { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        LogPublisher {
            buffer: Some(buffer),
        }
    }
}

impl Publisher for LogPublisher {
    fn publish(&self, ctx: &Context, message: Message) -> Result<(), PublishError> {
        let payload = String::from_utf8_lossy(&message.payload);
        match &self.buffer {
            Some(buffer) => {
                let trace = ctx
                    .trace_id()
                    .map(|id| format!(" trace_id={}", id))
                    .unwrap_or_default();
                let line = format!(
                    "[PUBLISH] {} {} key={}{} {}",
                    message.topic, message.event_name, message.key, trace, payload
                );
                buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(line);
            }
            None => tracing::info!(
                topic = %message.topic,
                key = %message.key,
                event = %message.event_name,
                trace_id = ctx.trace_id().unwrap_or_default(),
                payload = %payload,
                "publish"
            ),
        }
        Ok(())
    }
}
