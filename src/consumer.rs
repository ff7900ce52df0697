//! Background consumer that redelivers broker messages in-process.
//!
//! The thread polls a [`Subscriber`], decodes each message as an envelope,
//! dispatches it through the dispatcher with the memory driver forced, and
//! acks on success or nacks on failure.

use std::sync::mpsc::{channel, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::bus::{Message, PublishError, Subscriber};
use crate::codec::Envelope;
use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;

/// Statistics from the consumer thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    pub handled: usize,
    pub failed: usize,
    pub polls: usize,
}

/// Why a single message could not be consumed.
#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("malformed envelope in message {id}: {source}")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("dispatch of message {id} failed: {source}")]
    Dispatch {
        id: String,
        #[source]
        source: DispatchError,
    },
    #[error("broker error: {0}")]
    Broker(#[from] PublishError),
}

/// Deliver one broker message through `dispatcher`.
pub fn consume_message(
    dispatcher: &Dispatcher,
    ctx: &Context,
    message: &Message,
) -> Result<(), ConsumeError> {
    let envelope = Envelope::from_slice(&message.payload).map_err(|source| ConsumeError::Decode {
        id: message.id.clone(),
        source,
    })?;
    dispatcher
        .dispatch_envelope(ctx, &envelope)
        .map_err(|source| ConsumeError::Dispatch {
            id: message.id.clone(),
            source,
        })
}

/// A background thread feeding broker messages to a dispatcher.
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use routed_events::bus::InMemoryBus;
/// use routed_events::consumer::ConsumerThread;
/// use routed_events::Dispatcher;
///
/// let bus = InMemoryBus::new();
/// let dispatcher = Dispatcher::new();
///
/// let consumer = ConsumerThread::spawn(
///     dispatcher.clone(),
///     bus.new_subscriber(),
///     Duration::from_millis(5),
/// );
///
/// // ... publish to the bus ...
///
/// let stats = consumer.stop();
/// assert_eq!(stats.failed, 0);
/// dispatcher.shutdown();
/// ```
pub struct ConsumerThread {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<ConsumerStats>>,
}

impl ConsumerThread {
    /// Spawn a consumer using a background context.
    ///
    /// `poll_interval` is both the poll timeout and the pause after an
    /// empty poll.
    pub fn spawn<S>(dispatcher: Dispatcher, subscriber: S, poll_interval: Duration) -> Self
    where
        S: Subscriber + 'static,
    {
        Self::spawn_with_context(dispatcher, subscriber, poll_interval, Context::background())
    }

    /// Spawn a consumer whose dispatches derive from `ctx`. Cancelling `ctx`
    /// also stops the thread.
    pub fn spawn_with_context<S>(
        dispatcher: Dispatcher,
        subscriber: S,
        poll_interval: Duration,
        ctx: Context,
    ) -> Self
    where
        S: Subscriber + 'static,
    {
        let (stop_tx, stop_rx) = channel();
        let timeout_ms = poll_interval.as_millis() as u64;

        let handle = thread::spawn(move || {
            let mut stats = ConsumerStats::default();

            loop {
                match stop_rx.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }
                if ctx.is_cancelled() {
                    break;
                }

                stats.polls += 1;

                let message = match subscriber.poll(timeout_ms) {
                    Ok(Some(message)) => message,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "consumer poll failed");
                        thread::sleep(poll_interval);
                        continue;
                    }
                };

                match consume_message(&dispatcher, &ctx, &message) {
                    Ok(()) => {
                        stats.handled += 1;
                        if let Err(e) = subscriber.ack(&message.id) {
                            tracing::warn!(id = %message.id, error = %e, "ack failed");
                        }
                    }
                    Err(e) => {
                        stats.failed += 1;
                        tracing::error!(
                            id = %message.id,
                            event = %message.event_name,
                            error = %e,
                            "consumed message failed"
                        );
                        if let Err(nack) = subscriber.nack(&message.id, &e.to_string()) {
                            tracing::warn!(id = %message.id, error = %nack, "nack failed");
                        }
                    }
                }
            }

            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the thread to stop and wait for it to finish.
    pub fn stop(mut self) -> ConsumerStats {
        let _ = self.stop_tx.send(());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => ConsumerStats::default(),
        }
    }

    /// Signal the thread to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for ConsumerThread {
    fn drop(&mut self) {
        // Don't join on drop.
        let _ = self.stop_tx.send(());
    }
}
